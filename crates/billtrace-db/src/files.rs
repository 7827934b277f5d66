//! Content-addressed storage for uploaded bill PDFs.
//!
//! Files are hashed with BLAKE3; re-uploading identical bytes resolves to
//! the existing record instead of writing a second blob. The filesystem
//! backend writes atomically (temp file + rename) into a two-level
//! `blobs/xx/yy/` hierarchy.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use billtrace_core::{Error, Result, StoredFile};

/// Storage backend trait for different storage implementations.
///
/// Allows abstracting over filesystem, S3, or other storage providers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data to the specified path.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read data from the specified path.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete data at the specified path.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if data exists at the specified path.
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Filesystem storage backend.
///
/// Stores files in a directory hierarchy based on UUIDv7 blob IDs.
/// Path format: `{base_path}/blobs/{first-2-hex}/{next-2-hex}/{uuid}.pdf`
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend with the given base directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    /// Validate that the storage backend can write, read, and delete files.
    ///
    /// Performs a full round-trip test at startup to catch filesystem issues
    /// (permission errors, missing directories) early.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.base_path.join("blobs/.health-check");
        let test_file = test_dir.join("test.bin");

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        let data = b"storage-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        let read_data = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_data != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await;

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        debug!(storage_path = %path, size = data.len(), "file store: write");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "file store: create_dir_all failed");
                e
            })?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "file store: rename failed");
            e
        })?;

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path);
        Ok(fs::read(full_path).await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);
        Ok(fs::try_exists(full_path).await?)
    }
}

/// Compute BLAKE3 hash of data with "blake3:" prefix.
///
/// Returns a string in the format: `blake3:{64-char-hex}`
pub fn compute_content_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!("blake3:{}", hash.to_hex())
}

/// Generate storage path from UUID.
///
/// Path format: `blobs/{first-2-hex}/{next-2-hex}/{uuid}.pdf`
pub fn generate_storage_path(uuid: &Uuid) -> String {
    let hex = uuid.as_hyphenated().to_string().replace('-', "");
    format!(
        "blobs/{}/{}/{}.pdf",
        &hex[0..2],
        &hex[2..4],
        uuid.as_hyphenated()
    )
}

/// PostgreSQL-backed content-addressed file repository.
pub struct PgFileRepository {
    pool: PgPool,
    backend: Box<dyn StorageBackend>,
}

impl PgFileRepository {
    /// Create a new file repository over the given backend.
    pub fn new(pool: PgPool, backend: impl StorageBackend + 'static) -> Self {
        Self {
            pool,
            backend: Box::new(backend),
        }
    }

    /// Store a file, deduplicating by content hash.
    ///
    /// Returns the record and whether an existing blob was reused.
    pub async fn store(&self, file_name: &str, data: &[u8]) -> Result<(StoredFile, bool)> {
        let content_hash = compute_content_hash(data);

        let existing = sqlx::query(
            "SELECT id, content_hash, file_name, storage_path, size_bytes, created_at \
             FROM stored_files WHERE content_hash = $1",
        )
        .bind(&content_hash)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            debug!(
                subsystem = "db",
                component = "files",
                op = "store",
                content_hash = %content_hash,
                "Identical upload found; reusing stored file"
            );
            return Ok((stored_file_from_row(&row), true));
        }

        let id = Uuid::now_v7();
        let path = generate_storage_path(&id);
        self.backend.write(&path, data).await?;

        let row = sqlx::query(
            "INSERT INTO stored_files (id, content_hash, file_name, storage_path, size_bytes) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (content_hash) DO NOTHING \
             RETURNING id, content_hash, file_name, storage_path, size_bytes, created_at",
        )
        .bind(id)
        .bind(&content_hash)
        .bind(file_name)
        .bind(&path)
        .bind(data.len() as i64)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok((stored_file_from_row(&row), false)),
            None => {
                // Concurrent upload of the same bytes won the insert; drop
                // our blob and return theirs.
                self.backend.delete(&path).await?;
                let row = sqlx::query(
                    "SELECT id, content_hash, file_name, storage_path, size_bytes, created_at \
                     FROM stored_files WHERE content_hash = $1",
                )
                .bind(&content_hash)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| Error::Internal("stored file vanished after conflict".into()))?;
                Ok((stored_file_from_row(&row), true))
            }
        }
    }

    /// Look up a stored file by content hash.
    pub async fn get_by_hash(&self, content_hash: &str) -> Result<Option<StoredFile>> {
        let row = sqlx::query(
            "SELECT id, content_hash, file_name, storage_path, size_bytes, created_at \
             FROM stored_files WHERE content_hash = $1",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| stored_file_from_row(&r)))
    }

    /// Read a stored file's bytes.
    pub async fn read(&self, id: Uuid) -> Result<Vec<u8>> {
        let row = sqlx::query("SELECT storage_path FROM stored_files WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Stored file {} not found", id)))?;

        let path: String = row.get("storage_path");
        self.backend.read(&path).await
    }

    /// Delete a stored file record and its blob.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let row = sqlx::query("DELETE FROM stored_files WHERE id = $1 RETURNING storage_path")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Stored file {} not found", id)))?;

        let path: String = row.get("storage_path");
        self.backend.delete(&path).await
    }
}

/// Convert a database row to a StoredFile.
fn stored_file_from_row(row: &sqlx::postgres::PgRow) -> StoredFile {
    StoredFile {
        id: row.get("id"),
        content_hash: row.get("content_hash"),
        file_name: row.get("file_name"),
        storage_path: row.get("storage_path"),
        size_bytes: row.get("size_bytes"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_content_hash_format() {
        let hash = compute_content_hash(b"test data");
        assert!(hash.starts_with("blake3:"));
        assert_eq!(hash.len(), "blake3:".len() + 64);
    }

    #[test]
    fn test_compute_content_hash_deterministic() {
        assert_eq!(compute_content_hash(b"abc"), compute_content_hash(b"abc"));
        assert_ne!(compute_content_hash(b"abc"), compute_content_hash(b"abd"));
    }

    #[test]
    fn test_generate_storage_path_shape() {
        let id = Uuid::parse_str("01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f").unwrap();
        let path = generate_storage_path(&id);
        assert_eq!(
            path,
            "blobs/01/94/01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f.pdf"
        );
    }

    #[tokio::test]
    async fn test_filesystem_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());

        backend.write("blobs/aa/bb/test.pdf", b"%PDF-1.4 data").await.unwrap();
        assert!(backend.exists("blobs/aa/bb/test.pdf").await.unwrap());

        let data = backend.read("blobs/aa/bb/test.pdf").await.unwrap();
        assert_eq!(data, b"%PDF-1.4 data");

        backend.delete("blobs/aa/bb/test.pdf").await.unwrap();
        assert!(!backend.exists("blobs/aa/bb/test.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn test_filesystem_backend_validate() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        backend.validate().await.unwrap();
    }
}
