//! # billtrace-db
//!
//! PostgreSQL database layer for billtrace.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for accounts, bills, service numbers,
//!   monthly charges, alerts and ingest jobs
//! - Content-addressed storage for uploaded PDFs
//! - An embedded, idempotent schema
//!
//! ## Example
//!
//! ```rust,ignore
//! use billtrace_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/billtrace").await?;
//!     db.ensure_schema().await?;
//!
//!     let account = db.accounts.get_by_number("BA11639924").await?;
//!     println!("{:?}", account);
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod alerts;
pub mod bills;
pub mod files;
pub mod ingest_jobs;
pub mod monthly_charges;
pub mod pool;
pub mod schema;
pub mod service_numbers;

// Test fixtures for integration tests.
// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL.
pub mod test_fixtures;

use std::sync::Arc;

use sqlx::PgPool;

use billtrace_core::Result;

// Re-export core types
pub use billtrace_core::*;

// Re-export repository implementations
pub use accounts::PgAccountRepository;
pub use alerts::PgAlertRepository;
pub use bills::{BillFileInfo, PgBillRepository};
pub use files::{
    compute_content_hash, generate_storage_path, FilesystemBackend, PgFileRepository,
    StorageBackend,
};
pub use ingest_jobs::PgIngestJobRepository;
pub use monthly_charges::{PgMonthlyChargeRepository, RecordedCharges};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use schema::SCHEMA_SQL;
pub use service_numbers::{PgServiceNumberRepository, ServiceSighting};

/// Whether a sqlx error is a PostgreSQL unique-constraint violation (23505).
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Bundle of all repositories over one connection pool.
#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
    pub accounts: Arc<PgAccountRepository>,
    pub bills: Arc<PgBillRepository>,
    pub service_numbers: Arc<PgServiceNumberRepository>,
    pub monthly_charges: Arc<PgMonthlyChargeRepository>,
    pub alerts: Arc<PgAlertRepository>,
    pub ingest_jobs: Arc<PgIngestJobRepository>,
}

impl Database {
    /// Connect with default pool configuration.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::from_pool(pool))
    }

    /// Connect with custom pool configuration.
    pub async fn connect_with_config(database_url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(database_url, config).await?;
        Ok(Self::from_pool(pool))
    }

    /// Build the repository bundle over an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            accounts: Arc::new(PgAccountRepository::new(pool.clone())),
            bills: Arc::new(PgBillRepository::new(pool.clone())),
            service_numbers: Arc::new(PgServiceNumberRepository::new(pool.clone())),
            monthly_charges: Arc::new(PgMonthlyChargeRepository::new(pool.clone())),
            alerts: Arc::new(PgAlertRepository::new(pool.clone())),
            ingest_jobs: Arc::new(PgIngestJobRepository::new(pool.clone())),
            pool,
        }
    }

    /// Apply the embedded schema idempotently.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }
}
