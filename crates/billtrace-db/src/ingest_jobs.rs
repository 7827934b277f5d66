//! Durable ingestion job records.
//!
//! Each ingestion attempt gets one row keyed by a stable id, updated as the
//! pipeline advances. Status survives the process and is queryable from any
//! instance. Nothing about an in-flight ingestion lives only in memory.

use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use billtrace_core::{Error, IngestJob, IngestState, Result};

const JOB_COLUMNS: &str =
    "id, bill_id, file_name, state, error_message, created_at, updated_at, completed_at";

/// PostgreSQL implementation of the ingest job repository.
pub struct PgIngestJobRepository {
    pool: PgPool,
}

impl PgIngestJobRepository {
    /// Create a new PgIngestJobRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a job record in `uploaded` state.
    pub async fn create(&self, file_name: &str) -> Result<IngestJob> {
        let row = sqlx::query(&format!(
            "INSERT INTO ingest_jobs (id, file_name, state) \
             VALUES ($1, $2, 'uploaded') \
             RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(Uuid::now_v7())
        .bind(file_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(job_from_row(&row))
    }

    /// Get a job by ID.
    pub async fn get(&self, id: Uuid) -> Result<IngestJob> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM ingest_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Ingest job {} not found", id)))?;

        Ok(job_from_row(&row))
    }

    /// Advance a job to a non-terminal pipeline state.
    ///
    /// Jobs already in a terminal state are left untouched and surface a
    /// state conflict.
    pub async fn set_state(&self, id: Uuid, state: IngestState) -> Result<()> {
        let result = sqlx::query(
            "UPDATE ingest_jobs SET state = $2, updated_at = NOW() \
             WHERE id = $1 \
               AND state NOT IN ('completed', 'failed', 'cancelled', 'duplicate_pending')",
        )
        .bind(id)
        .bind(state.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::StateConflict(format!(
                "ingest job {} is terminal or missing",
                id
            )));
        }

        debug!(
            subsystem = "db",
            component = "ingest_jobs",
            op = "set_state",
            job_id = %id,
            state = %state,
            "Ingest job advanced"
        );
        Ok(())
    }

    /// Attach the persisted bill to a job.
    pub async fn set_bill(&self, id: Uuid, bill_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE ingest_jobs SET bill_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(bill_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Terminate a job in `completed`.
    pub async fn complete(&self, id: Uuid) -> Result<()> {
        self.finish(id, IngestState::Completed, None).await
    }

    /// Terminate a job in `duplicate_pending`, awaiting a caller decision.
    pub async fn duplicate_pending(&self, id: Uuid, reason: &str) -> Result<()> {
        self.finish(id, IngestState::DuplicatePending, Some(reason))
            .await
    }

    /// Terminate a job in `failed` with an error message.
    pub async fn fail(&self, id: Uuid, message: &str) -> Result<()> {
        self.finish(id, IngestState::Failed, Some(message)).await
    }

    /// Terminate a job in `cancelled`.
    pub async fn cancel(&self, id: Uuid) -> Result<()> {
        self.finish(id, IngestState::Cancelled, None).await
    }

    async fn finish(&self, id: Uuid, state: IngestState, message: Option<&str>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE ingest_jobs \
             SET state = $2, error_message = $3, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 \
               AND state NOT IN ('completed', 'failed', 'cancelled', 'duplicate_pending')",
        )
        .bind(id)
        .bind(state.as_str())
        .bind(message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::StateConflict(format!(
                "ingest job {} is already terminal or missing",
                id
            )));
        }
        Ok(())
    }

    /// Jobs not yet in a terminal state, oldest first.
    pub async fn list_active(&self) -> Result<Vec<IngestJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ingest_jobs \
             WHERE state NOT IN ('completed', 'failed', 'cancelled', 'duplicate_pending') \
             ORDER BY created_at",
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(job_from_row).collect())
    }
}

/// Parse pipeline state from its database string.
fn parse_ingest_state(s: &str) -> IngestState {
    match s {
        "uploaded" => IngestState::Uploaded,
        "quick_scanned" => IngestState::QuickScanned,
        "duplicate_pending" => IngestState::DuplicatePending,
        "validating" => IngestState::Validating,
        "extracted" => IngestState::Extracted,
        "account_resolved" => IngestState::AccountResolved,
        "persisted" => IngestState::Persisted,
        "post_processed" => IngestState::PostProcessed,
        "completed" => IngestState::Completed,
        "failed" => IngestState::Failed,
        "cancelled" => IngestState::Cancelled,
        _ => IngestState::Uploaded,
    }
}

/// Convert a database row to an IngestJob.
fn job_from_row(row: &sqlx::postgres::PgRow) -> IngestJob {
    IngestJob {
        id: row.get("id"),
        bill_id: row.get("bill_id"),
        file_name: row.get("file_name"),
        state: parse_ingest_state(row.get("state")),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingest_state_round_trip() {
        for state in [
            IngestState::Uploaded,
            IngestState::QuickScanned,
            IngestState::DuplicatePending,
            IngestState::Validating,
            IngestState::Extracted,
            IngestState::AccountResolved,
            IngestState::Persisted,
            IngestState::PostProcessed,
            IngestState::Completed,
            IngestState::Failed,
            IngestState::Cancelled,
        ] {
            assert_eq!(parse_ingest_state(state.as_str()), state);
        }
    }

    #[test]
    fn test_parse_ingest_state_fallback() {
        assert_eq!(parse_ingest_state("bogus"), IngestState::Uploaded);
    }
}
