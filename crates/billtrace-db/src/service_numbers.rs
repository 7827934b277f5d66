//! Service number registry.
//!
//! Tracks the lifecycle of every billed service identifier per account.
//! Service numbers are scoped per account: the conflict target is
//! `(service_number, service_account_id)`. The upsert never moves
//! `last_seen_*` backwards: bills for the same account can finish
//! out of order, and last-seen must follow bill dates, not arrival order.

use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use billtrace_core::{Error, NewServiceDetection, Result, ServiceNumber};

const SERVICE_NUMBER_COLUMNS: &str = "id, service_number, service_account_id, package_name, \
     first_seen_bill_id, first_seen_date, last_seen_bill_id, last_seen_date, \
     is_active, notes, created_at, updated_at";

/// One line item's service identity, as fed to the registry.
#[derive(Debug, Clone)]
pub struct ServiceSighting {
    pub service_number: String,
    pub package_name: Option<String>,
}

/// PostgreSQL implementation of the service number registry.
pub struct PgServiceNumberRepository {
    pool: PgPool,
}

impl PgServiceNumberRepository {
    /// Create a new PgServiceNumberRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All service numbers for an account, ordered by service number.
    pub async fn for_account(&self, account_id: Uuid) -> Result<Vec<ServiceNumber>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM service_numbers \
             WHERE service_account_id = $1 ORDER BY service_number",
            SERVICE_NUMBER_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(service_number_from_row).collect())
    }

    /// Whether a service number is already known on an account.
    pub async fn exists(&self, service_number: &str, account_id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM service_numbers \
             WHERE service_number = $1 AND service_account_id = $2",
        )
        .bind(service_number)
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    /// Get one service number row on an account.
    pub async fn get(
        &self,
        service_number: &str,
        account_id: Uuid,
    ) -> Result<Option<ServiceNumber>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM service_numbers \
             WHERE service_number = $1 AND service_account_id = $2",
            SERVICE_NUMBER_COLUMNS
        ))
        .bind(service_number)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| service_number_from_row(&r)))
    }

    /// Record one sighting of a service number on a bill.
    ///
    /// First sighting sets `first_seen_*`; every sighting advances
    /// `last_seen_*`, but only when the incoming bill date is not earlier
    /// than the stored one (compare-and-set, keeps last-seen monotonic under
    /// out-of-order ingestion). `package_name` is set once and never
    /// overwritten.
    pub async fn upsert_sighting(
        &self,
        account_id: Uuid,
        service_number: &str,
        package_name: Option<&str>,
        bill_id: Uuid,
        bill_date: NaiveDate,
    ) -> Result<ServiceNumber> {
        let row = sqlx::query(&format!(
            "INSERT INTO service_numbers (\
                id, service_number, service_account_id, package_name, \
                first_seen_bill_id, first_seen_date, last_seen_bill_id, last_seen_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $5, $6) \
             ON CONFLICT (service_number, service_account_id) DO UPDATE SET \
                package_name = COALESCE(service_numbers.package_name, EXCLUDED.package_name), \
                last_seen_bill_id = CASE \
                    WHEN service_numbers.last_seen_date IS NULL \
                      OR EXCLUDED.last_seen_date >= service_numbers.last_seen_date \
                    THEN EXCLUDED.last_seen_bill_id \
                    ELSE service_numbers.last_seen_bill_id END, \
                last_seen_date = CASE \
                    WHEN service_numbers.last_seen_date IS NULL \
                      OR EXCLUDED.last_seen_date >= service_numbers.last_seen_date \
                    THEN EXCLUDED.last_seen_date \
                    ELSE service_numbers.last_seen_date END, \
                updated_at = NOW() \
             RETURNING {}",
            SERVICE_NUMBER_COLUMNS
        ))
        .bind(Uuid::now_v7())
        .bind(service_number)
        .bind(account_id)
        .bind(package_name)
        .bind(bill_id)
        .bind(bill_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(service_number_from_row(&row))
    }

    /// Run first-seen detection and sighting upserts for every line item of
    /// a bill. Returns one detection record per item; the `is_new` subset is
    /// advisory for the caller (never a validation gate).
    pub async fn detect_for_bill(
        &self,
        bill_id: Uuid,
        bill_date: NaiveDate,
        account_id: Uuid,
        sightings: &[ServiceSighting],
    ) -> Result<Vec<NewServiceDetection>> {
        let mut detections = Vec::with_capacity(sightings.len());

        for sighting in sightings {
            let known = self.exists(&sighting.service_number, account_id).await?;

            self.upsert_sighting(
                account_id,
                &sighting.service_number,
                sighting.package_name.as_deref(),
                bill_id,
                bill_date,
            )
            .await?;

            if !known {
                debug!(
                    subsystem = "db",
                    component = "service_numbers",
                    op = "detect",
                    service_number = %sighting.service_number,
                    "First sighting of service number"
                );
            }

            detections.push(NewServiceDetection {
                service_number: sighting.service_number.clone(),
                package_name: sighting.package_name.clone(),
                is_new: !known,
            });
        }

        Ok(detections)
    }

    /// Mark a service number active or inactive.
    pub async fn set_active(
        &self,
        service_number: &str,
        account_id: Uuid,
        active: bool,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE service_numbers SET is_active = $3, updated_at = NOW() \
             WHERE service_number = $1 AND service_account_id = $2",
        )
        .bind(service_number)
        .bind(account_id)
        .bind(active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "Service number {} on account {}",
                service_number, account_id
            )));
        }
        Ok(())
    }

    /// Attach free-form notes to a service number.
    pub async fn set_notes(
        &self,
        service_number: &str,
        account_id: Uuid,
        notes: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE service_numbers SET notes = $3, updated_at = NOW() \
             WHERE service_number = $1 AND service_account_id = $2",
        )
        .bind(service_number)
        .bind(account_id)
        .bind(notes)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "Service number {} on account {}",
                service_number, account_id
            )));
        }
        Ok(())
    }

    /// Service numbers first recorded within the last `hours` hours.
    pub async fn recently_added(&self, hours: i32) -> Result<Vec<ServiceNumber>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM service_numbers \
             WHERE created_at >= NOW() - INTERVAL '1 hour' * $1 \
             ORDER BY created_at DESC",
            SERVICE_NUMBER_COLUMNS
        ))
        .bind(hours as f64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(service_number_from_row).collect())
    }
}

/// Convert a database row to a ServiceNumber.
fn service_number_from_row(row: &sqlx::postgres::PgRow) -> ServiceNumber {
    ServiceNumber {
        id: row.get("id"),
        service_number: row.get("service_number"),
        service_account_id: row.get("service_account_id"),
        package_name: row.get("package_name"),
        first_seen_bill_id: row.get("first_seen_bill_id"),
        first_seen_date: row.get("first_seen_date"),
        last_seen_bill_id: row.get("last_seen_bill_id"),
        last_seen_date: row.get("last_seen_date"),
        is_active: row.get("is_active"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
