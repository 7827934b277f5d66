//! Monthly charge ledger.
//!
//! One row per (service_number, bill): a billing-period-scoped snapshot of a
//! line item's charge breakdown. The upsert makes bill reprocessing
//! idempotent: charge fields are refreshed, rows are never duplicated.

use sqlx::{PgPool, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use billtrace_core::{ChargeTotals, Error, MonthlyCharge, Result};

const MONTHLY_CHARGE_COLUMNS: &str = "id, service_number_id, bill_id, line_item_id, \
     service_number, billing_period_start, billing_period_end, bill_date, \
     subscription_charge, usage_charges, other_charges, total_charge, \
     package_name, created_at, updated_at";

/// Outcome of recording a bill into the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedCharges {
    /// Rows actually upserted.
    pub recorded: usize,
    /// Line items carried by the bill.
    pub line_items: usize,
}

/// PostgreSQL implementation of the monthly charge ledger.
pub struct PgMonthlyChargeRepository {
    pool: PgPool,
}

impl PgMonthlyChargeRepository {
    /// Create a new PgMonthlyChargeRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert one charge row keyed by (service_number, bill_id).
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        service_number_id: Uuid,
        bill_id: Uuid,
        line_item_id: Uuid,
        service_number: &str,
        billing_period_start: chrono::NaiveDate,
        billing_period_end: chrono::NaiveDate,
        bill_date: chrono::NaiveDate,
        subscription_charge: f64,
        usage_charges: f64,
        other_charges: f64,
        total_charge: f64,
        package_name: Option<&str>,
    ) -> Result<MonthlyCharge> {
        let row = sqlx::query(&format!(
            "INSERT INTO service_number_monthly_charges (\
                id, service_number_id, bill_id, line_item_id, service_number, \
                billing_period_start, billing_period_end, bill_date, \
                subscription_charge, usage_charges, other_charges, total_charge, \
                package_name) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (service_number, bill_id) DO UPDATE SET \
                subscription_charge = EXCLUDED.subscription_charge, \
                usage_charges = EXCLUDED.usage_charges, \
                other_charges = EXCLUDED.other_charges, \
                total_charge = EXCLUDED.total_charge, \
                package_name = EXCLUDED.package_name, \
                updated_at = NOW() \
             RETURNING {}",
            MONTHLY_CHARGE_COLUMNS
        ))
        .bind(Uuid::now_v7())
        .bind(service_number_id)
        .bind(bill_id)
        .bind(line_item_id)
        .bind(service_number)
        .bind(billing_period_start)
        .bind(billing_period_end)
        .bind(bill_date)
        .bind(subscription_charge)
        .bind(usage_charges)
        .bind(other_charges)
        .bind(total_charge)
        .bind(package_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(monthly_charge_from_row(&row))
    }

    /// Record charge rows for every line item of a bill whose service number
    /// resolves to a registry row on the account. Unresolvable items (e.g. a
    /// registry race) are skipped, not failed.
    pub async fn record_for_bill(&self, bill_id: Uuid, account_id: Uuid) -> Result<RecordedCharges> {
        let bill = sqlx::query(
            "SELECT billing_period_start, billing_period_end, bill_date \
             FROM bills WHERE id = $1",
        )
        .bind(bill_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::BillNotFound(bill_id))?;

        let period_start: chrono::NaiveDate = bill.get("billing_period_start");
        let period_end: chrono::NaiveDate = bill.get("billing_period_end");
        let bill_date: chrono::NaiveDate = bill.get("bill_date");

        let items = sqlx::query(
            "SELECT li.id, li.service_number, li.package_name, \
                    li.subscription_charge, li.usage_charges, li.other_charges, \
                    li.total_charge, sn.id AS service_number_id \
             FROM line_items li \
             LEFT JOIN service_numbers sn \
               ON li.service_number = sn.service_number \
              AND sn.service_account_id = $2 \
             WHERE li.bill_id = $1",
        )
        .bind(bill_id)
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        let line_items = items.len();
        let mut recorded = 0;

        for item in items {
            let service_number: String = item.get("service_number");
            let Some(service_number_id) = item.get::<Option<Uuid>, _>("service_number_id") else {
                warn!(
                    subsystem = "db",
                    component = "monthly_charges",
                    op = "record_for_bill",
                    bill_id = %bill_id,
                    service_number = %service_number,
                    "Line item has no registry row; charge not recorded"
                );
                continue;
            };

            self.upsert(
                service_number_id,
                bill_id,
                item.get("id"),
                &service_number,
                period_start,
                period_end,
                bill_date,
                item.get("subscription_charge"),
                item.get("usage_charges"),
                item.get("other_charges"),
                item.get("total_charge"),
                item.get::<Option<String>, _>("package_name").as_deref(),
            )
            .await?;
            recorded += 1;
        }

        debug!(
            subsystem = "db",
            component = "monthly_charges",
            op = "record_for_bill",
            bill_id = %bill_id,
            charges_recorded = recorded,
            line_item_count = line_items,
            "Monthly charges recorded"
        );

        Ok(RecordedCharges {
            recorded,
            line_items,
        })
    }

    /// Charge history for one service number, newest bill first.
    pub async fn history_for_service_number(
        &self,
        service_number: &str,
    ) -> Result<Vec<MonthlyCharge>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM service_number_monthly_charges \
             WHERE service_number = $1 ORDER BY bill_date DESC",
            MONTHLY_CHARGE_COLUMNS
        ))
        .bind(service_number)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(monthly_charge_from_row).collect())
    }

    /// Charge rows recorded from one bill, ordered by service number.
    pub async fn for_bill(&self, bill_id: Uuid) -> Result<Vec<MonthlyCharge>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM service_number_monthly_charges \
             WHERE bill_id = $1 ORDER BY service_number",
            MONTHLY_CHARGE_COLUMNS
        ))
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(monthly_charge_from_row).collect())
    }

    /// Lifetime totals for one service number across all recorded periods.
    pub async fn totals_for_service_number(&self, service_number: &str) -> Result<ChargeTotals> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(subscription_charge), 0) AS total_subscription, \
                    COALESCE(SUM(usage_charges), 0) AS total_usage, \
                    COALESCE(SUM(other_charges), 0) AS total_other, \
                    COALESCE(SUM(total_charge), 0) AS total_all, \
                    COUNT(*) AS month_count \
             FROM service_number_monthly_charges \
             WHERE service_number = $1",
        )
        .bind(service_number)
        .fetch_one(&self.pool)
        .await?;

        Ok(ChargeTotals {
            total_subscription: row.get("total_subscription"),
            total_usage: row.get("total_usage"),
            total_other: row.get("total_other"),
            total_all: row.get("total_all"),
            month_count: row.get("month_count"),
        })
    }
}

/// Convert a database row to a MonthlyCharge.
fn monthly_charge_from_row(row: &sqlx::postgres::PgRow) -> MonthlyCharge {
    MonthlyCharge {
        id: row.get("id"),
        service_number_id: row.get("service_number_id"),
        bill_id: row.get("bill_id"),
        line_item_id: row.get("line_item_id"),
        service_number: row.get("service_number"),
        billing_period_start: row.get("billing_period_start"),
        billing_period_end: row.get("billing_period_end"),
        bill_date: row.get("bill_date"),
        subscription_charge: row.get("subscription_charge"),
        usage_charges: row.get("usage_charges"),
        other_charges: row.get("other_charges"),
        total_charge: row.get("total_charge"),
        package_name: row.get("package_name"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
