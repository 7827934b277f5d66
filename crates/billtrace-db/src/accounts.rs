//! Service account repository.
//!
//! Accounts are created either explicitly or implicitly by
//! [`PgAccountRepository::auto_register`] when an ingested bill references an
//! unknown account number. Auto-registration races are settled by the unique
//! constraint on `account_number`, not by locks.

use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use billtrace_core::{
    defaults, CreateAccountRequest, Error, MonthlyTotal, Result, ServiceAccount,
    UpdateAccountRequest,
};

use crate::is_unique_violation;

const ACCOUNT_COLUMNS: &str = "id, account_number, account_name, provider, description, \
                               is_active, created_at, updated_at";

/// PostgreSQL implementation of the account registry.
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    /// Create a new PgAccountRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get an account by ID.
    pub async fn get(&self, id: Uuid) -> Result<ServiceAccount> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM service_accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::AccountNotFound(id))?;

        Ok(account_from_row(&row))
    }

    /// Look up an account by its account number.
    pub async fn get_by_number(&self, account_number: &str) -> Result<Option<ServiceAccount>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM service_accounts WHERE account_number = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| account_from_row(&r)))
    }

    /// List all accounts ordered by name.
    pub async fn list(&self) -> Result<Vec<ServiceAccount>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM service_accounts ORDER BY account_name ASC",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(account_from_row).collect())
    }

    /// List active accounts ordered by name.
    pub async fn list_active(&self) -> Result<Vec<ServiceAccount>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM service_accounts WHERE is_active = TRUE ORDER BY account_name ASC",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(account_from_row).collect())
    }

    /// Explicitly create an account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] when the account number is taken.
    pub async fn create(&self, request: CreateAccountRequest) -> Result<ServiceAccount> {
        let id = Uuid::now_v7();
        let provider = request
            .provider
            .unwrap_or_else(|| defaults::DEFAULT_PROVIDER.to_string());

        let row = sqlx::query(&format!(
            "INSERT INTO service_accounts (id, account_number, account_name, provider, description) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .bind(&request.account_number)
        .bind(&request.account_name)
        .bind(&provider)
        .bind(&request.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::AlreadyExists(format!(
                    "Account with number {} already exists",
                    request.account_number
                ))
            } else {
                Error::Database(e)
            }
        })?;

        Ok(account_from_row(&row))
    }

    /// Update account fields; unset fields are left unchanged.
    pub async fn update(&self, id: Uuid, request: UpdateAccountRequest) -> Result<ServiceAccount> {
        let row = sqlx::query(&format!(
            "UPDATE service_accounts SET \
                account_name = COALESCE($2, account_name), \
                provider = COALESCE($3, provider), \
                description = COALESCE($4, description), \
                is_active = COALESCE($5, is_active), \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .bind(&request.account_name)
        .bind(&request.provider)
        .bind(&request.description)
        .bind(request.is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::AccountNotFound(id))?;

        Ok(account_from_row(&row))
    }

    /// Delete an account.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM service_accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::AccountNotFound(id));
        }
        Ok(())
    }

    /// Resolve an account number to an account, auto-creating a placeholder
    /// when absent. Returns the account and whether it was created here.
    ///
    /// Concurrent resolution of the same unknown number is settled by the
    /// uniqueness constraint: the loser of the insert race re-reads the
    /// winner's row.
    pub async fn auto_register(
        &self,
        account_number: &str,
        provider: &str,
    ) -> Result<(ServiceAccount, bool)> {
        if let Some(existing) = self.get_by_number(account_number).await? {
            return Ok((existing, false));
        }

        let id = Uuid::now_v7();
        let account_name = format!("Auto-registered {}", account_number);
        let description =
            "Automatically registered during bill processing. Please update account details.";

        let inserted = sqlx::query(&format!(
            "INSERT INTO service_accounts (id, account_number, account_name, provider, description) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (account_number) DO NOTHING \
             RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .bind(account_number)
        .bind(&account_name)
        .bind(provider)
        .bind(description)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => {
                info!(
                    subsystem = "db",
                    component = "accounts",
                    op = "auto_register",
                    account_number,
                    "Auto-registered new account"
                );
                Ok((account_from_row(&row), true))
            }
            None => {
                // Lost the race; the other writer's row is authoritative.
                let existing = self
                    .get_by_number(account_number)
                    .await?
                    .ok_or_else(|| Error::Internal("account vanished after conflict".into()))?;
                Ok((existing, false))
            }
        }
    }

    /// Accounts created within the last `hours` hours, newest first.
    pub async fn recently_added(&self, hours: i32) -> Result<Vec<ServiceAccount>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM service_accounts \
             WHERE created_at >= NOW() - INTERVAL '1 hour' * $1 \
             ORDER BY created_at DESC",
            ACCOUNT_COLUMNS
        ))
        .bind(hours as f64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(account_from_row).collect())
    }

    /// Monthly spending totals for one account and year, over completed
    /// bills. Always returns 12 buckets; months with no bills are zero.
    pub async fn monthly_totals(&self, account_id: Uuid, year: i32) -> Result<Vec<MonthlyTotal>> {
        let rows = sqlx::query(
            "SELECT EXTRACT(MONTH FROM billing_period_start)::INT AS month, \
                    COALESCE(SUM(total_due), 0) AS total \
             FROM bills \
             WHERE service_account_id = $1 \
               AND EXTRACT(YEAR FROM billing_period_start) = $2 \
               AND processing_status = 'completed' \
             GROUP BY EXTRACT(MONTH FROM billing_period_start) \
             ORDER BY month",
        )
        .bind(account_id)
        .bind(year as f64)
        .fetch_all(&self.pool)
        .await?;

        let mut totals: Vec<MonthlyTotal> = (1..=12).map(|m| MonthlyTotal { month: m, total: 0.0 }).collect();
        for row in rows {
            let month: i32 = row.get("month");
            let total: f64 = row.get("total");
            if (1..=12).contains(&month) {
                totals[(month - 1) as usize].total = total;
            }
        }

        Ok(totals)
    }
}

/// Convert a database row to a ServiceAccount.
fn account_from_row(row: &sqlx::postgres::PgRow) -> ServiceAccount {
    ServiceAccount {
        id: row.get("id"),
        account_number: row.get("account_number"),
        account_name: row.get("account_name"),
        provider: row.get("provider"),
        description: row.get("description"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
