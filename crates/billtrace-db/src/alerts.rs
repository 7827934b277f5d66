//! Alert repository.
//!
//! Alert rows move through a small state machine:
//! `active → acknowledged → resolved`, or `active → dismissed`.
//! Transitions are guarded in SQL: an update from the wrong state affects
//! zero rows and surfaces as [`Error::StateConflict`], so two operators
//! cannot both resolve the same alert.

use sqlx::{PgPool, Row};
use uuid::Uuid;

use billtrace_core::{
    Alert, AlertSeverity, AlertStatus, AlertType, CreateAlertRequest, Error, Result,
};

const ALERT_COLUMNS: &str = "id, bill_id, service_account_id, alert_type, severity, \
     current_amount, previous_amount, percentage_increase, threshold_exceeded, \
     title, description, status, acknowledged_at, acknowledged_by, \
     resolved_at, resolved_by, resolution_notes, metadata, created_at, updated_at";

/// PostgreSQL implementation of the alert repository.
pub struct PgAlertRepository {
    pool: PgPool,
}

impl PgAlertRepository {
    /// Create a new PgAlertRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new alert in `active` state.
    pub async fn create(&self, request: CreateAlertRequest) -> Result<Alert> {
        let row = sqlx::query(&format!(
            "INSERT INTO alerts (\
                id, bill_id, service_account_id, alert_type, severity, \
                current_amount, previous_amount, percentage_increase, \
                threshold_exceeded, title, description, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {}",
            ALERT_COLUMNS
        ))
        .bind(Uuid::now_v7())
        .bind(request.bill_id)
        .bind(request.service_account_id)
        .bind(request.alert_type.as_str())
        .bind(request.severity.as_str())
        .bind(request.current_amount)
        .bind(request.previous_amount)
        .bind(request.percentage_increase)
        .bind(request.threshold_exceeded)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(alert_from_row(&row))
    }

    /// All alerts, newest first.
    pub async fn list(&self) -> Result<Vec<Alert>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM alerts ORDER BY created_at DESC",
            ALERT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(alert_from_row).collect())
    }

    /// Active alerts, newest first.
    pub async fn active(&self) -> Result<Vec<Alert>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM alerts WHERE status = 'active' ORDER BY created_at DESC",
            ALERT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(alert_from_row).collect())
    }

    /// Alerts raised against one bill.
    pub async fn for_bill(&self, bill_id: Uuid) -> Result<Vec<Alert>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM alerts WHERE bill_id = $1 ORDER BY created_at DESC",
            ALERT_COLUMNS
        ))
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(alert_from_row).collect())
    }

    /// Active alerts for one account.
    pub async fn for_account(&self, account_id: Uuid) -> Result<Vec<Alert>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM alerts \
             WHERE service_account_id = $1 AND status = 'active' \
             ORDER BY created_at DESC",
            ALERT_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(alert_from_row).collect())
    }

    /// Whether a high-charge alert already exists for a bill. The alert
    /// engine checks this before inserting so re-running post-processing
    /// never re-alerts.
    pub async fn high_charge_exists_for_bill(&self, bill_id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM alerts \
             WHERE bill_id = $1 AND alert_type = 'high_charge'",
        )
        .bind(bill_id)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    /// Acknowledge an active alert.
    pub async fn acknowledge(&self, alert_id: Uuid, acknowledged_by: Option<&str>) -> Result<Alert> {
        let row = sqlx::query(&format!(
            "UPDATE alerts \
             SET status = 'acknowledged', \
                 acknowledged_at = NOW(), \
                 acknowledged_by = $2, \
                 updated_at = NOW() \
             WHERE id = $1 AND status = 'active' \
             RETURNING {}",
            ALERT_COLUMNS
        ))
        .bind(alert_id)
        .bind(acknowledged_by)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(alert_from_row(&row)),
            None => Err(self.transition_error(alert_id, "acknowledge").await),
        }
    }

    /// Resolve an active or acknowledged alert.
    pub async fn resolve(
        &self,
        alert_id: Uuid,
        resolved_by: Option<&str>,
        resolution_notes: Option<&str>,
    ) -> Result<Alert> {
        let row = sqlx::query(&format!(
            "UPDATE alerts \
             SET status = 'resolved', \
                 resolved_at = NOW(), \
                 resolved_by = $2, \
                 resolution_notes = $3, \
                 updated_at = NOW() \
             WHERE id = $1 AND status IN ('active', 'acknowledged') \
             RETURNING {}",
            ALERT_COLUMNS
        ))
        .bind(alert_id)
        .bind(resolved_by)
        .bind(resolution_notes)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(alert_from_row(&row)),
            None => Err(self.transition_error(alert_id, "resolve").await),
        }
    }

    /// Dismiss an active alert.
    pub async fn dismiss(&self, alert_id: Uuid) -> Result<Alert> {
        let row = sqlx::query(&format!(
            "UPDATE alerts \
             SET status = 'dismissed', updated_at = NOW() \
             WHERE id = $1 AND status = 'active' \
             RETURNING {}",
            ALERT_COLUMNS
        ))
        .bind(alert_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(alert_from_row(&row)),
            None => Err(self.transition_error(alert_id, "dismiss").await),
        }
    }

    /// Distinguish "no such alert" from "alert in the wrong state" after a
    /// zero-row guarded update.
    async fn transition_error(&self, alert_id: Uuid, op: &str) -> Error {
        let current = sqlx::query("SELECT status FROM alerts WHERE id = $1")
            .bind(alert_id)
            .fetch_optional(&self.pool)
            .await;

        match current {
            Ok(Some(row)) => {
                let status: String = row.get("status");
                Error::StateConflict(format!(
                    "cannot {} alert {} in state {}",
                    op, alert_id, status
                ))
            }
            Ok(None) => Error::NotFound(format!("Alert {} not found", alert_id)),
            Err(e) => Error::Database(e),
        }
    }
}

/// Parse alert type from its database string.
fn parse_alert_type(s: &str) -> AlertType {
    match s {
        "high_charge" => AlertType::HighCharge,
        "new_line_item" => AlertType::NewLineItem,
        "unusual_usage" => AlertType::UnusualUsage,
        "missing_line_item" => AlertType::MissingLineItem,
        _ => AlertType::HighCharge,
    }
}

/// Parse alert severity from its database string.
fn parse_alert_severity(s: &str) -> AlertSeverity {
    match s {
        "low" => AlertSeverity::Low,
        "medium" => AlertSeverity::Medium,
        "high" => AlertSeverity::High,
        "critical" => AlertSeverity::Critical,
        _ => AlertSeverity::Medium,
    }
}

/// Parse alert status from its database string.
fn parse_alert_status(s: &str) -> AlertStatus {
    match s {
        "active" => AlertStatus::Active,
        "acknowledged" => AlertStatus::Acknowledged,
        "resolved" => AlertStatus::Resolved,
        "dismissed" => AlertStatus::Dismissed,
        _ => AlertStatus::Active,
    }
}

/// Convert a database row to an Alert.
fn alert_from_row(row: &sqlx::postgres::PgRow) -> Alert {
    Alert {
        id: row.get("id"),
        bill_id: row.get("bill_id"),
        service_account_id: row.get("service_account_id"),
        alert_type: parse_alert_type(row.get("alert_type")),
        severity: parse_alert_severity(row.get("severity")),
        current_amount: row.get("current_amount"),
        previous_amount: row.get("previous_amount"),
        percentage_increase: row.get("percentage_increase"),
        threshold_exceeded: row.get("threshold_exceeded"),
        title: row.get("title"),
        description: row.get("description"),
        status: parse_alert_status(row.get("status")),
        acknowledged_at: row.get("acknowledged_at"),
        acknowledged_by: row.get("acknowledged_by"),
        resolved_at: row.get("resolved_at"),
        resolved_by: row.get("resolved_by"),
        resolution_notes: row.get("resolution_notes"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_alert_status() {
        assert_eq!(parse_alert_status("active"), AlertStatus::Active);
        assert_eq!(parse_alert_status("resolved"), AlertStatus::Resolved);
        assert_eq!(parse_alert_status("bogus"), AlertStatus::Active);
    }

    #[test]
    fn test_parse_alert_severity() {
        assert_eq!(parse_alert_severity("critical"), AlertSeverity::Critical);
        assert_eq!(parse_alert_severity("high"), AlertSeverity::High);
        assert_eq!(parse_alert_severity("bogus"), AlertSeverity::Medium);
    }
}
