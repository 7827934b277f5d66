//! High-charge alert engine.
//!
//! Compares a newly completed bill against the most recent prior completed
//! bill on the same account and raises one `high_charge` alert when the
//! total grows past the threshold. Runs once per ingested bill; re-running
//! post-processing is a no-op thanks to the per-bill existence guard.

use tracing::{debug, info};

use billtrace_core::{
    defaults, Alert, AlertSeverity, AlertType, Bill, CreateAlertRequest, Result,
};
use billtrace_db::Database;

/// Severity for a given percentage increase. Thresholds are evaluated
/// high-to-low; first match wins.
pub fn severity_for_increase(percentage_increase: f64) -> AlertSeverity {
    if percentage_increase >= defaults::SEVERITY_CRITICAL_PCT {
        AlertSeverity::Critical
    } else if percentage_increase >= defaults::SEVERITY_HIGH_PCT {
        AlertSeverity::High
    } else {
        AlertSeverity::Medium
    }
}

/// Percentage change from `previous` to `current`.
pub fn percentage_increase(previous_total: f64, current_total: f64) -> f64 {
    (current_total - previous_total) / previous_total * 100.0
}

/// Repository-backed alert engine.
pub struct AlertEngine {
    db: Database,
    threshold_pct: f64,
}

impl AlertEngine {
    pub fn new(db: Database, threshold_pct: f64) -> Self {
        Self { db, threshold_pct }
    }

    /// Detect and persist alerts for a newly ingested bill. Returns the
    /// alerts created (empty when nothing crossed the threshold).
    pub async fn detect_for_bill(&self, bill: &Bill) -> Result<Vec<Alert>> {
        let Some(account_id) = bill.service_account_id else {
            // No account, nothing to compare against.
            return Ok(Vec::new());
        };

        // At most one high-charge check per bill; re-reads never re-alert.
        if self.db.alerts.high_charge_exists_for_bill(bill.id).await? {
            debug!(
                subsystem = "ingest",
                component = "alert_engine",
                bill_id = %bill.id,
                "High-charge alert already exists; skipping"
            );
            return Ok(Vec::new());
        }

        let Some(previous) = self
            .db
            .bills
            .previous_completed_bill(account_id, bill.billing_period_start)
            .await?
        else {
            return Ok(Vec::new());
        };

        if previous.total_due <= 0.0 {
            return Ok(Vec::new());
        }

        let increase_pct = percentage_increase(previous.total_due, bill.total_due);
        if increase_pct < self.threshold_pct {
            return Ok(Vec::new());
        }

        let severity = severity_for_increase(increase_pct);
        let alert = self
            .db
            .alerts
            .create(CreateAlertRequest {
                bill_id: bill.id,
                service_account_id: account_id,
                alert_type: AlertType::HighCharge,
                severity,
                current_amount: Some(bill.total_due),
                previous_amount: Some(previous.total_due),
                percentage_increase: Some(increase_pct),
                threshold_exceeded: Some(self.threshold_pct),
                title: format!("Bill increased by {:.1}%", increase_pct),
                description: Some(format!(
                    "Current bill (MVR {:.2}) is {:.1}% higher than last period (MVR {:.2})",
                    bill.total_due, increase_pct, previous.total_due
                )),
                metadata: Some(serde_json::json!({
                    "previous_invoice": previous.invoice_number,
                    "increase_amount": bill.total_due - previous.total_due,
                })),
            })
            .await?;

        info!(
            subsystem = "ingest",
            component = "alert_engine",
            op = "detect",
            bill_id = %bill.id,
            severity = %alert.severity,
            percentage_increase = increase_pct,
            "High-charge alert raised"
        );

        Ok(vec![alert])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_increase() {
        assert_eq!(percentage_increase(100.0, 125.0), 25.0);
        assert_eq!(percentage_increase(100.0, 90.0), -10.0);
        assert_eq!(percentage_increase(200.0, 300.0), 50.0);
    }

    #[test]
    fn test_severity_medium_band() {
        // 20..30 is medium
        assert_eq!(severity_for_increase(20.0), AlertSeverity::Medium);
        assert_eq!(severity_for_increase(25.0), AlertSeverity::Medium);
        assert_eq!(severity_for_increase(29.9), AlertSeverity::Medium);
    }

    #[test]
    fn test_severity_high_band() {
        assert_eq!(severity_for_increase(30.0), AlertSeverity::High);
        assert_eq!(severity_for_increase(49.9), AlertSeverity::High);
    }

    #[test]
    fn test_severity_critical_band() {
        assert_eq!(severity_for_increase(50.0), AlertSeverity::Critical);
        assert_eq!(severity_for_increase(400.0), AlertSeverity::Critical);
    }

    #[test]
    fn test_bands_from_previous_100() {
        assert_eq!(
            severity_for_increase(percentage_increase(100.0, 125.0)),
            AlertSeverity::Medium
        );
        assert_eq!(
            severity_for_increase(percentage_increase(100.0, 135.0)),
            AlertSeverity::High
        );
        assert_eq!(
            severity_for_increase(percentage_increase(100.0, 200.0)),
            AlertSeverity::Critical
        );
    }
}
