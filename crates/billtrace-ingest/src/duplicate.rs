//! Two-phase duplicate detection.
//!
//! Phase 1 runs before full extraction with only the quick-scan identity
//! (invoice number + file identity). Phase 2 runs after full extraction and
//! additionally sees the billing period. When several checks would match,
//! precedence is invoice > file > billing period, and the first match is
//! reported, not all of them.

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use billtrace_core::{DuplicateMatch, DuplicateReason, Result};
use billtrace_db::Database;

/// Repository-backed duplicate detector.
pub struct DuplicateDetector {
    db: Database,
}

impl DuplicateDetector {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Pre-extraction check: invoice number, then file identity.
    ///
    /// Billing-period duplicates cannot be seen here; the period bounds
    /// only exist after full extraction.
    pub async fn phase1(
        &self,
        invoice_number: Option<&str>,
        content_hash: Option<&str>,
        file_name: &str,
    ) -> Result<Option<DuplicateMatch>> {
        if let Some(invoice_number) = invoice_number {
            if let Some(existing) = self.db.bills.get_by_invoice_number(invoice_number).await? {
                return Ok(Some(found(DuplicateReason::Invoice, existing)));
            }
        }

        self.check_file(content_hash, file_name).await
    }

    /// Post-extraction check: invoice number, file identity, then a
    /// completed bill on the same account covering the same billing period.
    ///
    /// `account_id` is the already-registered account for the extracted
    /// account number, if any. An unknown account cannot have a
    /// billing-period duplicate.
    #[allow(clippy::too_many_arguments)]
    pub async fn phase2(
        &self,
        invoice_number: &str,
        content_hash: Option<&str>,
        file_name: &str,
        account_id: Option<Uuid>,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Option<DuplicateMatch>> {
        if let Some(existing) = self.db.bills.get_by_invoice_number(invoice_number).await? {
            return Ok(Some(found(DuplicateReason::Invoice, existing)));
        }

        if let Some(matched) = self.check_file(content_hash, file_name).await? {
            return Ok(Some(matched));
        }

        if let Some(account_id) = account_id {
            if let Some(existing) = self
                .db
                .bills
                .get_by_billing_period(account_id, period_start, period_end)
                .await?
            {
                return Ok(Some(found(DuplicateReason::BillingPeriod, existing)));
            }
        }

        Ok(None)
    }

    /// File-identity check: content hash first (exact bytes), then the
    /// original file name.
    async fn check_file(
        &self,
        content_hash: Option<&str>,
        file_name: &str,
    ) -> Result<Option<DuplicateMatch>> {
        if let Some(content_hash) = content_hash {
            if let Some(existing) = self.db.bills.get_by_content_hash(content_hash).await? {
                return Ok(Some(found(DuplicateReason::File, existing)));
            }
        }

        if let Some(existing) = self.db.bills.get_by_file_name(file_name).await? {
            return Ok(Some(found(DuplicateReason::File, existing)));
        }

        Ok(None)
    }
}

fn found(reason: DuplicateReason, existing_bill: billtrace_core::Bill) -> DuplicateMatch {
    debug!(
        subsystem = "ingest",
        component = "duplicate",
        duplicate_reason = %reason,
        bill_id = %existing_bill.id,
        "Duplicate detected"
    );
    DuplicateMatch {
        reason,
        existing_bill,
    }
}

/// Human-readable explanation for a duplicate, shown to the caller deciding
/// whether to proceed.
pub fn describe(matched: &DuplicateMatch) -> String {
    match matched.reason {
        DuplicateReason::Invoice => format!(
            "Invoice {} already exists in the system.",
            matched.existing_bill.invoice_number
        ),
        DuplicateReason::File => format!(
            "File \"{}\" has already been uploaded.",
            matched.existing_bill.file_name
        ),
        DuplicateReason::BillingPeriod => format!(
            "Account {} already has a bill for the billing period {} to {}.",
            matched.existing_bill.account_number,
            matched.existing_bill.billing_period_start,
            matched.existing_bill.billing_period_end
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billtrace_core::{Bill, BillStatus};
    use chrono::Utc;

    fn sample_bill() -> Bill {
        Bill {
            id: Uuid::nil(),
            service_account_id: None,
            invoice_number: "B1-176644802".to_string(),
            account_number: "BA11639924".to_string(),
            billing_period_start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            billing_period_end: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            bill_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            due_date: None,
            current_charges: 950.0,
            outstanding_amount: 0.0,
            gst_amount: 76.0,
            total_due: 1026.0,
            discounts: 0.0,
            file_path: "blobs/aa/bb/x.pdf".to_string(),
            file_name: "jan.pdf".to_string(),
            file_size_bytes: None,
            content_hash: None,
            processing_status: BillStatus::Completed,
            extraction_confidence: Some(92),
            extracted_data: None,
            requires_review: false,
            is_verified: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            processed_at: None,
        }
    }

    #[test]
    fn test_describe_invoice() {
        let matched = DuplicateMatch {
            reason: DuplicateReason::Invoice,
            existing_bill: sample_bill(),
        };
        assert_eq!(
            describe(&matched),
            "Invoice B1-176644802 already exists in the system."
        );
    }

    #[test]
    fn test_describe_file() {
        let matched = DuplicateMatch {
            reason: DuplicateReason::File,
            existing_bill: sample_bill(),
        };
        assert!(describe(&matched).contains("jan.pdf"));
    }

    #[test]
    fn test_describe_billing_period() {
        let matched = DuplicateMatch {
            reason: DuplicateReason::BillingPeriod,
            existing_bill: sample_bill(),
        };
        let text = describe(&matched);
        assert!(text.contains("BA11639924"));
        assert!(text.contains("2026-01-01"));
        assert!(text.contains("2026-01-31"));
    }
}
