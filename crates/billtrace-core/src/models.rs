//! Core data models for billtrace.
//!
//! These types are shared across all billtrace crates and represent the
//! persisted entities (accounts, bills, line items, service numbers, monthly
//! charges, alerts) plus the extraction and pipeline contract types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// STATUS ENUMS
// =============================================================================

/// Processing status of a persisted bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    ReviewRequired,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Pending => "pending",
            BillStatus::Processing => "processing",
            BillStatus::Completed => "completed",
            BillStatus::Failed => "failed",
            BillStatus::ReviewRequired => "review_required",
        }
    }
}

impl std::fmt::Display for BillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of anomaly an alert describes.
///
/// Only `HighCharge` is generated today; the remaining variants are part of
/// the persisted enum so historical rows and future detectors share one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    HighCharge,
    NewLineItem,
    UnusualUsage,
    MissingLineItem,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::HighCharge => "high_charge",
            AlertType::NewLineItem => "new_line_item",
            AlertType::UnusualUsage => "unusual_usage",
            AlertType::MissingLineItem => "missing_line_item",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an alert, derived from the percentage increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an alert.
///
/// Transitions: `active → acknowledged → resolved`, or `active → dismissed`.
/// `resolved` and `dismissed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Dismissed => "dismissed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Dismissed)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline state of one ingestion attempt, persisted on its job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    Uploaded,
    QuickScanned,
    DuplicatePending,
    Validating,
    Extracted,
    AccountResolved,
    Persisted,
    PostProcessed,
    Completed,
    Failed,
    Cancelled,
}

impl IngestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestState::Uploaded => "uploaded",
            IngestState::QuickScanned => "quick_scanned",
            IngestState::DuplicatePending => "duplicate_pending",
            IngestState::Validating => "validating",
            IngestState::Extracted => "extracted",
            IngestState::AccountResolved => "account_resolved",
            IngestState::Persisted => "persisted",
            IngestState::PostProcessed => "post_processed",
            IngestState::Completed => "completed",
            IngestState::Failed => "failed",
            IngestState::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IngestState::Completed
                | IngestState::Failed
                | IngestState::Cancelled
                | IngestState::DuplicatePending
        )
    }
}

impl std::fmt::Display for IngestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a bill was flagged as a duplicate. Ordered by check precedence:
/// invoice match wins over file match, which wins over billing-period match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReason {
    Invoice,
    File,
    BillingPeriod,
}

impl DuplicateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateReason::Invoice => "invoice",
            DuplicateReason::File => "file",
            DuplicateReason::BillingPeriod => "billing_period",
        }
    }
}

impl std::fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ACCOUNT TYPES
// =============================================================================

/// A billed service account with the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub id: Uuid,
    pub account_number: String,
    pub account_name: String,
    pub provider: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to explicitly create a service account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub account_number: String,
    pub account_name: String,
    pub provider: Option<String>,
    pub description: Option<String>,
}

/// Partial update of account fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAccountRequest {
    pub account_name: Option<String>,
    pub provider: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// One month's spending bucket for an account (zero-filled for empty months).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyTotal {
    pub month: u32,
    pub total: f64,
}

// =============================================================================
// BILL TYPES
// =============================================================================

/// A persisted invoice with its totals and processing status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub service_account_id: Option<Uuid>,
    pub invoice_number: String,
    pub account_number: String,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub bill_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub current_charges: f64,
    pub outstanding_amount: f64,
    pub gst_amount: f64,
    pub total_due: f64,
    pub discounts: f64,
    pub file_path: String,
    pub file_name: String,
    pub file_size_bytes: Option<i64>,
    /// Content hash of the source PDF, `blake3:{hex}`.
    pub content_hash: Option<String>,
    pub processing_status: BillStatus,
    /// Extractor-reported confidence (0-100). Metadata only; never gates
    /// persistence.
    pub extraction_confidence: Option<i32>,
    /// Raw extraction payload as returned by the vision model.
    pub extracted_data: Option<JsonValue>,
    pub requires_review: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// One billed service within a bill. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub service_number: String,
    pub package_name: String,
    pub subscription_charge: f64,
    pub usage_charges: f64,
    pub other_charges: f64,
    pub total_charge: f64,
    pub service_period_start: Option<NaiveDate>,
    pub service_period_end: Option<NaiveDate>,
    pub usage_details: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// Comparison of a bill against the previous completed bill on the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillComparison {
    pub current_bill: Bill,
    pub previous_bill: Option<Bill>,
    pub difference: f64,
    pub percentage_change: f64,
    pub has_increased: bool,
    /// Service numbers present now but absent from the previous bill.
    pub new_line_items: Vec<String>,
    /// Service numbers present previously but absent now.
    pub removed_line_items: Vec<String>,
}

// =============================================================================
// SERVICE NUMBER & LEDGER TYPES
// =============================================================================

/// Lifecycle record of one billed service identifier within an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceNumber {
    pub id: Uuid,
    pub service_number: String,
    pub service_account_id: Uuid,
    pub package_name: Option<String>,
    pub first_seen_bill_id: Option<Uuid>,
    pub first_seen_date: Option<NaiveDate>,
    pub last_seen_bill_id: Option<Uuid>,
    pub last_seen_date: Option<NaiveDate>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-line-item detection result from the service number registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewServiceDetection {
    pub service_number: String,
    pub package_name: Option<String>,
    /// True when this bill is the first sighting for the account. Advisory:
    /// new services never block ingestion.
    pub is_new: bool,
}

/// Per-period charge snapshot for one service number from one bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyCharge {
    pub id: Uuid,
    pub service_number_id: Uuid,
    pub bill_id: Uuid,
    pub line_item_id: Option<Uuid>,
    pub service_number: String,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub bill_date: NaiveDate,
    pub subscription_charge: f64,
    pub usage_charges: f64,
    pub other_charges: f64,
    pub total_charge: f64,
    pub package_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifetime charge aggregate for one service number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeTotals {
    pub total_subscription: f64,
    pub total_usage: f64,
    pub total_other: f64,
    pub total_all: f64,
    pub month_count: i64,
}

// =============================================================================
// ALERT TYPES
// =============================================================================

/// A threshold-based anomaly alert tied to one bill and one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub service_account_id: Uuid,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub current_amount: Option<f64>,
    pub previous_amount: Option<f64>,
    pub percentage_increase: Option<f64>,
    pub threshold_exceeded: Option<f64>,
    pub title: String,
    pub description: Option<String>,
    pub status: AlertStatus,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_notes: Option<String>,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert an alert row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAlertRequest {
    pub bill_id: Uuid,
    pub service_account_id: Uuid,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub current_amount: Option<f64>,
    pub previous_amount: Option<f64>,
    pub percentage_increase: Option<f64>,
    pub threshold_exceeded: Option<f64>,
    pub title: String,
    pub description: Option<String>,
    pub metadata: Option<JsonValue>,
}

// =============================================================================
// FILE & JOB TYPES
// =============================================================================

/// Content-addressed record of an uploaded source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: Uuid,
    /// `blake3:{64-char-hex}` of the file bytes. Unique: re-uploading
    /// identical bytes resolves to the existing row.
    pub content_hash: String,
    pub file_name: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// Durable record of one ingestion attempt, queryable for status by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    pub id: Uuid,
    pub bill_id: Option<Uuid>,
    pub file_name: String,
    pub state: IngestState,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// EXTRACTION CONTRACT TYPES
// =============================================================================

/// Validated full-extraction result for one bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillExtraction {
    pub account_number: String,
    pub invoice_number: String,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub bill_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub current_charges: f64,
    pub outstanding: f64,
    pub gst_amount: f64,
    pub total_due: f64,
    pub discounts: f64,
    pub line_items: Vec<LineItemExtraction>,
    /// Extractor self-reported confidence, 0-100.
    pub confidence: i32,
}

/// One extracted line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemExtraction {
    pub service_number: String,
    pub package_name: String,
    pub subscription_charge: f64,
    pub usage_charges: f64,
    pub other_charges: f64,
    pub total_charge: f64,
    pub service_period_start: Option<NaiveDate>,
    pub service_period_end: Option<NaiveDate>,
    pub usage_details: Option<JsonValue>,
}

/// Result of the cheap first-page scan (prefilter or reduced-resolution
/// vision extraction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickScan {
    pub invoice_number: Option<String>,
    pub account_number: Option<String>,
    pub confidence: i32,
    pub source: ScanSource,
}

/// Which strategy produced a quick-scan result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanSource {
    EmbeddedText,
    Vision,
}

/// Invoice/account numbers recovered offline from embedded PDF text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefilterNumbers {
    pub invoice_number: Option<String>,
    pub account_number: Option<String>,
}

/// Quick extraction returned by the vision backend for a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickExtraction {
    pub invoice_number: String,
    pub account_number: String,
    pub confidence: i32,
}

// =============================================================================
// PIPELINE BOUNDARY TYPES
// =============================================================================

/// A detected duplicate with the conflicting record for the caller to show.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub reason: DuplicateReason,
    pub existing_bill: Bill,
}

/// Outcome of the pre-extraction scan exposed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreScan {
    pub invoice_number: Option<String>,
    pub account_number: Option<String>,
    pub confidence: i32,
    pub account_exists: bool,
    pub duplicate: Option<DuplicateMatch>,
}

/// Caller-controlled ingestion switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Proceed even when the duplicate detector would halt the pipeline.
    /// Set after a user confirms a detected duplicate should be ingested.
    pub skip_duplicate_check: bool,
}

/// Successful ingestion report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub job_id: Uuid,
    pub bill: Bill,
    pub line_items: Vec<LineItem>,
    pub account_auto_registered: bool,
    pub new_service_numbers: Vec<NewServiceDetection>,
    pub alerts_raised: Vec<Alert>,
    /// Monthly-charge rows actually recorded vs. line items on the bill.
    pub charges_recorded: usize,
    pub line_item_count: usize,
    /// Post-processing steps that failed; the bill itself is committed.
    pub degraded: Vec<String>,
}

/// Terminal result of one ingestion attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IngestOutcome {
    Completed(Box<IngestReport>),
    Duplicate(Box<DuplicateMatch>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bill_status_round_trip() {
        for status in [
            BillStatus::Pending,
            BillStatus::Processing,
            BillStatus::Completed,
            BillStatus::Failed,
            BillStatus::ReviewRequired,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            let back: BillStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(status, back);
        }
    }

    #[test]
    fn test_bill_status_serde_snake_case() {
        let json = serde_json::to_string(&BillStatus::ReviewRequired).unwrap();
        assert_eq!(json, "\"review_required\"");
    }

    #[test]
    fn test_alert_status_terminality() {
        assert!(!AlertStatus::Active.is_terminal());
        assert!(!AlertStatus::Acknowledged.is_terminal());
        assert!(AlertStatus::Resolved.is_terminal());
        assert!(AlertStatus::Dismissed.is_terminal());
    }

    #[test]
    fn test_alert_severity_ordering() {
        assert!(AlertSeverity::Critical > AlertSeverity::High);
        assert!(AlertSeverity::High > AlertSeverity::Medium);
        assert!(AlertSeverity::Medium > AlertSeverity::Low);
    }

    #[test]
    fn test_ingest_state_terminality() {
        assert!(IngestState::Completed.is_terminal());
        assert!(IngestState::Failed.is_terminal());
        assert!(IngestState::Cancelled.is_terminal());
        assert!(IngestState::DuplicatePending.is_terminal());
        assert!(!IngestState::Uploaded.is_terminal());
        assert!(!IngestState::Persisted.is_terminal());
    }

    #[test]
    fn test_ingest_state_as_str() {
        assert_eq!(IngestState::QuickScanned.as_str(), "quick_scanned");
        assert_eq!(IngestState::DuplicatePending.as_str(), "duplicate_pending");
        assert_eq!(IngestState::AccountResolved.as_str(), "account_resolved");
    }

    #[test]
    fn test_duplicate_reason_as_str() {
        assert_eq!(DuplicateReason::Invoice.as_str(), "invoice");
        assert_eq!(DuplicateReason::File.as_str(), "file");
        assert_eq!(DuplicateReason::BillingPeriod.as_str(), "billing_period");
    }

    #[test]
    fn test_prefilter_numbers_default_is_empty() {
        let numbers = PrefilterNumbers::default();
        assert!(numbers.invoice_number.is_none());
        assert!(numbers.account_number.is_none());
    }

    #[test]
    fn test_bill_extraction_serde_round_trip() {
        let extraction = BillExtraction {
            account_number: "BA11639924".to_string(),
            invoice_number: "B1-176644802".to_string(),
            billing_period_start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            billing_period_end: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            bill_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            due_date: None,
            current_charges: 950.0,
            outstanding: 0.0,
            gst_amount: 76.0,
            total_due: 1026.0,
            discounts: 0.0,
            line_items: vec![LineItemExtraction {
                service_number: "7771234".to_string(),
                package_name: "Fibre 100M".to_string(),
                subscription_charge: 800.0,
                usage_charges: 150.0,
                other_charges: 0.0,
                total_charge: 950.0,
                service_period_start: None,
                service_period_end: None,
                usage_details: None,
            }],
            confidence: 92,
        };

        let json = serde_json::to_string(&extraction).unwrap();
        let back: BillExtraction = serde_json::from_str(&json).unwrap();
        assert_eq!(back.invoice_number, extraction.invoice_number);
        assert_eq!(back.line_items.len(), 1);
        assert_eq!(back.confidence, 92);
    }
}
