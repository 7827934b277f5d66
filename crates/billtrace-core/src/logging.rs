//! Structured logging field name constants for billtrace.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, post-processing step skipped |
//! | INFO  | Lifecycle events, ingestion milestones |
//! | DEBUG | Decision points, strategy selection, intermediate values |
//! | TRACE | Per-line-item iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "extract", "ingest"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "prefilter", "pipeline", "alert_engine"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "pre_scan", "ingest", "record_charges"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Ingestion job UUID.
pub const JOB_ID: &str = "job_id";

/// Bill UUID being operated on.
pub const BILL_ID: &str = "bill_id";

/// Service account UUID.
pub const ACCOUNT_ID: &str = "account_id";

/// Invoice number as printed on the bill.
pub const INVOICE_NUMBER: &str = "invoice_number";

/// Service identifier from a line item.
pub const SERVICE_NUMBER: &str = "service_number";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Line items carried by an extraction or bill.
pub const LINE_ITEM_COUNT: &str = "line_item_count";

/// Monthly-charge rows recorded by the ledger step.
pub const CHARGES_RECORDED: &str = "charges_recorded";

/// Extractor-reported confidence (0-100).
pub const CONFIDENCE: &str = "confidence";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Which duplicate check matched ("invoice", "file", "billing_period").
pub const DUPLICATE_REASON: &str = "duplicate_reason";
