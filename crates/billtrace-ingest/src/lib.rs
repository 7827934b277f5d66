//! # billtrace-ingest
//!
//! The bill ingestion and reconciliation pipeline.
//!
//! [`Pipeline`] sequences the stages: quick scan (ordered strategy list),
//! two-phase duplicate detection, vision extraction + validation, account
//! auto-registration, atomic bill persistence, and best-effort
//! post-processing (service-number lifecycle, monthly-charge ledger,
//! high-charge alerting). Cancellation is cooperative via [`CancelToken`],
//! checked at every stage boundary.

pub mod alerts;
pub mod cancel;
pub mod config;
pub mod duplicate;
pub mod pipeline;
pub mod scan;

pub use alerts::{percentage_increase, severity_for_increase, AlertEngine};
pub use cancel::{CancelHandle, CancelToken};
pub use config::PipelineConfig;
pub use duplicate::{describe, DuplicateDetector};
pub use pipeline::{validate_pdf_file, Pipeline};
pub use scan::{PrefilterStrategy, QuickScanner, ScanStrategy, VisionQuickStrategy};
