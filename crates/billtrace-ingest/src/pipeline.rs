//! Ingestion orchestrator.
//!
//! One [`Pipeline`] instance serves any number of concurrent ingestions;
//! each call is an independent task whose progress lives on a durable
//! [`billtrace_core::IngestJob`] row, not in process memory.
//!
//! Stage order per bill: store the upload, quick scan, duplicate pre-check,
//! full extraction + validation, authoritative duplicate check, account
//! resolution, atomic bill persistence, then best-effort post-processing
//! (service-number detection, charge ledgering, alerting). Failures before
//! persistence fail the ingestion; failures after it degrade the outcome
//! but leave the bill committed.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use billtrace_core::{
    Error, IngestJob, IngestOptions, IngestOutcome, IngestReport, IngestState, PreScan, Result,
};
use billtrace_db::{BillFileInfo, Database, PgFileRepository, ServiceSighting};
use billtrace_extract::raster::{Rasterizer, RenderOptions};
use billtrace_extract::validate::{line_items_sum_consistent, validate_extraction};
use billtrace_extract::vision::VisionExtractor;

use crate::alerts::AlertEngine;
use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::duplicate::{describe, DuplicateDetector};
use crate::scan::QuickScanner;

/// The bill ingestion pipeline.
pub struct Pipeline {
    db: Database,
    files: Arc<PgFileRepository>,
    raster: Arc<dyn Rasterizer>,
    vision: Arc<dyn VisionExtractor>,
    scanner: QuickScanner,
    duplicates: DuplicateDetector,
    alerts: AlertEngine,
    config: PipelineConfig,
}

impl Pipeline {
    /// Assemble a pipeline over the given collaborators.
    pub fn new(
        db: Database,
        files: Arc<PgFileRepository>,
        raster: Arc<dyn Rasterizer>,
        vision: Arc<dyn VisionExtractor>,
        config: PipelineConfig,
    ) -> Self {
        let scanner = QuickScanner::standard(raster.clone(), vision.clone());
        let duplicates = DuplicateDetector::new(db.clone());
        let alerts = AlertEngine::new(db.clone(), config.high_charge_threshold_pct);
        Self {
            db,
            files,
            raster,
            vision,
            scanner,
            duplicates,
            alerts,
            config,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Status of an ingestion attempt.
    pub async fn job_status(&self, job_id: Uuid) -> Result<IngestJob> {
        self.db.ingest_jobs.get(job_id).await
    }

    /// Cheap pre-extraction scan: identity fields plus a phase-1 duplicate
    /// check, for the caller to decide whether a full ingestion is worth it.
    pub async fn pre_scan(&self, pdf_bytes: &[u8], file_name: &str) -> Result<PreScan> {
        validate_pdf_file(pdf_bytes, file_name, self.config.max_file_bytes)?;

        let scan = self.scanner.scan(pdf_bytes).await?;
        let content_hash = billtrace_db::compute_content_hash(pdf_bytes);

        let account_exists = match &scan.account_number {
            Some(number) => self.db.accounts.get_by_number(number).await?.is_some(),
            None => false,
        };

        let duplicate = self
            .duplicates
            .phase1(
                scan.invoice_number.as_deref(),
                Some(&content_hash),
                file_name,
            )
            .await?;

        Ok(PreScan {
            invoice_number: scan.invoice_number,
            account_number: scan.account_number,
            confidence: scan.confidence,
            account_exists,
            duplicate,
        })
    }

    /// Ingest one uploaded bill end to end.
    ///
    /// Returns `Completed` with the full report, or `Duplicate` when a
    /// non-overridden duplicate check matched (the caller may retry with
    /// [`IngestOptions::skip_duplicate_check`] after user confirmation).
    pub async fn ingest(
        &self,
        pdf_bytes: &[u8],
        file_name: &str,
        options: IngestOptions,
        token: CancelToken,
    ) -> Result<IngestOutcome> {
        let start = Instant::now();
        validate_pdf_file(pdf_bytes, file_name, self.config.max_file_bytes)?;

        let job = self.db.ingest_jobs.create(file_name).await?;
        info!(
            subsystem = "ingest",
            component = "pipeline",
            op = "ingest",
            job_id = %job.id,
            file_name,
            "Ingestion started"
        );

        match self.run(job.id, pdf_bytes, file_name, options, &token).await {
            Ok(IngestOutcome::Duplicate(matched)) => {
                self.db
                    .ingest_jobs
                    .duplicate_pending(job.id, &describe(&matched))
                    .await?;
                info!(
                    subsystem = "ingest",
                    component = "pipeline",
                    job_id = %job.id,
                    duplicate_reason = %matched.reason,
                    "Ingestion halted on duplicate"
                );
                Ok(IngestOutcome::Duplicate(matched))
            }
            Ok(outcome) => {
                self.db.ingest_jobs.complete(job.id).await?;
                info!(
                    subsystem = "ingest",
                    component = "pipeline",
                    job_id = %job.id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Ingestion completed"
                );
                Ok(outcome)
            }
            Err(Error::Cancelled(message)) => {
                self.db.ingest_jobs.cancel(job.id).await?;
                warn!(
                    subsystem = "ingest",
                    component = "pipeline",
                    job_id = %job.id,
                    "Ingestion cancelled"
                );
                Err(Error::Cancelled(message))
            }
            Err(e) => {
                self.db.ingest_jobs.fail(job.id, &e.to_string()).await?;
                warn!(
                    subsystem = "ingest",
                    component = "pipeline",
                    job_id = %job.id,
                    error = %e,
                    "Ingestion failed"
                );
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        job_id: Uuid,
        pdf_bytes: &[u8],
        file_name: &str,
        options: IngestOptions,
        token: &CancelToken,
    ) -> Result<IngestOutcome> {
        token.check("upload")?;
        let (stored, reused) = self.files.store(file_name, pdf_bytes).await?;
        if reused {
            info!(
                subsystem = "ingest",
                component = "pipeline",
                job_id = %job_id,
                content_hash = %stored.content_hash,
                "Upload matches previously stored bytes"
            );
        }

        // Quick scan + duplicate pre-check. Skipping the duplicate check
        // skips both: the scan exists only to feed the pre-check.
        token.check("quick_scan")?;
        if !options.skip_duplicate_check {
            let scan = self.scanner.scan(pdf_bytes).await?;
            self.db
                .ingest_jobs
                .set_state(job_id, IngestState::QuickScanned)
                .await?;

            if let Some(matched) = self
                .duplicates
                .phase1(
                    scan.invoice_number.as_deref(),
                    Some(&stored.content_hash),
                    file_name,
                )
                .await?
            {
                return Ok(IngestOutcome::Duplicate(Box::new(matched)));
            }
        } else {
            self.db
                .ingest_jobs
                .set_state(job_id, IngestState::QuickScanned)
                .await?;
        }

        // Full extraction + validation. The external call is the slowest
        // stage; cancellation aborts it mid-flight.
        self.db
            .ingest_jobs
            .set_state(job_id, IngestState::Validating)
            .await?;
        token.check("extraction")?;
        let raw = tokio::select! {
            _ = token.cancelled() => {
                return Err(Error::Cancelled("pipeline cancelled at extraction".into()));
            }
            result = self.full_extract(pdf_bytes) => result?,
        };

        let extraction = validate_extraction(&raw)?;
        if !line_items_sum_consistent(&extraction) {
            warn!(
                subsystem = "ingest",
                component = "pipeline",
                job_id = %job_id,
                invoice_number = %extraction.invoice_number,
                "Line item totals do not reconcile with bill totals"
            );
        }
        self.db
            .ingest_jobs
            .set_state(job_id, IngestState::Extracted)
            .await?;

        // Authoritative duplicate check: sees the billing period the
        // pre-check could not. An unregistered account cannot have a
        // billing-period duplicate, so the account lookup is read-only here.
        if !options.skip_duplicate_check {
            let existing_account = self
                .db
                .accounts
                .get_by_number(&extraction.account_number)
                .await?;
            if let Some(matched) = self
                .duplicates
                .phase2(
                    &extraction.invoice_number,
                    Some(&stored.content_hash),
                    file_name,
                    existing_account.map(|a| a.id),
                    extraction.billing_period_start,
                    extraction.billing_period_end,
                )
                .await?
            {
                return Ok(IngestOutcome::Duplicate(Box::new(matched)));
            }
        }

        // Account resolution, auto-registering unknown accounts.
        token.check("account_resolution")?;
        let (account, account_auto_registered) = self
            .db
            .accounts
            .auto_register(&extraction.account_number, &self.config.default_provider)
            .await?;
        self.db
            .ingest_jobs
            .set_state(job_id, IngestState::AccountResolved)
            .await?;

        // Atomic persistence: bill + line items commit together or not at
        // all. This is the last cancellation point; past here the bill is
        // the source of truth.
        token.check("persistence")?;
        let file_info = BillFileInfo {
            file_path: stored.storage_path.clone(),
            file_name: file_name.to_string(),
            file_size_bytes: Some(pdf_bytes.len() as i64),
            content_hash: Some(stored.content_hash.clone()),
        };
        let (bill, line_items) = self
            .db
            .bills
            .create_from_extraction(&extraction, raw, &file_info, Some(account.id))
            .await?;
        self.db.ingest_jobs.set_bill(job_id, bill.id).await?;
        self.db
            .ingest_jobs
            .set_state(job_id, IngestState::Persisted)
            .await?;

        // Best-effort post-processing. Each step reports failure without
        // rolling back the bill; all three can be re-run later.
        let mut degraded = Vec::new();

        let sightings: Vec<ServiceSighting> = extraction
            .line_items
            .iter()
            .map(|item| ServiceSighting {
                service_number: item.service_number.clone(),
                package_name: Some(item.package_name.clone()),
            })
            .collect();

        let new_service_numbers = match self
            .db
            .service_numbers
            .detect_for_bill(bill.id, bill.bill_date, account.id, &sightings)
            .await
        {
            Ok(detections) => detections.into_iter().filter(|d| d.is_new).collect(),
            Err(e) => {
                warn!(
                    subsystem = "ingest",
                    component = "pipeline",
                    job_id = %job_id,
                    error = %e,
                    "Service number detection failed"
                );
                degraded.push(format!("service number detection: {}", e));
                Vec::new()
            }
        };

        let charges_recorded = match self
            .db
            .monthly_charges
            .record_for_bill(bill.id, account.id)
            .await
        {
            Ok(recorded) => recorded.recorded,
            Err(e) => {
                warn!(
                    subsystem = "ingest",
                    component = "pipeline",
                    job_id = %job_id,
                    error = %e,
                    "Monthly charge recording failed"
                );
                degraded.push(format!("monthly charge recording: {}", e));
                0
            }
        };

        let alerts_raised = match self.alerts.detect_for_bill(&bill).await {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!(
                    subsystem = "ingest",
                    component = "pipeline",
                    job_id = %job_id,
                    error = %e,
                    "Alert detection failed"
                );
                degraded.push(format!("alert detection: {}", e));
                Vec::new()
            }
        };

        self.db
            .ingest_jobs
            .set_state(job_id, IngestState::PostProcessed)
            .await?;

        info!(
            subsystem = "ingest",
            component = "pipeline",
            op = "post_process",
            job_id = %job_id,
            bill_id = %bill.id,
            line_item_count = line_items.len(),
            charges_recorded,
            new_services = new_service_numbers.len(),
            alerts = alerts_raised.len(),
            degraded = degraded.len(),
            "Post-processing finished"
        );

        let line_item_count = line_items.len();
        Ok(IngestOutcome::Completed(Box::new(IngestReport {
            job_id,
            bill,
            line_items,
            account_auto_registered,
            new_service_numbers,
            alerts_raised,
            charges_recorded,
            line_item_count,
            degraded,
        })))
    }

    async fn full_extract(&self, pdf_bytes: &[u8]) -> Result<serde_json::Value> {
        let images = self
            .raster
            .render_pages(pdf_bytes, RenderOptions::full_scan())
            .await?;
        if images.is_empty() {
            return Err(Error::Extraction("no images rendered from PDF".into()));
        }
        self.vision.full_extract(&images).await
    }
}

/// Reject non-PDF, empty, or oversized uploads before any work happens.
pub fn validate_pdf_file(pdf_bytes: &[u8], file_name: &str, max_bytes: u64) -> Result<()> {
    if pdf_bytes.is_empty() {
        return Err(Error::InvalidInput("file is empty".into()));
    }
    if pdf_bytes.len() as u64 > max_bytes {
        return Err(Error::InvalidInput(format!(
            "file size {} exceeds maximum of {} bytes",
            pdf_bytes.len(),
            max_bytes
        )));
    }
    if !file_name.to_lowercase().ends_with(".pdf") {
        return Err(Error::InvalidInput("file must be a PDF".into()));
    }
    match infer::get(pdf_bytes) {
        Some(kind) if kind.mime_type() == "application/pdf" => Ok(()),
        _ => Err(Error::InvalidInput("file is not a valid PDF".into())),
    }
}
