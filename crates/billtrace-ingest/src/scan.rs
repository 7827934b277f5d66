//! Quick-scan strategy list.
//!
//! The pre-extraction scan recovers invoice/account numbers as cheaply as
//! possible: an ordered list of strategies is evaluated until one yields a
//! usable result. Reordering or adding an engine (a different OCR backend,
//! say) means editing the list, not the control flow.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use billtrace_core::{defaults, Error, PrefilterNumbers, QuickScan, Result, ScanSource};
use billtrace_extract::raster::{Rasterizer, RenderOptions};
use billtrace_extract::vision::VisionExtractor;

/// One way of producing a [`QuickScan`]. Returning `Ok(None)` means "this
/// strategy has nothing usable, try the next one"; errors are fatal.
#[async_trait]
pub trait ScanStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, pdf_bytes: &[u8]) -> Result<Option<QuickScan>>;
}

/// Offline embedded-text prefilter. Free; first in the list.
pub struct PrefilterStrategy;

/// Map prefilter output onto a quick scan, if it found enough.
///
/// The invoice number is what the duplicate pre-check needs, so it alone is
/// sufficient; confidence reflects how much was recovered.
pub(crate) fn scan_from_prefilter(numbers: PrefilterNumbers) -> Option<QuickScan> {
    numbers.invoice_number.as_ref()?;

    let confidence = if numbers.account_number.is_some() {
        defaults::CONFIDENCE_TEXT_BOTH
    } else {
        defaults::CONFIDENCE_TEXT_INVOICE_ONLY
    };

    Some(QuickScan {
        invoice_number: numbers.invoice_number,
        account_number: numbers.account_number,
        confidence,
        source: ScanSource::EmbeddedText,
    })
}

#[async_trait]
impl ScanStrategy for PrefilterStrategy {
    fn name(&self) -> &'static str {
        "prefilter"
    }

    async fn attempt(&self, pdf_bytes: &[u8]) -> Result<Option<QuickScan>> {
        let numbers = billtrace_extract::prefilter::extract_numbers(pdf_bytes);
        Ok(scan_from_prefilter(numbers))
    }
}

/// Reduced-resolution vision quick extraction of the first page. Costs an
/// external call; last in the list.
pub struct VisionQuickStrategy {
    raster: Arc<dyn Rasterizer>,
    vision: Arc<dyn VisionExtractor>,
}

impl VisionQuickStrategy {
    pub fn new(raster: Arc<dyn Rasterizer>, vision: Arc<dyn VisionExtractor>) -> Self {
        Self { raster, vision }
    }
}

#[async_trait]
impl ScanStrategy for VisionQuickStrategy {
    fn name(&self) -> &'static str {
        "vision_quick"
    }

    async fn attempt(&self, pdf_bytes: &[u8]) -> Result<Option<QuickScan>> {
        let first_page = self
            .raster
            .render_page(pdf_bytes, 1, RenderOptions::quick_scan())
            .await?;
        let extraction = self.vision.quick_extract(&first_page).await?;

        Ok(Some(QuickScan {
            invoice_number: Some(extraction.invoice_number),
            account_number: Some(extraction.account_number),
            confidence: extraction.confidence,
            source: ScanSource::Vision,
        }))
    }
}

/// Ordered strategy list evaluated until one succeeds.
pub struct QuickScanner {
    strategies: Vec<Box<dyn ScanStrategy>>,
}

impl QuickScanner {
    /// The standard list: prefilter first, vision quick extraction second.
    pub fn standard(raster: Arc<dyn Rasterizer>, vision: Arc<dyn VisionExtractor>) -> Self {
        Self {
            strategies: vec![
                Box::new(PrefilterStrategy),
                Box::new(VisionQuickStrategy::new(raster, vision)),
            ],
        }
    }

    /// A custom strategy list. Order is evaluation order.
    pub fn with_strategies(strategies: Vec<Box<dyn ScanStrategy>>) -> Self {
        Self { strategies }
    }

    /// Evaluate strategies in order; the first usable result wins.
    pub async fn scan(&self, pdf_bytes: &[u8]) -> Result<QuickScan> {
        for strategy in &self.strategies {
            match strategy.attempt(pdf_bytes).await? {
                Some(scan) => {
                    debug!(
                        subsystem = "ingest",
                        component = "scan",
                        op = "scan",
                        strategy = strategy.name(),
                        confidence = scan.confidence,
                        "Quick scan strategy succeeded"
                    );
                    return Ok(scan);
                }
                None => {
                    debug!(
                        subsystem = "ingest",
                        component = "scan",
                        strategy = strategy.name(),
                        "Quick scan strategy yielded nothing, trying next"
                    );
                }
            }
        }

        Err(Error::Extraction(
            "no quick-scan strategy produced a usable result".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billtrace_core::QuickExtraction;
    use billtrace_extract::mock::{MockRasterizer, MockVisionExtractor};

    fn numbers(invoice: Option<&str>, account: Option<&str>) -> PrefilterNumbers {
        PrefilterNumbers {
            invoice_number: invoice.map(String::from),
            account_number: account.map(String::from),
        }
    }

    #[test]
    fn test_prefilter_both_numbers_high_confidence() {
        let scan = scan_from_prefilter(numbers(Some("B1-176644802"), Some("BA11639924"))).unwrap();
        assert_eq!(scan.confidence, defaults::CONFIDENCE_TEXT_BOTH);
        assert_eq!(scan.source, ScanSource::EmbeddedText);
    }

    #[test]
    fn test_prefilter_invoice_only_lower_confidence() {
        let scan = scan_from_prefilter(numbers(Some("B1-176644802"), None)).unwrap();
        assert_eq!(scan.confidence, defaults::CONFIDENCE_TEXT_INVOICE_ONLY);
        assert!(scan.account_number.is_none());
    }

    #[test]
    fn test_prefilter_account_alone_is_insufficient() {
        // Without an invoice number the duplicate pre-check has nothing to
        // match on; escalate to the next strategy.
        assert!(scan_from_prefilter(numbers(None, Some("BA11639924"))).is_none());
        assert!(scan_from_prefilter(numbers(None, None)).is_none());
    }

    #[tokio::test]
    async fn test_scanner_falls_back_to_vision() {
        // Garbage bytes have no text layer, so the prefilter yields nothing
        // and the vision strategy must be consulted.
        let vision = Arc::new(MockVisionExtractor::new(
            QuickExtraction {
                invoice_number: "B1-555666777".to_string(),
                account_number: "BA99887766".to_string(),
                confidence: 77,
            },
            serde_json::json!({}),
        ));
        let raster = Arc::new(MockRasterizer::new(2));
        let scanner = QuickScanner::standard(raster, vision.clone());

        let scan = scanner.scan(b"not a pdf").await.unwrap();

        assert_eq!(scan.source, ScanSource::Vision);
        assert_eq!(scan.invoice_number.as_deref(), Some("B1-555666777"));
        assert_eq!(scan.confidence, 77);
        assert_eq!(vision.quick_calls(), 1);
    }

    #[tokio::test]
    async fn test_vision_failure_is_fatal() {
        let vision = Arc::new(MockVisionExtractor::failing("model offline"));
        let raster = Arc::new(MockRasterizer::new(1));
        let scanner = QuickScanner::standard(raster, vision);

        let err = scanner.scan(b"not a pdf").await.unwrap_err();
        assert_eq!(err.kind(), "extraction");
    }
}
