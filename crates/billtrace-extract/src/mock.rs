//! Mock extraction backends for tests.
//!
//! Enabled with the `mock` feature. The mocks are deterministic: they return
//! whatever payloads they were constructed with, or a configured failure.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use billtrace_core::{Error, QuickExtraction, Result};

use crate::raster::{PageImage, RenderOptions, Rasterizer};
use crate::vision::VisionExtractor;

/// Vision extractor returning canned payloads.
pub struct MockVisionExtractor {
    quick: Option<QuickExtraction>,
    full: Option<serde_json::Value>,
    fail_with: Option<String>,
    quick_calls: AtomicUsize,
    full_calls: AtomicUsize,
}

impl MockVisionExtractor {
    /// Mock returning the given quick and full payloads.
    pub fn new(quick: QuickExtraction, full: serde_json::Value) -> Self {
        Self {
            quick: Some(quick),
            full: Some(full),
            fail_with: None,
            quick_calls: AtomicUsize::new(0),
            full_calls: AtomicUsize::new(0),
        }
    }

    /// Mock returning only a full payload; quick extraction fails.
    pub fn full_only(full: serde_json::Value) -> Self {
        Self {
            quick: None,
            full: Some(full),
            fail_with: None,
            quick_calls: AtomicUsize::new(0),
            full_calls: AtomicUsize::new(0),
        }
    }

    /// Mock where every call fails with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            quick: None,
            full: None,
            fail_with: Some(message.into()),
            quick_calls: AtomicUsize::new(0),
            full_calls: AtomicUsize::new(0),
        }
    }

    /// How many quick extractions were requested.
    pub fn quick_calls(&self) -> usize {
        self.quick_calls.load(Ordering::SeqCst)
    }

    /// How many full extractions were requested.
    pub fn full_calls(&self) -> usize {
        self.full_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionExtractor for MockVisionExtractor {
    async fn quick_extract(&self, _image: &PageImage) -> Result<QuickExtraction> {
        self.quick_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_with {
            return Err(Error::Extraction(message.clone()));
        }
        self.quick
            .clone()
            .ok_or_else(|| Error::Extraction("mock has no quick payload".into()))
    }

    async fn full_extract(&self, _images: &[PageImage]) -> Result<serde_json::Value> {
        self.full_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_with {
            return Err(Error::Extraction(message.clone()));
        }
        self.full
            .clone()
            .ok_or_else(|| Error::Extraction("mock has no full payload".into()))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.fail_with.is_none())
    }

    fn model_name(&self) -> &str {
        "mock-vision"
    }
}

/// Rasterizer producing fixed-size placeholder pages.
pub struct MockRasterizer {
    pages: u32,
}

impl MockRasterizer {
    /// Rasterizer for a document with the given page count.
    pub fn new(pages: u32) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl Rasterizer for MockRasterizer {
    async fn page_count(&self, _pdf_bytes: &[u8]) -> Result<u32> {
        Ok(self.pages)
    }

    async fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page: u32,
        _options: RenderOptions,
    ) -> Result<PageImage> {
        if page == 0 || page > self.pages {
            return Err(Error::InvalidInput(format!(
                "page {} out of range 1..={}",
                page, self.pages
            )));
        }
        Ok(PageImage {
            data: vec![0u8; 16],
            mime_type: "image/png".to_string(),
            page,
        })
    }

    async fn render_pages(
        &self,
        pdf_bytes: &[u8],
        options: RenderOptions,
    ) -> Result<Vec<PageImage>> {
        let mut images = Vec::with_capacity(self.pages as usize);
        for page in 1..=self.pages {
            images.push(self.render_page(pdf_bytes, page, options).await?);
        }
        Ok(images)
    }
}
