//! Rasterizer boundary.
//!
//! PDF-to-image rendering is an external collaborator; the pipeline only
//! consumes this trait. Render presets mirror the two pipeline passes: a
//! reduced-resolution first-page render for the quick scan and a full-size
//! render of every page for the real extraction.

use async_trait::async_trait;

use billtrace_core::{defaults, Result};

/// One rendered PDF page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Encoded image bytes (PNG unless the implementation says otherwise).
    pub data: Vec<u8>,
    /// MIME type of `data`.
    pub mime_type: String,
    /// 1-based page number.
    pub page: u32,
}

/// Rendering parameters for one rasterization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl RenderOptions {
    /// Reduced-resolution preset for the quick scan.
    pub fn quick_scan() -> Self {
        Self {
            dpi: defaults::QUICK_SCAN_DPI,
            max_width: defaults::QUICK_SCAN_MAX_WIDTH,
            max_height: defaults::QUICK_SCAN_MAX_HEIGHT,
        }
    }

    /// Full-size preset for the real extraction.
    pub fn full_scan() -> Self {
        Self {
            dpi: defaults::FULL_SCAN_DPI,
            max_width: defaults::FULL_SCAN_MAX_WIDTH,
            max_height: defaults::FULL_SCAN_MAX_HEIGHT,
        }
    }
}

/// Boundary to an external PDF rasterizer.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Number of pages in the document.
    async fn page_count(&self, pdf_bytes: &[u8]) -> Result<u32>;

    /// Render a single 1-based page.
    async fn render_page(
        &self,
        pdf_bytes: &[u8],
        page: u32,
        options: RenderOptions,
    ) -> Result<PageImage>;

    /// Render every page in order.
    async fn render_pages(&self, pdf_bytes: &[u8], options: RenderOptions)
        -> Result<Vec<PageImage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_differ() {
        let quick = RenderOptions::quick_scan();
        let full = RenderOptions::full_scan();
        assert!(quick.dpi < full.dpi);
        assert!(quick.max_width < full.max_width);
    }
}
