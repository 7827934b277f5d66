//! # billtrace-extract
//!
//! Extraction boundary for billtrace: everything between raw PDF bytes and
//! a validated [`billtrace_core::BillExtraction`].
//!
//! - [`prefilter`]: offline invoice/account number recovery from embedded
//!   PDF text; free, fast, silently fallible
//! - [`vision`]: the external vision-model client and its trait
//! - [`validate`]: schema and invariant enforcement on raw extraction JSON
//! - [`raster`]: the PDF rasterizer boundary (interface only)

pub mod prefilter;
pub mod prompts;
pub mod raster;
pub mod validate;
pub mod vision;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use prefilter::{extract_numbers, extract_numbers_from_text};
pub use raster::{PageImage, Rasterizer, RenderOptions};
pub use validate::{line_items_sum_consistent, validate_extraction};
pub use vision::{HttpVisionExtractor, VisionExtractor};
