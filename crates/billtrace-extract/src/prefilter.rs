//! Offline invoice/account number extraction from embedded PDF text.
//!
//! Bills with selectable text carry their identity fields in the first-page
//! header; a regex pass over that header is free and beats a vision call.
//! Patterns are ordered most-specific-first per field and evaluated until
//! one produces a match of plausible length. This module never errors: a
//! scanned-image PDF with no text layer simply yields empty fields and the
//! caller escalates to the vision quick scan.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use billtrace_core::{defaults, PrefilterNumbers};

/// Invoice number patterns, most specific provider format first.
static INVOICE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Bare provider format: B1-176644802
        Regex::new(r"\b(B\d+-\d{6,12})\b").unwrap(),
        // Labeled provider format: INVOICE NO: B1-176644802
        Regex::new(r"\b(?:INVOICE|BILL)\s*(?:NO|NUMBER|#)?[:\s]*(B\d+-?\d{6,12})\b").unwrap(),
        // Labeled generic: INVOICE NO: INV-123456
        Regex::new(r"\b(?:INVOICE|BILL)\s*(?:NO|NUMBER|#)?[:\s]*([A-Z]{1,3}-?\d{6,12})\b").unwrap(),
    ]
});

/// Account number patterns, most specific provider format first.
static ACCOUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Bare provider format: BA11639924
        Regex::new(r"\b(BA\d{8,12})\b").unwrap(),
        // Labeled provider format: ACCOUNT NO: BA11639924
        Regex::new(r"\b(?:ACCOUNT|SERVICE\s*ACCOUNT)\s*(?:NO|NUMBER|#)?[:\s]*(BA\d{8,12})\b")
            .unwrap(),
        // Labeled generic: ACCOUNT NO: XY12345678
        Regex::new(r"\b(?:ACCOUNT|SERVICE\s*ACCOUNT)\s*(?:NO|NUMBER|#)?[:\s]*([A-Z]{2}\d{8,12})\b")
            .unwrap(),
    ]
});

/// Extract invoice/account numbers from raw PDF bytes.
///
/// Fails silently: any extraction problem returns empty fields.
pub fn extract_numbers(pdf_bytes: &[u8]) -> PrefilterNumbers {
    let text = match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!(
                subsystem = "extract",
                component = "prefilter",
                error = %e,
                "No text layer; prefilter yields nothing"
            );
            return PrefilterNumbers::default();
        }
    };

    extract_numbers_from_text(&text)
}

/// Extract invoice/account numbers from already-extracted document text.
///
/// Only the uppercased header window is scanned; identity fields sit in
/// the first-page banner, and deeper text is usage tables that produce
/// false positives.
pub fn extract_numbers_from_text(text: &str) -> PrefilterNumbers {
    let header: String = text
        .chars()
        .take(defaults::PREFILTER_HEADER_CHARS)
        .collect::<String>()
        .to_uppercase();

    PrefilterNumbers {
        invoice_number: first_match(
            &INVOICE_PATTERNS,
            &header,
            defaults::MIN_INVOICE_NUMBER_LEN,
            true,
        ),
        account_number: first_match(
            &ACCOUNT_PATTERNS,
            &header,
            defaults::MIN_ACCOUNT_NUMBER_LEN,
            false,
        ),
    }
}

/// First pattern match of at least `min_len` after noise stripping.
/// `keep_hyphen` retains the separator in invoice formats like `B1-176644802`.
fn first_match(patterns: &[Regex], header: &str, min_len: usize, keep_hyphen: bool) -> Option<String> {
    for pattern in patterns {
        if let Some(captures) = pattern.captures(header) {
            if let Some(matched) = captures.get(1) {
                let cleaned: String = matched
                    .as_str()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric() || (keep_hyphen && *c == '-'))
                    .collect();
                if cleaned.len() >= min_len {
                    return Some(cleaned);
                }
            }
        }
    }
    None
}
