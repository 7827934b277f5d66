//! Centralized defaults and environment variable names for billtrace.
//!
//! Every tunable the pipeline reads lives here so operational limits are
//! discoverable in one place.

// ─── Alerting ──────────────────────────────────────────────────────────────

/// Percentage increase over the previous bill that raises a high-charge
/// alert. Override with `BILLTRACE_ALERT_THRESHOLD_PCT`.
pub const HIGH_CHARGE_THRESHOLD_PCT: f64 = 20.0;

/// Increase at or above this percentage is classified `high`.
pub const SEVERITY_HIGH_PCT: f64 = 30.0;

/// Increase at or above this percentage is classified `critical`.
pub const SEVERITY_CRITICAL_PCT: f64 = 50.0;

// ─── Upload limits ─────────────────────────────────────────────────────────

/// Maximum accepted source PDF size in bytes (10 MiB).
/// Override with `BILLTRACE_MAX_FILE_BYTES`.
pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

// ─── Prefilter ─────────────────────────────────────────────────────────────

/// Header window of embedded text scanned for invoice/account numbers.
/// Invoice headers sit in the first page banner; anything deeper is line
/// items and usage tables.
pub const PREFILTER_HEADER_CHARS: usize = 3000;

/// Minimum plausible invoice number length after noise stripping.
pub const MIN_INVOICE_NUMBER_LEN: usize = 6;

/// Minimum plausible account number length after noise stripping.
pub const MIN_ACCOUNT_NUMBER_LEN: usize = 8;

// ─── Quick-scan confidence ladder ──────────────────────────────────────────

/// Confidence reported when the prefilter finds both numbers offline.
pub const CONFIDENCE_TEXT_BOTH: i32 = 95;

/// Confidence when the prefilter finds only the invoice number.
pub const CONFIDENCE_TEXT_INVOICE_ONLY: i32 = 85;

// ─── Rasterization presets ─────────────────────────────────────────────────

/// DPI for the reduced-resolution quick-scan render.
pub const QUICK_SCAN_DPI: u32 = 150;

/// DPI for the full-extraction render.
pub const FULL_SCAN_DPI: u32 = 200;

/// Pixel bounds for the quick-scan render.
pub const QUICK_SCAN_MAX_WIDTH: u32 = 1600;
pub const QUICK_SCAN_MAX_HEIGHT: u32 = 2200;

/// Pixel bounds for the full-extraction render.
pub const FULL_SCAN_MAX_WIDTH: u32 = 2400;
pub const FULL_SCAN_MAX_HEIGHT: u32 = 3200;

// ─── Money ─────────────────────────────────────────────────────────────────

/// Tolerance for monetary comparisons. Extracted amounts are rounded to two
/// decimal places by the vision model; sums may drift by cents.
pub const CHARGE_TOLERANCE: f64 = 0.05;

// ─── Providers ─────────────────────────────────────────────────────────────

/// Provider recorded on auto-registered accounts when none is configured.
/// Override with `BILLTRACE_DEFAULT_PROVIDER`.
pub const DEFAULT_PROVIDER: &str = "Dhiraagu";

// ─── Environment variable names ────────────────────────────────────────────

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_ALERT_THRESHOLD_PCT: &str = "BILLTRACE_ALERT_THRESHOLD_PCT";
pub const ENV_MAX_FILE_BYTES: &str = "BILLTRACE_MAX_FILE_BYTES";
pub const ENV_DEFAULT_PROVIDER: &str = "BILLTRACE_DEFAULT_PROVIDER";
pub const ENV_VISION_BASE_URL: &str = "BILLTRACE_VISION_URL";
pub const ENV_VISION_MODEL: &str = "BILLTRACE_VISION_MODEL";
pub const ENV_BLOB_DIR: &str = "BILLTRACE_BLOB_DIR";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ladder_is_ordered() {
        assert!(HIGH_CHARGE_THRESHOLD_PCT < SEVERITY_HIGH_PCT);
        assert!(SEVERITY_HIGH_PCT < SEVERITY_CRITICAL_PCT);
    }

    #[test]
    fn test_quick_scan_is_cheaper_than_full() {
        assert!(QUICK_SCAN_DPI < FULL_SCAN_DPI);
        assert!(QUICK_SCAN_MAX_WIDTH < FULL_SCAN_MAX_WIDTH);
        assert!(QUICK_SCAN_MAX_HEIGHT < FULL_SCAN_MAX_HEIGHT);
    }

    #[test]
    fn test_confidence_ladder_descends() {
        assert!(CONFIDENCE_TEXT_BOTH > CONFIDENCE_TEXT_INVOICE_ONLY);
    }
}
