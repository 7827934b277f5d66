//! Pipeline configuration.

use billtrace_core::defaults;

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Percentage increase over the previous bill that raises an alert.
    pub high_charge_threshold_pct: f64,
    /// Provider recorded on auto-registered accounts.
    pub default_provider: String,
    /// Maximum accepted source PDF size in bytes.
    pub max_file_bytes: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            high_charge_threshold_pct: defaults::HIGH_CHARGE_THRESHOLD_PCT,
            default_provider: defaults::DEFAULT_PROVIDER.to_string(),
            max_file_bytes: defaults::MAX_FILE_BYTES,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `BILLTRACE_ALERT_THRESHOLD_PCT` | `20` | High-charge alert threshold |
    /// | `BILLTRACE_DEFAULT_PROVIDER` | `Dhiraagu` | Provider for auto-registered accounts |
    /// | `BILLTRACE_MAX_FILE_BYTES` | `10485760` | Upload size cap |
    pub fn from_env() -> Self {
        let high_charge_threshold_pct = std::env::var(defaults::ENV_ALERT_THRESHOLD_PCT)
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(defaults::HIGH_CHARGE_THRESHOLD_PCT);

        let default_provider = std::env::var(defaults::ENV_DEFAULT_PROVIDER)
            .unwrap_or_else(|_| defaults::DEFAULT_PROVIDER.to_string());

        let max_file_bytes = std::env::var(defaults::ENV_MAX_FILE_BYTES)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::MAX_FILE_BYTES);

        Self {
            high_charge_threshold_pct,
            default_provider,
            max_file_bytes,
        }
    }

    /// Set the high-charge alert threshold.
    pub fn with_threshold(mut self, pct: f64) -> Self {
        self.high_charge_threshold_pct = pct;
        self
    }

    /// Set the default provider for auto-registered accounts.
    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = provider.into();
        self
    }

    /// Set the upload size cap.
    pub fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes;
        self
    }
}
