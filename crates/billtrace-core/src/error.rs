//! Error types for billtrace.

use thiserror::Error;

/// Result type alias using billtrace's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for billtrace operations.
///
/// Errors raised before bill persistence fail the whole ingestion; errors in
/// post-processing steps are downgraded to [`Error::PostProcessing`] and
/// reported alongside the persisted bill. A detected duplicate is not an
/// error at all; it is a distinct pipeline outcome.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bill not found
    #[error("Bill not found: {0}")]
    BillNotFound(uuid::Uuid),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(uuid::Uuid),

    /// Unique-key conflict surfaced to the caller (e.g. explicit account
    /// creation with an account number that already exists)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Extraction payload failed schema validation; names the offending field
    #[error("Validation error: {0}")]
    Validation(String),

    /// External vision/extraction service failed or returned garbage
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// A state-machine transition was attempted from the wrong state
    #[error("Invalid state transition: {0}")]
    StateConflict(String),

    /// Post-persistence step failed; the bill itself is committed
    #[error("Post-processing error: {0}")]
    PostProcessing(String),

    /// The pipeline was cancelled before persistence
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Machine-readable error kind, stable across message changes.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Database(_) => "database",
            Error::NotFound(_) | Error::BillNotFound(_) | Error::AccountNotFound(_) => "not_found",
            Error::AlreadyExists(_) => "already_exists",
            Error::Validation(_) => "validation",
            Error::Extraction(_) => "extraction",
            Error::StateConflict(_) => "state_conflict",
            Error::PostProcessing(_) => "post_processing",
            Error::Cancelled(_) => "cancelled",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::InvalidInput(_) => "invalid_input",
            Error::Request(_) => "request",
            Error::Internal(_) => "internal",
            Error::Io(_) => "io",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_bill_not_found() {
        let id = Uuid::nil();
        let err = Error::BillNotFound(id);
        assert_eq!(err.to_string(), format!("Bill not found: {}", id));
    }

    #[test]
    fn test_error_display_validation_names_field() {
        let err = Error::Validation("billingPeriodStart must be in YYYY-MM-DD format".to_string());
        assert!(err.to_string().contains("billingPeriodStart"));
    }

    #[test]
    fn test_error_display_extraction() {
        let err = Error::Extraction("model timeout".to_string());
        assert_eq!(err.to_string(), "Extraction error: model timeout");
    }

    #[test]
    fn test_error_display_state_conflict() {
        let err = Error::StateConflict("alert already resolved".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid state transition: alert already resolved"
        );
    }

    #[test]
    fn test_error_kind_stability() {
        assert_eq!(Error::Validation("x".into()).kind(), "validation");
        assert_eq!(Error::Extraction("x".into()).kind(), "extraction");
        assert_eq!(Error::PostProcessing("x".into()).kind(), "post_processing");
        assert_eq!(Error::Cancelled("x".into()).kind(), "cancelled");
        assert_eq!(Error::BillNotFound(Uuid::nil()).kind(), "not_found");
        assert_eq!(Error::AlreadyExists("x".into()).kind(), "already_exists");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => {
                assert!(!msg.is_empty());
            }
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(get_result().unwrap(), 42);
    }
}
