//! Cloud provider error types

use thiserror::Error;

/// Error codes a provider returns alongside HTTP 400 when it is rate limiting.
pub const THROTTLING_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "ThrottlingException",
    "Throttling",
];

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    /// Request rejected because of request-rate limits (HTTP 400 + throttling code)
    #[error("Throttled by provider ({code}): {message}")]
    Throttling { code: String, message: String },

    /// Opaque provider failure, propagated verbatim
    #[error("API error{}: {message}", fmt_status(*status, code.as_deref()))]
    Api {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Network index {index} in domain '{domain}' was booked concurrently")]
    BookingConflict { domain: String, index: u8 },

    #[error("No available networks in domain '{0}'")]
    NoNetworksAvailable(String),

    #[error("Network {index} is not booked in domain '{domain}'")]
    NetworkNotBooked { domain: String, index: u8 },

    /// A conditional write found the guarded value in an unexpected state
    #[error("Conditional update failed: {0}")]
    ConditionFailed(String),

    /// The queue was deleted while it was being polled
    #[error("Queue no longer exists: {0}")]
    QueueDeleted(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn fmt_status(status: Option<u16>, code: Option<&str>) -> String {
    match (status, code) {
        (Some(s), Some(c)) => format!(" ({} {})", s, c),
        (Some(s), None) => format!(" ({})", s),
        (None, Some(c)) => format!(" ({})", c),
        (None, None) => String::new(),
    }
}

impl CloudError {
    /// Build an error from a raw provider status/code pair, classifying
    /// throttling responses.
    pub fn from_response(
        status: Option<u16>,
        code: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        match (status, code) {
            (Some(400), Some(c)) if THROTTLING_CODES.contains(&c) => CloudError::Throttling {
                code: c.to_string(),
                message,
            },
            _ => CloudError::Api {
                status,
                code: code.map(str::to_string),
                message,
            },
        }
    }

    /// Whether the retry gate should try the call again.
    ///
    /// HTTP 500/503 and throttling-coded 400s are transient; everything else
    /// is returned to the caller immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            CloudError::Throttling { .. } => true,
            CloudError::Api {
                status: Some(500 | 503),
                ..
            } => true,
            _ => false,
        }
    }

    /// Provider error code, when there is one
    pub fn code(&self) -> Option<&str> {
        match self {
            CloudError::Throttling { code, .. } => Some(code),
            CloudError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttling_classification() {
        let err = CloudError::from_response(Some(400), Some("Throttling"), "Rate exceeded");
        assert!(matches!(err, CloudError::Throttling { .. }));
        assert!(err.is_retryable());

        let err = CloudError::from_response(
            Some(400),
            Some("ProvisionedThroughputExceededException"),
            "slow down",
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_server_errors_are_retryable() {
        assert!(CloudError::from_response(Some(500), None, "boom").is_retryable());
        assert!(CloudError::from_response(Some(503), Some("Unavailable"), "x").is_retryable());
        assert!(!CloudError::from_response(Some(502), None, "bad gateway").is_retryable());
    }

    #[test]
    fn test_other_errors_are_not_retryable() {
        let err = CloudError::from_response(Some(400), Some("ValidationError"), "bad");
        assert!(!err.is_retryable());
        assert_eq!(err.code(), Some("ValidationError"));
        assert!(!CloudError::NotFound("x".into()).is_retryable());
        assert!(
            !CloudError::BookingConflict {
                domain: "d".into(),
                index: 3
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_api_error_display() {
        let err = CloudError::from_response(Some(403), Some("AccessDenied"), "nope");
        assert_eq!(err.to_string(), "API error (403 AccessDenied): nope");
    }
}
