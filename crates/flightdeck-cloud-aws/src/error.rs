//! Mapping of AWS SDK failures onto [`CloudError`]

use aws_sdk_cloudformation::config::http::HttpResponse;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use flightdeck_cloud::CloudError;
use thiserror::Error;

/// Error code CloudFormation returns for unknown stacks
const VALIDATION_ERROR: &str = "ValidationError";

/// Error codes SQS returns for a deleted queue, for the query and JSON protocols
const NON_EXISTENT_QUEUE: &[&str] = &["AWS.SimpleQueueService.NonExistentQueue", "QueueDoesNotExist"];

/// Failures that happen on our side of an AWS call
#[derive(Debug, Error)]
pub enum AwsError {
    #[error("Failed to build {shape}: {message}")]
    Build { shape: &'static str, message: String },

    #[error("Response missing {0}")]
    MissingField(&'static str),

    #[error("Stack {name} entered {status}")]
    StackFailed { name: String, status: String },

    #[error("Timed out waiting for stack {0}")]
    WaitTimeout(String),
}

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::StackFailed { .. } | AwsError::WaitTimeout(_) => CloudError::Api {
                status: None,
                code: Some("ResourceNotReady".to_string()),
                message: err.to_string(),
            },
            other => CloudError::Validation(other.to_string()),
        }
    }
}

/// Classify an SDK error using its HTTP status and service error code
pub(crate) fn from_sdk<E>(err: SdkError<E, HttpResponse>) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    match code.as_deref() {
        Some(VALIDATION_ERROR) if message.contains("does not exist") => CloudError::NotFound(message),
        Some(c) if NON_EXISTENT_QUEUE.contains(&c) => CloudError::QueueDeleted(message),
        _ => CloudError::from_response(status, code.as_deref(), message),
    }
}

pub(crate) fn build_error(shape: &'static str, err: impl std::fmt::Display) -> CloudError {
    AwsError::Build {
        shape,
        message: err.to_string(),
    }
    .into()
}

/// Read an SDK string member that may or may not be modelled as optional
pub(crate) fn text<'a>(value: impl Into<Option<&'a str>>) -> String {
    value.into().unwrap_or_default().to_string()
}

/// Read an SDK enum member that may or may not be modelled as optional
pub(crate) fn enum_text<'a, T>(value: impl Into<Option<&'a T>>) -> String
where
    T: AsRef<str> + 'a,
{
    value.into().map(|v| v.as_ref().to_string()).unwrap_or_default()
}

/// Read an SDK integer member that may or may not be modelled as optional
pub(crate) fn number(value: impl Into<Option<i32>>) -> i32 {
    value.into().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_readers() {
        assert_eq!(text(Some("a")), "a");
        assert_eq!(text("b"), "b");
        assert_eq!(text(None::<&str>), "");
        assert_eq!(number(Some(3)), 3);
        assert_eq!(number(4), 4);
    }

    #[test]
    fn test_wait_failures_map_to_api_errors() {
        let err: CloudError = AwsError::StackFailed {
            name: "flight-lab".into(),
            status: "ROLLBACK_COMPLETE".into(),
        }
        .into();
        assert_eq!(err.code(), Some("ResourceNotReady"));
        assert!(!err.is_retryable());
    }
}
