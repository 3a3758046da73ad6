//! Engine error types

use flightdeck_cloud::CloudError;
use flightdeck_config::ConfigError;
use thiserror::Error;

/// Errors raised by the orchestration engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Domain '{0}' was not found.")]
    DomainNotFound(String),

    #[error("Domain '{0}' is not yet ready.")]
    DomainNotReady(String),

    #[error("No domains were found.")]
    NoDomains,

    #[error("Domain '{0}' has running infrastructure or cluster stacks")]
    DomainNotEmpty(String),

    #[error("Domain '{0}' has no running infrastructure or cluster stacks")]
    NothingToPurge(String),

    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("No compute queue named '{queue}' running on cluster: {cluster}")]
    QueueNotFound { cluster: String, queue: String },

    #[error("Unknown appliance type: {0}")]
    UnknownAppliance(String),

    #[error("Invalid {kind} instance type '{value}'")]
    InvalidInstanceType { kind: &'static str, value: String },

    #[error("Invalid key pair name '{0}'")]
    InvalidKeyPair(String),

    #[error("Autoscaling resource not found for stack: {0}")]
    AutoscalingResourceMissing(String),

    #[error("Parameter file {path}: {message}")]
    Parameters { path: String, message: String },

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the error means "the thing is not there"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::Cloud(CloudError::NotFound(_))
                | EngineError::DomainNotFound(_)
                | EngineError::ClusterNotFound(_)
                | EngineError::QueueNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
