//! Instance orchestration error types.

use http::StatusCode;
use thiserror::Error;

use super::model::InstanceKey;
use crate::core::transport::DeployError;
use crate::domains::records::StoreError;
use crate::domains::tools::ToolError;

/// Result type for instance operations.
pub type InstanceResult<T> = Result<T, InstanceError>;

/// Errors raised by the instance manager and the orchestration service.
#[derive(Debug, Error)]
pub enum InstanceError {
    /// Malformed request.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// An instance with this identity is already live.
    #[error("Instance already exists: {0}")]
    AlreadyExists(InstanceKey),

    /// No live instance with this identity.
    #[error("Instance not found: {0}")]
    NotFound(InstanceKey),

    /// Record store failure.
    #[error("Transaction error: {0}")]
    Transaction(StoreError),

    /// Transport mount or unmount failure.
    #[error("Deploy error: {0}")]
    Deploy(#[from] DeployError),

    /// Tool registration failure.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// A persisted config could not be encoded or decoded.
    #[error("Invalid config for {key}: {source}")]
    Config {
        key: InstanceKey,
        #[source]
        source: serde_json::Error,
    },

    /// The instance exists but does not accept traffic.
    #[error("Instance disabled: {0}")]
    Disabled(InstanceKey),
}

impl From<StoreError> for InstanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate {
                resource_id,
                version,
                ..
            } => Self::AlreadyExists(InstanceKey::new(resource_id, version)),
            other => Self::Transaction(other),
        }
    }
}

impl InstanceError {
    /// Create a new validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new config error.
    pub fn config(key: &InstanceKey, source: serde_json::Error) -> Self {
        Self::Config {
            key: key.clone(),
            source,
        }
    }

    /// HTTP status reported to REST callers.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::AlreadyExists(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Disabled(_) => StatusCode::FORBIDDEN,
            Self::Transaction(_) | Self::Deploy(_) | Self::Tool(_) | Self::Config { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::AlreadyExists(_) => "already_exists",
            Self::NotFound(_) => "not_found",
            Self::Transaction(_) => "transaction_error",
            Self::Deploy(_) => "deploy_error",
            Self::Tool(_) => "tool_error",
            Self::Config { .. } => "config_error",
            Self::Disabled(_) => "disabled",
        }
    }
}
