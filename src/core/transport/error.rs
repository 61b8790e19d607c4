//! Transport error types.

use thiserror::Error;

/// Result type for HTTP server operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for deploy and undeploy operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors that can occur while running the HTTP server.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to bind to address.
    #[error("Failed to bind to {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// IO error during transport.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// HTTP-specific error.
    #[error("HTTP error: {0}")]
    HttpError(String),
}

impl TransportError {
    /// Create a bind error.
    pub fn bind(address: impl Into<String>, source: std::io::Error) -> Self {
        Self::BindError {
            address: address.into(),
            source,
        }
    }

    /// Create an HTTP error.
    pub fn http(msg: impl Into<String>) -> Self {
        Self::HttpError(msg.into())
    }
}

/// Errors raised while mounting or unmounting an instance transport.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The transport is already mounted on this instance.
    #[error("{transport} transport already deployed for {instance}")]
    AlreadyDeployed { transport: String, instance: String },

    /// The instance identity cannot be turned into a route.
    #[error("Invalid route for {instance}: {reason}")]
    InvalidRoute { instance: String, reason: String },

    /// Shutdown did not finish within the configured bound.
    #[error("{transport} transport for {instance} did not shut down within {timeout_ms} ms")]
    ShutdownTimeout {
        transport: String,
        instance: String,
        timeout_ms: u128,
    },

    /// Any other mount failure.
    #[error("Failed to mount {transport} transport: {reason}")]
    Mount { transport: String, reason: String },
}

impl DeployError {
    /// Create an "already deployed" error.
    pub fn already_deployed(transport: impl Into<String>, instance: impl ToString) -> Self {
        Self::AlreadyDeployed {
            transport: transport.into(),
            instance: instance.to_string(),
        }
    }

    /// Create an "invalid route" error.
    pub fn invalid_route(instance: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidRoute {
            instance: instance.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a generic mount error.
    pub fn mount(transport: impl Into<String>, reason: impl ToString) -> Self {
        Self::Mount {
            transport: transport.into(),
            reason: reason.to_string(),
        }
    }
}
