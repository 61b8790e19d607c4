//! Tool-specific error types.

use thiserror::Error;

/// Errors raised while registering or invoking gateway tools.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A declared input schema could not be turned into a JSON schema object.
    #[error("Invalid input schema for tool '{tool}': {reason}")]
    InvalidSchema { tool: String, reason: String },

    /// The call did not carry a tool identifier.
    #[error("Tool id is empty")]
    MissingToolId,

    /// Invalid arguments were provided to the tool.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The downstream execution failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(#[from] ExecutorError),
}

impl ToolError {
    /// Create a new "invalid schema" error.
    pub fn invalid_schema(tool: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidSchema {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new "invalid arguments" error.
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }
}

/// Errors reported by the downstream execution collaborator.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The request could not be sent or the connection failed.
    #[error("Request to executor failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The executor answered with a non-success status.
    #[error("Executor returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The executor reply could not be decoded.
    #[error("Invalid executor response: {0}")]
    Decode(String),

    /// Any other failure raised by an executor implementation.
    #[error("{0}")]
    Other(String),
}

impl ExecutorError {
    /// Create a new "decode" error.
    pub fn decode(msg: impl ToString) -> Self {
        Self::Decode(msg.to_string())
    }

    /// Create a generic executor error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
