//! Error types and handling for the gateway.
//!
//! This module defines a unified error type that can represent errors from
//! all domains and external dependencies, providing consistent error handling
//! across the entire application.

use thiserror::Error;

/// A specialized Result type for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the gateway.
#[derive(Debug, Error)]
pub enum Error {
    /// Error originating from the instances domain.
    #[error("Instance error: {0}")]
    Instance(#[from] crate::domains::instances::InstanceError),

    /// Error originating from the record store.
    #[error("Store error: {0}")]
    Store(#[from] crate::domains::records::StoreError),

    /// Error originating from the HTTP server.
    #[error("Transport error: {0}")]
    Transport(#[from] super::transport::TransportError),

    /// Error building the downstream executor.
    #[error("Executor error: {0}")]
    Executor(#[from] crate::domains::tools::ExecutorError),

    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from file operations or network communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal errors that should not occur under normal operation.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
