//! Store error types.

use thiserror::Error;

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing persisted records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same identity already exists.
    #[error("Record already exists: {resource_id} (type {record_type}, version {version})")]
    Duplicate {
        resource_id: String,
        record_type: String,
        version: i64,
    },

    /// Failed to open or initialise the database.
    #[error("Failed to open database {path}: {reason}")]
    Open { path: String, reason: String },

    /// Transaction begin/commit/rollback failed.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Any other database error.
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl StoreError {
    /// Create a new transaction error.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Create a new open error.
    pub fn open(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Open {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error reports a unique-key violation.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}
