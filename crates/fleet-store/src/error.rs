//! Error types for state store operations.

use std::time::Duration;

/// Errors that can occur during state store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("not found: {key}")]
    NotFound {
        /// Key that was looked up.
        key: String,
    },

    /// The backend could not be reached or refused the command.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer in time.
    #[error("{op} timed out after {after:?}")]
    Timeout {
        /// Repository operation that was running.
        op: &'static str,
        /// The bound that was exceeded.
        after: Duration,
    },

    /// A key holds a different data type than the command expects.
    #[error("wrong type for key {key}")]
    WrongType {
        /// Offending key.
        key: String,
    },

    /// A stored value could not be decoded.
    #[error("corrupt value at {key}: {reason}")]
    Corrupt {
        /// Offending key.
        key: String,
        /// What failed to decode.
        reason: String,
    },

    /// The caller passed an argument the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StoreError {
    /// Whether the error only says the record is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub(crate) fn not_found(key: impl Into<String>) -> Self {
        StoreError::NotFound { key: key.into() }
    }

    pub(crate) fn corrupt(key: impl Into<String>, reason: impl ToString) -> Self {
        StoreError::Corrupt {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}
