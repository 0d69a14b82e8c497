//! Protocol error types

use thiserror::Error;

/// Errors that can occur while decoding node requests
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A required field was absent or empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A field was present but could not be decoded
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// Malformed JSON body
    #[error("Malformed body: {0}")]
    Json(#[from] serde_json::Error),
}
