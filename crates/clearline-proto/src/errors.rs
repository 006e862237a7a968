//! Wire decoding errors.

use thiserror::Error;

/// Result alias for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors produced while decoding or encoding wire messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// Text was not valid JSON, or a field had the wrong JSON type.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Neither a `req` nor a `res` body was present.
    #[error("envelope has no req or res body")]
    MissingBody,

    /// The params slot did not contain an object.
    #[error("params for {method} are not an object")]
    InvalidParams {
        /// Method the params belonged to
        method: String,
    },

    /// An amount string could not be parsed as an unsigned integer.
    #[error("invalid amount {value:?}")]
    InvalidAmount {
        /// Offending input
        value: String,
    },
}
