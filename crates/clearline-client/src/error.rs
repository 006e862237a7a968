//! Client error taxonomy.

use std::time::Duration;

use clearline_core::{CodecError, SignerError};
use clearline_proto::Method;
use thiserror::Error;

/// Errors surfaced to callers of [`crate::Client`] and to
/// [`crate::ClientHandler::on_error`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The transport did not open within the connection timeout
    #[error("connection timed out")]
    ConnectionTimeout,

    /// The transport failed to open or broke
    #[error("transport error: {0}")]
    Transport(String),

    /// The clearing node refused the handshake
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// Operation attempted while not authenticated
    #[error("not connected")]
    NotConnected,

    /// No response arrived within the request budget
    #[error("{method} timed out after {budget:?}")]
    RequestTimeout {
        /// Method of the request
        method: Method,
        /// Budget that elapsed
        budget: Duration,
    },

    /// The clearing node answered with an `error` message
    #[error("clearing node error {code}: {message}")]
    Protocol {
        /// Error code
        code: i64,
        /// Error message
        message: String,
    },

    /// The link closed while the request was pending
    #[error("connection closed")]
    ConnectionClosed,

    /// Automatic reconnect gave up
    #[error("reconnect gave up after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// A message could not be built or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// A signer refused or failed
    #[error(transparent)]
    Signer(#[from] SignerError),
}

impl From<CodecError> for ClientError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Signer(e) => Self::Signer(e),
            other => Self::Codec(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
