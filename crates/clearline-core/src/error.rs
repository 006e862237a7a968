//! Error types for the connection state machine and correlator.

use clearline_proto::RequestId;
use thiserror::Error;

use crate::connection::Phase;

/// Errors returned by the core state machines.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// Operation not valid in the current phase
    #[error("cannot {operation} while {phase:?}")]
    InvalidState {
        /// Phase the connection was in
        phase: Phase,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// A request id was registered twice
    #[error("request {request_id} is already pending")]
    DuplicateRequest {
        /// Offending id
        request_id: RequestId,
    },
}
