//! Error types for the sync engine

use thiserror::Error;

use crate::session::ConnectionState;

/// Result type alias for session operations
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Operation called from a state that forbids it (programming error)
    #[error("`{operation}` is not allowed while the connection is {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    /// Binary payload the CRDT layer could not decode
    #[error("malformed {what} payload: {reason}")]
    MalformedPayload { what: &'static str, reason: String },

    /// Decoded update the CRDT layer refused to integrate
    #[error("failed to apply update: {0}")]
    Apply(String),

    /// Update observer could not be installed on the document
    #[error("failed to observe document updates: {0}")]
    Observer(String),
}
