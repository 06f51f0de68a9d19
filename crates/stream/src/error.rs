//! Error types for AetherCore Stream operations.

use thiserror::Error;

/// Errors that can occur in stream operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Sequence id at or below the last accepted id
    #[error("Replay detected on {stream_id}: sequence_id {sequence_id} <= last_seen {last_sequence_id}")]
    ReplayDetected {
        /// Stream identifier
        stream_id: String,
        /// Rejected sequence id
        sequence_id: u64,
        /// Last accepted sequence id
        last_sequence_id: u64,
    },

    /// A stream lock was poisoned
    #[error("Stream tracker lock poisoned")]
    Poisoned,
}

/// Result type for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;
