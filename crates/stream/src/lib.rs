//! AetherCore Stream
//!
//! Per-stream sequence tracking and replay protection for unit telemetry.

#![warn(missing_docs)]

pub mod error;
pub mod integrity;

pub use error::{StreamError, StreamResult};
pub use integrity::{
    IntegrityStatus, SequenceGapWarning, SequenceVerdict, StreamIntegrityTracker, MAX_SEQUENCE_GAP,
};
