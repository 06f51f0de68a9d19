//! Stream Integrity Tracking
//!
//! Per-stream replay protection for inbound telemetry. Sequence ids must be
//! strictly increasing; anything at or below the last accepted id is a
//! replay and never reaches the trust scorer. Large forward jumps are
//! accepted but surfaced as [`SequenceGapWarning`].
//!
//! Callers that need to inspect an event before trusting it check first and
//! commit afterwards; an event that is checked but never committed leaves
//! the stream where it was.

use crate::error::{StreamError, StreamResult};
use aethercore_core::current_time_ns;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Forward jump above which an accepted event raises a gap warning
pub const MAX_SEQUENCE_GAP: u64 = 1000;

/// Advisory raised for a large forward jump in sequence ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceGapWarning {
    /// Stream identifier
    pub stream_id: String,
    /// Accepted sequence id
    pub sequence_id: u64,
    /// Previously accepted sequence id
    pub last_sequence_id: u64,
    /// Size of the jump
    pub gap: u64,
}

/// Outcome of an accepted sequence id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceVerdict {
    /// In order
    Accepted,
    /// In order, but far ahead of the previous id
    AcceptedWithGap(SequenceGapWarning),
}

impl SequenceVerdict {
    /// The gap warning, if any
    pub fn gap_warning(&self) -> Option<&SequenceGapWarning> {
        match self {
            SequenceVerdict::Accepted => None,
            SequenceVerdict::AcceptedWithGap(w) => Some(w),
        }
    }
}

/// Integrity status for a stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityStatus {
    /// Stream identifier
    pub stream_id: String,
    /// Last accepted sequence id (0 before the first event)
    pub last_sequence_id: u64,
    /// Events accepted
    pub accepted_events: u64,
    /// Events rejected as replays
    pub replay_rejections: u64,
    /// Accepted events that raised a gap warning
    pub gap_warnings: u64,
    /// Last check timestamp (nanoseconds)
    pub last_check_ns: u64,
    /// Whether this stream is compromised
    pub is_compromised: bool,
    /// Reason for compromise (if any)
    pub compromise_reason: Option<String>,
}

impl IntegrityStatus {
    /// Create a new integrity status tracker for a stream
    pub fn new(stream_id: String) -> Self {
        Self {
            stream_id,
            last_sequence_id: 0,
            accepted_events: 0,
            replay_rejections: 0,
            gap_warnings: 0,
            last_check_ns: current_time_ns(),
            is_compromised: false,
            compromise_reason: None,
        }
    }

    /// Check a sequence id without advancing the stream.
    ///
    /// Replays are counted here; the id only becomes the new floor once
    /// [`commit_sequence`](Self::commit_sequence) accepts it.
    pub fn check_sequence(&mut self, sequence_id: u64) -> StreamResult<SequenceVerdict> {
        self.last_check_ns = current_time_ns();
        self.reject_replay(sequence_id)?;

        let Some(gap) = self.gap_over_limit(sequence_id) else {
            return Ok(SequenceVerdict::Accepted);
        };
        tracing::warn!(
            stream_id = %self.stream_id,
            sequence_id,
            last_sequence_id = self.last_sequence_id,
            gap,
            "Large sequence gap detected - possible attack or network disruption"
        );
        Ok(SequenceVerdict::AcceptedWithGap(SequenceGapWarning {
            stream_id: self.stream_id.clone(),
            sequence_id,
            last_sequence_id: self.last_sequence_id,
            gap,
        }))
    }

    /// Advance the stream to a checked sequence id.
    ///
    /// Fails if another event moved the stream to or past `sequence_id`
    /// since the check.
    pub fn commit_sequence(&mut self, sequence_id: u64) -> StreamResult<()> {
        self.reject_replay(sequence_id)?;
        if self.gap_over_limit(sequence_id).is_some() {
            self.gap_warnings += 1;
        }
        self.last_sequence_id = sequence_id;
        self.accepted_events += 1;
        Ok(())
    }

    /// Check a sequence id and advance the stream on success
    pub fn validate_sequence(&mut self, sequence_id: u64) -> StreamResult<SequenceVerdict> {
        let verdict = self.check_sequence(sequence_id)?;
        self.commit_sequence(sequence_id)?;
        Ok(verdict)
    }

    fn reject_replay(&mut self, sequence_id: u64) -> StreamResult<()> {
        if sequence_id > self.last_sequence_id {
            return Ok(());
        }
        self.replay_rejections += 1;
        tracing::error!(
            stream_id = %self.stream_id,
            sequence_id,
            last_sequence_id = self.last_sequence_id,
            "Replay attack detected"
        );
        Err(StreamError::ReplayDetected {
            stream_id: self.stream_id.clone(),
            sequence_id,
            last_sequence_id: self.last_sequence_id,
        })
    }

    fn gap_over_limit(&self, sequence_id: u64) -> Option<u64> {
        let gap = sequence_id - self.last_sequence_id;
        // No history before the first event, so no gap to report
        (gap > MAX_SEQUENCE_GAP && self.accepted_events > 0).then_some(gap)
    }

    /// Flag the stream as compromised
    pub fn mark_compromised(&mut self, reason: String) {
        tracing::error!(
            stream_id = %self.stream_id,
            reason = %reason,
            "Stream integrity compromised"
        );
        self.is_compromised = true;
        self.compromise_reason = Some(reason);
    }

    /// Clear the compromise flag after re-audit; sequence state is kept
    pub fn reset_compromise(&mut self) {
        self.is_compromised = false;
        self.compromise_reason = None;
    }
}

/// Tracks integrity status for multiple streams.
///
/// The map lock is only held to find or insert a stream; validation runs
/// under that stream's own mutex, so streams never block each other.
#[derive(Debug, Default)]
pub struct StreamIntegrityTracker {
    streams: RwLock<HashMap<String, Arc<Mutex<IntegrityStatus>>>>,
}

impl StreamIntegrityTracker {
    /// Create a new stream integrity tracker
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&self, stream_id: &str) -> StreamResult<Arc<Mutex<IntegrityStatus>>> {
        if let Some(status) = self
            .streams
            .read()
            .map_err(|_| StreamError::Poisoned)?
            .get(stream_id)
        {
            return Ok(Arc::clone(status));
        }

        let mut streams = self.streams.write().map_err(|_| StreamError::Poisoned)?;
        Ok(Arc::clone(streams.entry(stream_id.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(IntegrityStatus::new(stream_id.to_string())))
        })))
    }

    fn existing(&self, stream_id: &str) -> Option<Arc<Mutex<IntegrityStatus>>> {
        self.streams.read().ok()?.get(stream_id).cloned()
    }

    /// Validate sequence ID for a stream (replay attack prevention)
    pub fn validate_sequence(&self, stream_id: &str, sequence_id: u64) -> StreamResult<SequenceVerdict> {
        let stream = self.stream(stream_id)?;
        let mut status = stream.lock().map_err(|_| StreamError::Poisoned)?;
        status.validate_sequence(sequence_id)
    }

    /// Check a sequence id for a stream without advancing it
    pub fn check_sequence(&self, stream_id: &str, sequence_id: u64) -> StreamResult<SequenceVerdict> {
        let stream = self.stream(stream_id)?;
        let mut status = stream.lock().map_err(|_| StreamError::Poisoned)?;
        status.check_sequence(sequence_id)
    }

    /// Advance a stream to a previously checked sequence id
    pub fn commit_sequence(&self, stream_id: &str, sequence_id: u64) -> StreamResult<()> {
        let stream = self.stream(stream_id)?;
        let mut status = stream.lock().map_err(|_| StreamError::Poisoned)?;
        status.commit_sequence(sequence_id)
    }

    /// Snapshot of a stream's integrity status
    pub fn get(&self, stream_id: &str) -> Option<IntegrityStatus> {
        let stream = self.existing(stream_id)?;
        let status = stream.lock().ok()?;
        Some(status.clone())
    }

    /// Last accepted sequence id (0 for unknown streams)
    pub fn last_sequence_id(&self, stream_id: &str) -> u64 {
        self.get(stream_id).map(|s| s.last_sequence_id).unwrap_or(0)
    }

    /// Flag a stream as compromised
    pub fn mark_compromised(&self, stream_id: &str, reason: &str) -> StreamResult<()> {
        let stream = self.stream(stream_id)?;
        let mut status = stream.lock().map_err(|_| StreamError::Poisoned)?;
        status.mark_compromised(reason.to_string());
        Ok(())
    }

    /// Check if a stream is compromised
    pub fn is_stream_compromised(&self, stream_id: &str) -> bool {
        self.get(stream_id).map(|s| s.is_compromised).unwrap_or(false)
    }

    /// Get all compromised streams
    pub fn get_compromised_streams(&self) -> Vec<IntegrityStatus> {
        let Ok(streams) = self.streams.read() else {
            return Vec::new();
        };
        streams
            .values()
            .filter_map(|s| s.lock().ok().map(|s| s.clone()))
            .filter(|s| s.is_compromised)
            .collect()
    }

    /// Reset compromise status for a stream
    pub fn reset_stream(&self, stream_id: &str) {
        if let Some(stream) = self.existing(stream_id) {
            if let Ok(mut status) = stream.lock() {
                status.reset_compromise();
            }
        }
    }

    /// Get total number of tracked streams
    pub fn stream_count(&self) -> usize {
        self.streams.read().map(|s| s.len()).unwrap_or(0)
    }
}
