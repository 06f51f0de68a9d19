//! Telemetry ingest: replay check, scoring, trust storage, mesh vote.

use crate::book::{UnitTrustBook, UnitTrustRecord};
use crate::trust::{TelemetryTrustScorer, TrustAssessment, TrustLevel};
use crate::types::UnitStatus;
use aethercore_stream::{SequenceGapWarning, StreamError, StreamIntegrityTracker};
use aethercore_trust_mesh::{MeshError, Observation, PeerStatus, TrustMesh};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Telemetry frame as received from a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Per-unit monotonically increasing sequence id
    pub sequence_id: u64,
    /// Reported status
    pub status: UnitStatus,
}

/// Result of ingesting one frame
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    /// Unit identifier
    pub unit_id: String,
    /// Sequence id of the frame; only committed for frames that are not spoofed
    pub sequence_id: u64,
    /// Trust assessment
    pub assessment: TrustAssessment,
    /// Gap advisory raised by the sequence check
    pub gap_warning: Option<SequenceGapWarning>,
    /// Mesh standing after the vote; `None` for degraded frames, which do not vote
    pub peer: Option<PeerStatus>,
}

/// Ingest failures
#[derive(Debug, Error)]
pub enum IngestError {
    /// Sequence check failed; the frame was not scored
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Trust mesh failure
    #[error("Trust mesh error: {0}")]
    Mesh(#[from] MeshError),
}

/// Ordered telemetry pipeline for all units
pub struct TelemetryPipeline {
    tracker: Arc<StreamIntegrityTracker>,
    scorer: TelemetryTrustScorer,
    book: UnitTrustBook,
    mesh: Arc<TrustMesh>,
}

impl TelemetryPipeline {
    /// Create a pipeline
    pub fn new(
        tracker: Arc<StreamIntegrityTracker>,
        scorer: TelemetryTrustScorer,
        mesh: Arc<TrustMesh>,
    ) -> Self {
        Self {
            tracker,
            scorer,
            book: UnitTrustBook::new(),
            mesh,
        }
    }

    /// Stored trust per unit
    pub fn book(&self) -> &UnitTrustBook {
        &self.book
    }

    /// Ingest one frame at `now_ns`.
    ///
    /// Replays are rejected before scoring. Spoofed frames vote as spoofed
    /// and flag the unit's stream, but never advance its sequence or touch
    /// stored trust, so a forged id cannot lock out the genuine unit. Fresh
    /// frames vote their score; degraded frames are stored but cast no vote.
    pub fn ingest(&self, frame: &TelemetryFrame, now_ns: u64) -> Result<IngestReport, IngestError> {
        let unit_id = frame.status.platform_id.as_str();
        let verdict = self.tracker.check_sequence(unit_id, frame.sequence_id)?;

        let assessment = self.scorer.score(&frame.status, now_ns);
        let observation = match assessment.level {
            TrustLevel::Spoofed => {
                self.tracker.mark_compromised(unit_id, "attestation verification failed")?;
                Some(Observation::SpoofedTelemetry)
            }
            level => {
                self.tracker.commit_sequence(unit_id, frame.sequence_id)?;
                self.book.record(UnitTrustRecord {
                    unit_id: unit_id.to_string(),
                    sequence_id: frame.sequence_id,
                    assessment,
                    scored_at_ns: now_ns,
                });
                match level {
                    TrustLevel::Degraded => None,
                    _ => Some(Observation::Telemetry {
                        score: assessment.score,
                    }),
                }
            }
        };

        let peer = match observation {
            Some(obs) => {
                let status = self.mesh.observe(unit_id, obs)?;
                if status.newly_quarantined {
                    warn!(unit_id = %unit_id, aggregate_trust = status.aggregate_trust, "Unit quarantined by telemetry");
                }
                Some(status)
            }
            None => None,
        };

        info!(
            unit_id = %unit_id,
            sequence_id = frame.sequence_id,
            score = assessment.score,
            level = ?assessment.level,
            "Telemetry ingested"
        );

        Ok(IngestReport {
            unit_id: unit_id.to_string(),
            sequence_id: frame.sequence_id,
            assessment,
            gap_warning: verdict.gap_warning().cloned(),
            peer,
        })
    }
}
