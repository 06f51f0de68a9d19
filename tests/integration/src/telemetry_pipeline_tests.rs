//! Telemetry ingest end to end: sequence checks, attestation, scoring, votes.

use crate::test_utils::*;
use aethercore_core::{current_time_ns, NodeConfig, TruthChainRecorder};
use aethercore_identity::IdentityRegistry;
use aethercore_stream::{StreamError, StreamIntegrityTracker};
use aethercore_trust_mesh::TrustMesh;
use aethercore_unit_status::{
    IngestError, RegistryAttestor, TelemetryFrame, TelemetryPipeline, TelemetryTrustScorer,
    TrustLevel,
};
use std::sync::Arc;

const SECOND: u64 = 1_000_000_000;

struct Harness {
    registry: Arc<IdentityRegistry>,
    tracker: Arc<StreamIntegrityTracker>,
    mesh: Arc<TrustMesh>,
    pipeline: TelemetryPipeline,
}

fn harness() -> Harness {
    aethercore_core::logging::try_init();
    let config = NodeConfig::default();
    let registry = Arc::new(IdentityRegistry::new());
    let recorder = Arc::new(TruthChainRecorder::in_memory());
    let tracker = Arc::new(StreamIntegrityTracker::new());
    let mesh = Arc::new(TrustMesh::new(
        config.byzantine.clone(),
        recorder,
        Arc::clone(&registry),
    ));
    let scorer = TelemetryTrustScorer::new(
        config.telemetry.clone(),
        Arc::new(RegistryAttestor::new(Arc::clone(&registry))),
    );
    let pipeline = TelemetryPipeline::new(Arc::clone(&tracker), scorer, Arc::clone(&mesh));
    Harness {
        registry,
        tracker,
        mesh,
        pipeline,
    }
}

#[test]
fn test_attested_telemetry_scores_high() {
    let h = harness();
    let unit = TestDevice::new("unit-001");
    unit.register(&h.registry);

    let now = current_time_ns();
    let report = h
        .pipeline
        .ingest(
            &TelemetryFrame {
                sequence_id: 1,
                status: unit.attested_status(now),
            },
            now,
        )
        .unwrap();

    assert_eq!(report.assessment.level, TrustLevel::High);
    let peer = report.peer.unwrap();
    assert!(!peer.quarantined);
    assert_eq!(h.pipeline.book().get("unit-001").unwrap().sequence_id, 1);
}

#[test]
fn test_unattested_and_stale_telemetry() {
    let h = harness();
    let unit = TestDevice::new("unit-002");
    let now = current_time_ns();

    let unattested = h
        .pipeline
        .ingest(
            &TelemetryFrame {
                sequence_id: 1,
                status: unit.status(now),
            },
            now,
        )
        .unwrap();
    assert!(matches!(unattested.assessment.level, TrustLevel::Medium | TrustLevel::Low));

    let stale = h
        .pipeline
        .ingest(
            &TelemetryFrame {
                sequence_id: 2,
                status: unit.status(now - 90 * SECOND),
            },
            now,
        )
        .unwrap();
    assert_eq!(stale.assessment.level, TrustLevel::Degraded);
    assert!(stale.assessment.score > 0.0);
    assert!(stale.peer.is_none());
}

#[test]
fn test_replayed_frame_rejected_before_scoring() {
    let h = harness();
    let unit = TestDevice::new("unit-003");
    unit.register(&h.registry);
    let now = current_time_ns();

    for seq in [1, 2, 3] {
        h.pipeline
            .ingest(
                &TelemetryFrame {
                    sequence_id: seq,
                    status: unit.attested_status(now),
                },
                now,
            )
            .unwrap();
    }

    let replay = h.pipeline.ingest(
        &TelemetryFrame {
            sequence_id: 2,
            status: unit.attested_status(now),
        },
        now,
    );
    assert!(matches!(
        replay,
        Err(IngestError::Stream(StreamError::ReplayDetected {
            sequence_id: 2,
            last_sequence_id: 3,
            ..
        }))
    ));
    let integrity = h.tracker.get("unit-003").unwrap();
    assert_eq!(integrity.replay_rejections, 1);
    assert_eq!(integrity.accepted_events, 3);
    assert_eq!(h.pipeline.book().get("unit-003").unwrap().sequence_id, 3);
}

#[test]
fn test_large_gap_accepted_with_warning() {
    let h = harness();
    let unit = TestDevice::new("unit-004");
    unit.register(&h.registry);
    let now = current_time_ns();

    let frame = |seq| TelemetryFrame {
        sequence_id: seq,
        status: unit.attested_status(now),
    };
    assert!(h.pipeline.ingest(&frame(10), now).unwrap().gap_warning.is_none());
    let report = h.pipeline.ingest(&frame(5_000), now).unwrap();
    assert_eq!(report.gap_warning.unwrap().gap, 4_990);
    assert_eq!(h.tracker.last_sequence_id("unit-004"), 5_000);
}

#[test]
fn test_foreign_signature_is_spoofed() {
    let h = harness();
    let unit = TestDevice::new("unit-005");
    unit.register(&h.registry);
    let impostor = TestDevice::new("unit-005");
    let now = current_time_ns();

    let report = h
        .pipeline
        .ingest(
            &TelemetryFrame {
                sequence_id: 1,
                status: impostor.attested_status(now),
            },
            now,
        )
        .unwrap();
    assert_eq!(report.assessment.level, TrustLevel::Spoofed);
    assert_eq!(report.assessment.score, 0.0);
    assert!(h.tracker.is_stream_compromised("unit-005"));
    assert!(h.mesh.aggregate_trust("unit-005") < 1.0);
}

#[test]
fn test_forged_sequence_cannot_lock_out_unit() {
    let h = harness();
    let unit = TestDevice::new("unit-006");
    unit.register(&h.registry);
    let impostor = TestDevice::new("unit-006");
    let now = current_time_ns();

    h.pipeline
        .ingest(
            &TelemetryFrame {
                sequence_id: 1,
                status: unit.attested_status(now),
            },
            now,
        )
        .unwrap();
    let forged = h
        .pipeline
        .ingest(
            &TelemetryFrame {
                sequence_id: u64::MAX,
                status: impostor.attested_status(now),
            },
            now,
        )
        .unwrap();
    assert_eq!(forged.assessment.level, TrustLevel::Spoofed);
    assert_eq!(h.tracker.last_sequence_id("unit-006"), 1);

    h.tracker.reset_stream("unit-006");
    let report = h
        .pipeline
        .ingest(
            &TelemetryFrame {
                sequence_id: 2,
                status: unit.attested_status(now),
            },
            now,
        )
        .unwrap();
    assert_eq!(report.assessment.level, TrustLevel::High);
    assert_eq!(h.tracker.last_sequence_id("unit-006"), 2);
    assert_eq!(h.pipeline.book().get("unit-006").unwrap().sequence_id, 2);
}
