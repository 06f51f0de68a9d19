//! Red Cell Assault - Byzantine Attack Simulation
//!
//! # Test Scenarios
//!
//! 1. **Spoofed telemetry**: a unit reporting under a forged attestation is
//!    quarantined, audited, and cut off from command dispatch
//! 2. **Forged command signatures**: a signer whose signatures keep failing
//!    is quarantined through the same weighted vote and stops counting
//!    toward any quorum
//! 3. **Release**: only a quorum of designated release authorities can lift
//!    a quarantine, and the release is audited
//!
//! Legitimate units keep operating throughout.

use crate::test_utils::*;
use aethercore_c2_router::{
    AuthorityVerifier, C2Router, Command, CommandDispatcher, QuorumError, QuorumGate, RouterError,
    UnitCommand, UnitDispatchResult,
};
use aethercore_core::{current_time_ns, ByzantinePolicy, NodeConfig, TruthChainRecorder};
use aethercore_identity::IdentityRegistry;
use aethercore_stream::StreamIntegrityTracker;
use aethercore_trust_mesh::{
    release_message, MeshError, QuarantineAction, QuarantineRecord, ReleaseAuthorization,
    ReleaseSignature, TrustMesh, QUARANTINE_CHAIN,
};
use aethercore_unit_status::{
    RegistryAttestor, TelemetryFrame, TelemetryPipeline, TelemetryTrustScorer, TrustLevel,
};
use std::sync::Arc;

struct Theatre {
    registry: Arc<IdentityRegistry>,
    recorder: Arc<TruthChainRecorder>,
    tracker: Arc<StreamIntegrityTracker>,
    mesh: Arc<TrustMesh>,
    pipeline: TelemetryPipeline,
    router: C2Router,
    transport: Arc<FieldTransport>,
}

fn theatre() -> Theatre {
    aethercore_core::logging::try_init();
    let config = NodeConfig {
        byzantine: ByzantinePolicy {
            release_authorities: vec!["authority-1".to_string(), "authority-2".to_string()],
            ..ByzantinePolicy::default()
        },
        ..NodeConfig::default()
    };

    let registry = Arc::new(IdentityRegistry::new());
    let recorder = Arc::new(TruthChainRecorder::in_memory());
    let tracker = Arc::new(StreamIntegrityTracker::new());
    let mesh = Arc::new(TrustMesh::new(
        config.byzantine.clone(),
        Arc::clone(&recorder),
        Arc::clone(&registry),
    ));
    let pipeline = TelemetryPipeline::new(
        Arc::clone(&tracker),
        TelemetryTrustScorer::new(
            config.telemetry.clone(),
            Arc::new(RegistryAttestor::new(Arc::clone(&registry))),
        ),
        Arc::clone(&mesh),
    );

    let transport = FieldTransport::with_unreachable(&[]);
    let dispatcher = CommandDispatcher::new(
        config.dispatch.clone(),
        Arc::clone(&transport) as _,
        Arc::clone(&recorder),
    )
    .with_trust_mesh(Arc::clone(&mesh));
    let router = C2Router::new(
        &config.node_id,
        QuorumGate::new(AuthorityVerifier::new(Arc::clone(&registry))),
        dispatcher,
        Arc::clone(&recorder),
    )
    .with_trust_mesh(Arc::clone(&mesh))
    .with_integrity_tracker(Arc::clone(&tracker));

    Theatre {
        registry,
        recorder,
        tracker,
        mesh,
        pipeline,
        router,
        transport,
    }
}

fn self_test(id: &str, unit: &str) -> Command {
    Command::unit(id, unit, UnitCommand::SelfTest, current_time_ns())
}

fn release(mesh: &TrustMesh, peer_id: &str, signers: &[&TestDevice]) -> ReleaseAuthorization {
    let issued_at_ns = current_time_ns();
    let message = release_message(
        peer_id,
        issued_at_ns,
        mesh.quarantine_epoch(peer_id).unwrap_or(0),
        mesh.quarantine_entry(peer_id).as_ref(),
    );
    ReleaseAuthorization {
        peer_id: peer_id.to_string(),
        issued_at_ns,
        signatures: signers
            .iter()
            .map(|d| ReleaseSignature {
                authority_id: d.node_id.clone(),
                signature: d.sign(&message),
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_spoofing_unit_is_quarantined_and_cut_off() {
    let t = theatre();
    let operator = TestDevice::new("operator-1");
    operator.register(&t.registry);

    let honest = TestDevice::new("unit-honest");
    honest.register(&t.registry);
    let ghost = TestDevice::new("unit-ghost");
    ghost.register(&t.registry);
    // Same id, different key: every attestation from it is forged
    let impostor = TestDevice::new("unit-ghost");

    let now = current_time_ns();
    let policy = t.mesh.policy().clone();
    for seq in 1..=policy.min_observations {
        let honest_report = t
            .pipeline
            .ingest(
                &TelemetryFrame {
                    sequence_id: seq,
                    status: honest.attested_status(now),
                },
                now,
            )
            .unwrap();
        assert_eq!(honest_report.assessment.level, TrustLevel::High);

        let ghost_report = t
            .pipeline
            .ingest(
                &TelemetryFrame {
                    sequence_id: seq,
                    status: impostor.attested_status(now),
                },
                now,
            )
            .unwrap();
        assert_eq!(ghost_report.assessment.level, TrustLevel::Spoofed);
    }

    assert!(t.mesh.is_quarantined("unit-ghost"));
    assert!(!t.mesh.is_quarantined("unit-honest"));
    assert!(t.tracker.is_stream_compromised("unit-ghost"));

    let decision: QuarantineRecord =
        serde_json::from_slice(&t.recorder.get_payload(QUARANTINE_CHAIN, 0).unwrap()).unwrap();
    assert_eq!(decision.peer_id, "unit-ghost");
    assert_eq!(decision.action, QuarantineAction::Quarantined);
    assert!(decision.aggregate_trust < policy.quarantine_threshold);

    let refused = t
        .router
        .submit(sign_command(self_test("cmd-ghost", "unit-ghost"), &[&operator]))
        .await
        .unwrap();
    assert!(matches!(
        refused.result_for("unit-ghost"),
        Some(UnitDispatchResult::Refused { .. })
    ));
    assert!(t.transport.delivered("unit-ghost").is_empty());

    let served = t
        .router
        .submit(sign_command(self_test("cmd-honest", "unit-honest"), &[&operator]))
        .await
        .unwrap();
    assert!(served.all_success());
}

#[tokio::test]
async fn test_forging_signer_is_quarantined() {
    let t = theatre();
    let insider = TestDevice::new("operator-2");
    insider.register(&t.registry);
    let stolen_id = TestDevice::new("operator-2");

    let min = t.mesh.policy().min_observations;
    for i in 0..min {
        let signed = sign_command(self_test(&format!("cmd-forged-{i}"), "unit-001"), &[&stolen_id]);
        assert!(t.router.submit(signed).await.is_err());
    }
    assert!(t.mesh.is_quarantined("operator-2"));
    assert_eq!(t.recorder.len("unit/unit-001"), 0);
    assert!(t.transport.delivered("unit-001").is_empty());

    // The quarantined identity cannot authorize even with its genuine key
    let genuine = sign_command(self_test("cmd-insider", "unit-001"), &[&insider]);
    assert!(matches!(
        t.router.submit(genuine).await,
        Err(RouterError::Quorum(QuorumError::QuorumNotMet { required: 1, actual: 0, .. }))
    ));
    assert!(t.transport.delivered("unit-001").is_empty());

    // Other operators are unaffected
    let operator = TestDevice::new("operator-1");
    operator.register(&t.registry);
    let served = t
        .router
        .submit(sign_command(self_test("cmd-operator", "unit-001"), &[&operator]))
        .await
        .unwrap();
    assert!(served.all_success());
}

#[tokio::test]
async fn test_release_requires_designated_quorum() {
    let t = theatre();
    let operator = TestDevice::new("operator-1");
    let authority_1 = TestDevice::new("authority-1");
    let authority_2 = TestDevice::new("authority-2");
    for d in [&operator, &authority_1, &authority_2] {
        d.register(&t.registry);
    }

    let ghost = TestDevice::new("unit-ghost");
    ghost.register(&t.registry);
    let impostor = TestDevice::new("unit-ghost");
    let now = current_time_ns();
    for seq in 1..=t.mesh.policy().min_observations {
        t.pipeline
            .ingest(
                &TelemetryFrame {
                    sequence_id: seq,
                    status: impostor.attested_status(now),
                },
                now,
            )
            .unwrap();
    }
    assert!(t.mesh.is_quarantined("unit-ghost"));

    // One designated authority plus an operator outside the release list is not enough
    assert!(matches!(
        t.mesh.release(&release(&t.mesh, "unit-ghost", &[&authority_1, &operator])),
        Err(MeshError::ReleaseQuorumNotMet {
            required: 2,
            actual: 1
        })
    ));
    assert!(t.mesh.is_quarantined("unit-ghost"));

    t.mesh
        .release(&release(&t.mesh, "unit-ghost", &[&authority_1, &authority_2]))
        .unwrap();
    assert!(!t.mesh.is_quarantined("unit-ghost"));
    assert_eq!(t.recorder.len(QUARANTINE_CHAIN), 2);
    let released: QuarantineRecord =
        serde_json::from_slice(&t.recorder.get_payload(QUARANTINE_CHAIN, 1).unwrap()).unwrap();
    assert_eq!(released.action, QuarantineAction::Released);

    // The stream flag is an independent operator decision
    t.tracker.reset_stream("unit-ghost");
    let report = t
        .router
        .submit(sign_command(self_test("cmd-readmit", "unit-ghost"), &[&operator]))
        .await
        .unwrap();
    assert!(report.all_success());
    assert_eq!(t.transport.delivered("unit-ghost"), vec!["cmd-readmit".to_string()]);
}
