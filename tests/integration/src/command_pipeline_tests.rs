//! Command submission end to end: signatures, quorum, fan-out, audit.

use crate::test_utils::*;
use aethercore_c2_router::ledger::{read_command_record, read_dispatch_record};
use aethercore_c2_router::{
    Command, Coordinate, DispatchStatus, QuorumError, ReplayError, RouterError, SwarmCommand,
    UnitCommand, UnitDispatchResult,
};
use aethercore_core::{current_time_ns, EntryKind, MemoryLog, NodeConfig, TruthChainRecorder};
use std::sync::Arc;

fn node(transport: Arc<FieldTransport>) -> TestNode {
    TestNode::new(&NodeConfig::default(), Arc::new(MemoryLog::new()), transport)
}

fn navigate() -> UnitCommand {
    UnitCommand::Navigate {
        waypoint: Coordinate {
            lat: 45.0,
            lon: -122.0,
            alt: Some(100.0),
        },
        speed: Some(10.0),
        altitude: Some(100.0),
    }
}

fn squad(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("unit-{i:03}")).collect()
}

#[tokio::test]
async fn test_single_unit_command_is_audited_and_provable() {
    let transport = FieldTransport::with_unreachable(&[]);
    let node = node(Arc::clone(&transport));
    let operator = TestDevice::new("operator-1");
    operator.register(&node.registry);

    let command = Command::unit("cmd-nav-1", "unit-001", navigate(), current_time_ns());
    let report = node
        .router
        .submit(sign_command(command.clone(), &[&operator]))
        .await
        .unwrap();

    assert_eq!(report.status, DispatchStatus::Success);
    assert_eq!(transport.delivered("unit-001"), vec!["cmd-nav-1".to_string()]);

    let chain = "unit/unit-001";
    assert_eq!(node.recorder.len(chain), 2);
    node.recorder.verify_full(chain).unwrap();

    let accepted = read_command_record(&node.recorder, chain, report.accepted_index).unwrap();
    assert_eq!(accepted.command, command);
    assert_eq!(accepted.command_hash, hex::encode(command.command_hash().unwrap()));
    assert_eq!(accepted.authority_signers, vec!["operator-1".to_string()]);

    let outcome = read_dispatch_record(&node.recorder, chain, report.result_index.unwrap()).unwrap();
    assert_eq!(outcome.accepted_index, report.accepted_index);
    assert_eq!(outcome.status, DispatchStatus::Success);

    let root = node.recorder.chain_root(chain).unwrap();
    let proof = node.recorder.generate_proof(chain, 0).unwrap();
    assert_eq!(proof.entry.kind, EntryKind::CommandAccepted);
    assert!(TruthChainRecorder::verify_proof(&proof, &root));
}

#[tokio::test]
async fn test_large_swarm_needs_two_authorities() {
    let transport = FieldTransport::with_unreachable(&[]);
    let node = node(Arc::clone(&transport));
    let operator = TestDevice::new("operator-1");
    let coalition = TestDevice::new("coalition-1");
    operator.register(&node.registry);
    coalition.register(&node.registry);

    let command = Command::swarm(
        "cmd-recall-1",
        "alpha",
        squad(6),
        SwarmCommand::RecallAll {
            base_id: "BASE-001".to_string(),
        },
        current_time_ns(),
    );

    let rejected = node.router.submit(sign_command(command.clone(), &[&operator])).await;
    assert!(matches!(
        rejected,
        Err(RouterError::Quorum(QuorumError::QuorumNotMet { required: 2, actual: 1, .. }))
    ));
    assert!(transport.delivered("unit-001").is_empty());
    assert_eq!(node.recorder.len("swarm/alpha"), 0);

    let report = node
        .router
        .submit(sign_command(command, &[&operator, &coalition]))
        .await
        .unwrap();
    assert_eq!(report.success_count(), 6);
    assert_eq!(node.recorder.len("swarm/alpha"), 2);
}

#[tokio::test]
async fn test_critical_command_and_revoked_signer() {
    let node = node(FieldTransport::with_unreachable(&[]));
    let operator = TestDevice::new("operator-1");
    let coalition = TestDevice::new("coalition-1");
    operator.register(&node.registry);
    coalition.register(&node.registry);

    let reboot = Command::unit(
        "cmd-reboot-1",
        "unit-001",
        UnitCommand::Reboot { delay_secs: 5 },
        current_time_ns(),
    );
    assert!(node
        .router
        .submit(sign_command(reboot.clone(), &[&operator, &coalition]))
        .await
        .is_ok());

    // A revoked co-signer no longer counts toward the quorum
    node.registry.revoke("coalition-1", "key compromised").unwrap();
    let again = Command {
        command_id: "cmd-reboot-2".to_string(),
        ..reboot
    };
    assert!(matches!(
        node.router.submit(sign_command(again, &[&operator, &coalition])).await,
        Err(RouterError::Quorum(QuorumError::QuorumNotMet { required: 2, actual: 1, .. }))
    ));
}

#[tokio::test]
async fn test_emergency_stop_single_signature() {
    let transport = FieldTransport::with_unreachable(&[]);
    let node = node(Arc::clone(&transport));
    let operator = TestDevice::new("operator-1");
    operator.register(&node.registry);

    let abort = Command::swarm(
        "cmd-abort-1",
        "bravo",
        squad(40),
        SwarmCommand::AbortAll {
            reason: "airspace closed".to_string(),
        },
        current_time_ns(),
    );
    let report = node.router.submit(sign_command(abort, &[&operator])).await.unwrap();
    assert!(report.all_success());
    assert_eq!(transport.delivered("unit-040"), vec!["cmd-abort-1".to_string()]);
}

#[tokio::test]
async fn test_unreachable_unit_reported_as_partial_failure() {
    let transport = FieldTransport::with_unreachable(&["unit-002"]);
    let node = node(Arc::clone(&transport));
    let operator = TestDevice::new("operator-1");
    let coalition = TestDevice::new("coalition-1");
    operator.register(&node.registry);
    coalition.register(&node.registry);

    let scan = Command::swarm(
        "cmd-selftest-1",
        "charlie",
        squad(3),
        SwarmCommand::SyncExecute {
            action: UnitCommand::SelfTest,
            sync_time_ns: 0,
        },
        current_time_ns(),
    );
    let report = node
        .router
        .submit(sign_command(scan, &[&operator, &coalition]))
        .await
        .unwrap();

    assert_eq!(
        report.status,
        DispatchStatus::PartialFailure {
            failed: vec!["unit-002".to_string()],
        }
    );
    let config = NodeConfig::default();
    assert!(matches!(
        report.result_for("unit-002"),
        Some(UnitDispatchResult::Failed { attempts, .. }) if *attempts == config.dispatch.max_retries + 1
    ));

    let stored = read_dispatch_record(&node.recorder, "swarm/charlie", 1).unwrap();
    assert_eq!(stored.status, report.status);
}

#[tokio::test]
async fn test_json_submission_uses_canonical_bytes() {
    let node = node(FieldTransport::with_unreachable(&[]));
    let operator = TestDevice::new("operator-1");
    operator.register(&node.registry);

    // The signature covers the canonical bytes, so a JSON hop does not disturb it
    let signed = sign_command(
        Command::unit("cmd-json-1", "unit-001", navigate(), current_time_ns()),
        &[&operator],
    );
    let pretty = serde_json::to_vec_pretty(&signed).unwrap();
    assert!(node.router.submit_json(&pretty).await.is_ok());

    // Editing the body after signing invalidates the signature
    let fresh = sign_command(
        Command::unit("cmd-json-2", "unit-001", navigate(), current_time_ns()),
        &[&operator],
    );
    let mut value = serde_json::to_value(&fresh).unwrap();
    value["command"]["body"]["Unit"]["target_unit_id"] = serde_json::json!("unit-666");
    let tampered = serde_json::to_vec(&value).unwrap();
    assert!(matches!(
        node.router.submit_json(&tampered).await,
        Err(RouterError::Quorum(QuorumError::QuorumNotMet { actual: 0, .. }))
    ));
    assert_eq!(node.recorder.len("unit/unit-666"), 0);
}

#[tokio::test]
async fn test_captured_command_cannot_be_replayed() {
    let transport = FieldTransport::with_unreachable(&[]);
    let node = node(Arc::clone(&transport));
    let operator = TestDevice::new("operator-1");
    operator.register(&node.registry);

    let signed = sign_command(
        Command::unit("cmd-nav-9", "unit-001", navigate(), current_time_ns()),
        &[&operator],
    );
    let captured = serde_json::to_vec(&signed).unwrap();

    assert!(node.router.submit_json(&captured).await.is_ok());
    assert!(matches!(
        node.router.submit_json(&captured).await,
        Err(RouterError::Replay(ReplayError::Duplicate(_)))
    ));
    assert_eq!(transport.delivered("unit-001"), vec!["cmd-nav-9".to_string()]);
    assert_eq!(node.recorder.len("unit/unit-001"), 2);
}
