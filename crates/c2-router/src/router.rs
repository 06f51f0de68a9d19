//! Command intake: chain health, freshness, quorum, fan-out, audit.

use crate::command_types::SignedCommand;
use crate::dispatcher::{CommandDispatcher, DispatchError, DispatchReport, UnitTransport};
use crate::quorum::{QuorumError, QuorumGate};
use crate::authority::{AuthorityVerifier, SignatureTally};
use crate::replay::{CommandReplayGuard, ReplayError};
use aethercore_core::{current_time_ns, ChainHealth, NodeConfig, ReplaySettings, TruthChainRecorder};
use aethercore_identity::IdentityRegistry;
use aethercore_stream::StreamIntegrityTracker;
use aethercore_trust_mesh::{Observation, TrustMesh};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Router errors
#[derive(Debug, Error)]
pub enum RouterError {
    /// Submitted bytes are not a signed command
    #[error("Malformed command: {0}")]
    Malformed(String),

    /// The command's audit chain failed verification; commands on it are halted
    #[error("Audit chain {chain_id} compromised at index {at_index}")]
    ChainCompromised {
        /// Audit chain
        chain_id: String,
        /// First broken entry
        at_index: u64,
    },

    /// Stale, future-dated or replayed command; nothing was dispatched
    #[error(transparent)]
    Replay(#[from] ReplayError),

    /// Quorum gate rejected the command; nothing was dispatched
    #[error(transparent)]
    Quorum(#[from] QuorumError),

    /// Dispatch failed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// C2 command router
pub struct C2Router {
    node_id: String,
    gate: QuorumGate,
    replay: CommandReplayGuard,
    dispatcher: CommandDispatcher,
    recorder: Arc<TruthChainRecorder>,
    mesh: Option<Arc<TrustMesh>>,
}

impl C2Router {
    /// Create a router from its parts
    pub fn new(
        node_id: &str,
        gate: QuorumGate,
        dispatcher: CommandDispatcher,
        recorder: Arc<TruthChainRecorder>,
    ) -> Self {
        Self {
            node_id: node_id.to_string(),
            gate,
            replay: CommandReplayGuard::default(),
            dispatcher,
            recorder,
            mesh: None,
        }
    }

    /// Build a router, its trust mesh and its dispatcher from node configuration.
    ///
    /// The mesh shares `registry` and `recorder`; the gate ignores and the
    /// dispatcher refuses peers the mesh quarantines.
    pub fn from_config(
        config: &NodeConfig,
        registry: Arc<IdentityRegistry>,
        recorder: Arc<TruthChainRecorder>,
        transport: Arc<dyn UnitTransport>,
    ) -> Self {
        let mesh = Arc::new(TrustMesh::new(
            config.byzantine.clone(),
            Arc::clone(&recorder),
            Arc::clone(&registry),
        ));
        let gate = QuorumGate::new(AuthorityVerifier::new(registry));
        let dispatcher = CommandDispatcher::new(config.dispatch.clone(), transport, Arc::clone(&recorder))
            .with_trust_mesh(Arc::clone(&mesh));
        Self::new(&config.node_id, gate, dispatcher, recorder)
            .with_replay_settings(config.replay.clone())
            .with_trust_mesh(mesh)
    }

    /// Report signature failures to `mesh` and stop counting signers it quarantines
    pub fn with_trust_mesh(mut self, mesh: Arc<TrustMesh>) -> Self {
        self.gate = self.gate.with_trust_mesh(Arc::clone(&mesh));
        self.mesh = Some(mesh);
        self
    }

    /// Replace the command freshness window
    pub fn with_replay_settings(mut self, settings: ReplaySettings) -> Self {
        self.replay = CommandReplayGuard::new(settings);
        self
    }

    /// Refuse dispatch to units whose telemetry stream is compromised
    pub fn with_integrity_tracker(mut self, tracker: Arc<StreamIntegrityTracker>) -> Self {
        self.dispatcher = self.dispatcher.with_integrity_tracker(tracker);
        self
    }

    /// Trust mesh, if attached
    pub fn trust_mesh(&self) -> Option<&Arc<TrustMesh>> {
        self.mesh.as_ref()
    }

    /// Quorum gate
    pub fn gate(&self) -> &QuorumGate {
        &self.gate
    }

    /// Audit ledger
    pub fn recorder(&self) -> &Arc<TruthChainRecorder> {
        &self.recorder
    }

    /// Decode and submit a JSON `SignedCommand`
    pub async fn submit_json(&self, bytes: &[u8]) -> Result<DispatchReport, RouterError> {
        let signed: SignedCommand = serde_json::from_slice(bytes).map_err(|e| {
            self.audit_log("COMMAND_REJECTED", "None", "None", &format!("Malformed: {e}"));
            RouterError::Malformed(e.to_string())
        })?;
        self.submit(signed).await
    }

    /// Authorize and dispatch a signed command.
    ///
    /// A command id is remembered once it passes the gate, so resubmitting the
    /// same command is rejected even if its first dispatch failed.
    pub async fn submit(&self, signed: SignedCommand) -> Result<DispatchReport, RouterError> {
        let command = &signed.command;
        let chain_id = command.audit_chain();
        let operator = signed
            .signatures
            .iter()
            .next()
            .map_or("None", |s| s.identity_id.as_str());

        if let ChainHealth::Compromised { at_index } = self.recorder.chain_health(&chain_id) {
            self.audit_log(
                "COMMAND_HALTED",
                operator,
                &chain_id,
                &format!("Chain compromised at index {at_index}"),
            );
            return Err(RouterError::ChainCompromised { chain_id, at_index });
        }

        if let Err(e) = self.replay.check(command, current_time_ns()) {
            self.audit_log("REPLAY_REJECTED", operator, &chain_id, &e.to_string());
            return Err(e.into());
        }

        let (result, tally) = self.gate.check_with_tally(&signed);
        self.report_signature_failures(&tally);
        let authorized = match result {
            Ok(authorized) => authorized,
            Err(e) => {
                self.audit_log("QUORUM_REJECTED", operator, &chain_id, &e.to_string());
                return Err(e.into());
            }
        };

        if let Err(e) = self.replay.commit(command, current_time_ns()) {
            self.audit_log("REPLAY_REJECTED", operator, &chain_id, &e.to_string());
            return Err(e.into());
        }
        self.audit_log(
            "COMMAND_AUTHORIZED",
            operator,
            &chain_id,
            authorized.scope().operation_name(),
        );

        match self.dispatcher.dispatch(&authorized).await {
            Ok(report) => {
                self.audit_log(
                    "COMMAND_DISPATCHED",
                    operator,
                    &chain_id,
                    &format!("{}/{} acknowledged", report.success_count(), report.results.len()),
                );
                Ok(report)
            }
            Err(e) => {
                self.audit_log("DISPATCH_FAILED", operator, &chain_id, &e.to_string());
                Err(e.into())
            }
        }
    }

    /// Signal in-flight fan-outs for `swarm_id` to stop
    pub fn abort_swarm(&self, swarm_id: &str) -> usize {
        let signalled = self.dispatcher.abort_swarm(swarm_id);
        self.audit_log(
            "SWARM_ABORT",
            "None",
            &format!("swarm/{swarm_id}"),
            &format!("{signalled} fan-outs signalled"),
        );
        signalled
    }

    fn report_signature_failures(&self, tally: &SignatureTally) {
        let Some(mesh) = &self.mesh else {
            return;
        };
        for identity_id in tally.signature_failures() {
            match mesh.observe(identity_id, Observation::SignatureFailure) {
                Ok(status) if status.newly_quarantined => {
                    warn!(identity_id = %identity_id, "Signer quarantined after signature failures")
                }
                Ok(_) => {}
                Err(e) => warn!(identity_id = %identity_id, error = %e, "Signature failure not recorded"),
            }
        }
    }

    fn audit_log(&self, action: &str, operator: &str, target: &str, result: &str) {
        info!(
            node_id = %self.node_id,
            "[AUDIT] Action={} Operator={} Target={} Result={}",
            action, operator, target, result
        );
    }
}
