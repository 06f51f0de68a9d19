//! Quorum gate for authority threshold enforcement
//!
//! Required signature counts depend on command scope, criticality and
//! target count. The table is a fixed contract:
//!
//! | scope | criticality | swarm size | required |
//! |---|---|---|---|
//! | single unit | non-critical | - | 1 |
//! | single unit | critical | - | 2 |
//! | swarm | any | <5 | 2 |
//! | swarm | any | >=5 | 2 |
//! | emergency-stop | - | - | 1 |
//!
//! [`AuthorizedCommand`] can only be produced by [`QuorumGate::check`].
//! Signers the attached [`TrustMesh`] has quarantined never count.

#![warn(missing_docs)]

use crate::authority::{AuthorityVerifier, SignatureTally};
use crate::command_types::{Command, CommandBody, SignedCommand};
use aethercore_trust_mesh::TrustMesh;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Swarm size at which the large-swarm tier applies
pub const SWARM_LARGE_THRESHOLD: usize = 5;

/// Quorum gate errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuorumError {
    /// Not enough distinct valid signatures
    #[error("Quorum not met for {operation}: got {actual}, required {required}")]
    QuorumNotMet {
        /// Number of signatures required
        required: usize,
        /// Number of valid signatures counted
        actual: usize,
        /// Operation being authorized
        operation: String,
    },

    /// Command could not be canonically encoded
    #[error("Command encoding failed: {0}")]
    Encoding(String),
}

/// What a command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuorumScope {
    /// One unit
    SingleUnit,
    /// A swarm of units
    Swarm,
    /// EmergencyStop or AbortAll
    EmergencyStop,
}

/// Effective command criticality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Criticality {
    /// Routine operation
    Normal,
    /// Reboot, configuration change, or operator-escalated command
    Critical,
}

/// Authority tier a command falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandScope {
    /// Single unit, non-critical operation
    SingleUnitNormal,
    /// Single unit, critical operation (reboot, config)
    SingleUnitCritical,
    /// Swarm command, less than 5 units
    SwarmSmall,
    /// Swarm command, 5 or more units
    SwarmLarge,
    /// Emergency stop (immediate)
    Emergency,
}

impl CommandScope {
    /// Tier for a scope, criticality and target count
    pub fn classify(scope: QuorumScope, criticality: Criticality, target_count: usize) -> Self {
        match (scope, criticality) {
            (QuorumScope::EmergencyStop, _) => CommandScope::Emergency,
            (QuorumScope::SingleUnit, Criticality::Normal) => CommandScope::SingleUnitNormal,
            (QuorumScope::SingleUnit, Criticality::Critical) => CommandScope::SingleUnitCritical,
            (QuorumScope::Swarm, _) if target_count >= SWARM_LARGE_THRESHOLD => {
                CommandScope::SwarmLarge
            }
            (QuorumScope::Swarm, _) => CommandScope::SwarmSmall,
        }
    }

    /// Tier of a command envelope
    pub fn of(command: &Command) -> Self {
        let scope = if command.is_emergency() {
            QuorumScope::EmergencyStop
        } else {
            match command.body {
                CommandBody::Unit { .. } => QuorumScope::SingleUnit,
                CommandBody::Swarm { .. } => QuorumScope::Swarm,
            }
        };
        let criticality = if command.is_critical() {
            Criticality::Critical
        } else {
            Criticality::Normal
        };
        Self::classify(scope, criticality, command.target_count())
    }

    /// Get required number of signatures for this scope
    pub fn required_signatures(&self) -> usize {
        match self {
            CommandScope::SingleUnitNormal => 1,
            CommandScope::SingleUnitCritical => 2,
            CommandScope::SwarmSmall => 2,
            CommandScope::SwarmLarge => 2, // 2-of-3 quorum
            CommandScope::Emergency => 1,
        }
    }

    /// Get operation description for error messages
    pub fn operation_name(&self) -> &'static str {
        match self {
            CommandScope::SingleUnitNormal => "single unit (normal)",
            CommandScope::SingleUnitCritical => "single unit (critical)",
            CommandScope::SwarmSmall => "swarm (<5 units)",
            CommandScope::SwarmLarge => "swarm (>=5 units)",
            CommandScope::Emergency => "emergency stop",
        }
    }
}

/// Required signature count for a scope, criticality and target count
pub fn required_signatures(scope: QuorumScope, criticality: Criticality, target_count: usize) -> usize {
    CommandScope::classify(scope, criticality, target_count).required_signatures()
}

/// A command that passed the quorum gate
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizedCommand {
    command: Command,
    scope: CommandScope,
    signers: Vec<String>,
    command_hash: [u8; 32],
}

impl AuthorizedCommand {
    pub(crate) fn new(
        command: Command,
        scope: CommandScope,
        signers: Vec<String>,
        command_hash: [u8; 32],
    ) -> Self {
        Self {
            command,
            scope,
            signers,
            command_hash,
        }
    }

    /// The authorized command
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Tier it was authorized under
    pub fn scope(&self) -> CommandScope {
        self.scope
    }

    /// Identities whose signatures counted
    pub fn signers(&self) -> &[String] {
        &self.signers
    }

    /// BLAKE3 hash of the canonical command bytes
    pub fn command_hash(&self) -> &[u8; 32] {
        &self.command_hash
    }
}

/// Quorum gate for authority verification
pub struct QuorumGate {
    verifier: AuthorityVerifier,
    /// Per-tier allow-lists; tiers without an entry accept any registered identity
    signer_policy: HashMap<CommandScope, HashSet<String>>,
    mesh: Option<Arc<TrustMesh>>,
}

impl std::fmt::Debug for QuorumGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuorumGate")
            .field("verifier", &self.verifier)
            .field("signer_policy", &self.signer_policy)
            .field("trust_mesh", &self.mesh.is_some())
            .finish()
    }
}

impl QuorumGate {
    /// Create a new quorum gate
    pub fn new(verifier: AuthorityVerifier) -> Self {
        Self {
            verifier,
            signer_policy: HashMap::new(),
            mesh: None,
        }
    }

    /// Exclude signers quarantined by `mesh` from every quorum
    pub fn with_trust_mesh(mut self, mesh: Arc<TrustMesh>) -> Self {
        self.mesh = Some(mesh);
        self
    }

    /// Restrict which identities count toward quorum for `scope`
    pub fn with_signer_policy<I, S>(mut self, scope: CommandScope, identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signer_policy
            .insert(scope, identities.into_iter().map(Into::into).collect());
        self
    }

    /// Authority verifier
    pub fn verifier(&self) -> &AuthorityVerifier {
        &self.verifier
    }

    /// Check quorum for a signed command
    pub fn check(&self, signed: &SignedCommand) -> Result<AuthorizedCommand, QuorumError> {
        self.check_with_tally(signed).0
    }

    /// Check quorum and also return the signature tally
    pub fn check_with_tally(
        &self,
        signed: &SignedCommand,
    ) -> (Result<AuthorizedCommand, QuorumError>, SignatureTally) {
        let command = &signed.command;
        let scope = CommandScope::of(command);
        let required = scope.required_signatures();

        let bytes = match command.canonical_bytes() {
            Ok(bytes) => bytes,
            Err(e) => return (Err(QuorumError::Encoding(e.to_string())), SignatureTally::default()),
        };
        let tally = self.verifier.tally(&bytes, &signed.signatures);

        let allowed = self.signer_policy.get(&scope);
        let signers: Vec<String> = tally
            .accepted
            .iter()
            .filter(|id| allowed.map_or(true, |a| a.contains(id.as_str())))
            .filter(|id| match &self.mesh {
                Some(mesh) if mesh.is_quarantined(id) => {
                    tracing::warn!(
                        command_id = %command.command_id,
                        identity_id = %id,
                        "Quarantined signer excluded from quorum"
                    );
                    false
                }
                _ => true,
            })
            .cloned()
            .collect();

        if signers.len() < required {
            tracing::warn!(
                command_id = %command.command_id,
                operation = scope.operation_name(),
                required,
                actual = signers.len(),
                "Quorum not met"
            );
            let err = QuorumError::QuorumNotMet {
                required,
                actual: signers.len(),
                operation: scope.operation_name().to_string(),
            };
            return (Err(err), tally);
        }

        let hash = *blake3::hash(&bytes).as_bytes();
        tracing::debug!(
            command_id = %command.command_id,
            operation = scope.operation_name(),
            signers = signers.len(),
            "Quorum met"
        );
        (
            Ok(AuthorizedCommand::new(command.clone(), scope, signers, hash)),
            tally,
        )
    }
}
