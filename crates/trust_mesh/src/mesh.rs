//! Byzantine quarantine over weighted trust votes.

use crate::error::MeshError;
use crate::release::{release_message, ReleaseAuthorization};
use crate::trust::{Observation, WeightedTrust};
use aethercore_core::{current_time_ns, ByzantinePolicy, EntryKind, Hash, TruthChainRecorder};
use aethercore_identity::IdentityRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// Chain receiving every quarantine decision
pub const QUARANTINE_CHAIN: &str = "quarantine";

/// Direction of a quarantine transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuarantineAction {
    /// Peer isolated
    Quarantined,
    /// Peer re-admitted by authorized release
    Released,
}

/// Payload of a quarantine-decision ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    /// Peer concerned
    pub peer_id: String,
    /// Transition
    pub action: QuarantineAction,
    /// Aggregated trust at decision time
    pub aggregate_trust: f64,
    /// Observations folded in at decision time
    pub observations: u64,
    /// Threshold in force
    pub threshold: f64,
    /// Authorities whose signatures lifted the quarantine (release only)
    pub authorities: Vec<String>,
    /// Decision time (nanoseconds since epoch)
    pub timestamp_ns: u64,
}

/// Snapshot of a peer's standing
#[derive(Debug, Clone, PartialEq)]
pub struct PeerStatus {
    /// Peer identifier
    pub peer_id: String,
    /// Aggregated weighted trust
    pub aggregate_trust: f64,
    /// Observations folded in
    pub observations: u64,
    /// Whether the peer is quarantined
    pub quarantined: bool,
    /// Whether this observation triggered the quarantine
    pub newly_quarantined: bool,
}

#[derive(Debug, Clone)]
struct Quarantine {
    epoch: u64,
    entry_hash: Option<Hash>,
}

#[derive(Debug)]
struct PeerRecord {
    trust: WeightedTrust,
    quarantine: Option<Quarantine>,
    /// Quarantines so far; survives releases
    epochs: u64,
}

/// Trust mesh: per-peer weighted votes and one-way quarantine
pub struct TrustMesh {
    policy: ByzantinePolicy,
    recorder: Arc<TruthChainRecorder>,
    registry: Arc<IdentityRegistry>,
    peers: RwLock<HashMap<String, PeerRecord>>,
}

impl TrustMesh {
    /// Create a mesh recording decisions into `recorder` and checking release
    /// signatures against `registry`
    pub fn new(
        policy: ByzantinePolicy,
        recorder: Arc<TruthChainRecorder>,
        registry: Arc<IdentityRegistry>,
    ) -> Self {
        Self {
            policy,
            recorder,
            registry,
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Policy in force
    pub fn policy(&self) -> &ByzantinePolicy {
        &self.policy
    }

    /// Fold an observation into a peer's vote and quarantine on crossing.
    ///
    /// If the quarantine decision cannot be appended to the ledger the peer
    /// stays quarantined and [`MeshError::AuditUnavailable`] is returned.
    pub fn observe(&self, peer_id: &str, observation: Observation) -> Result<PeerStatus, MeshError> {
        let mut peers = self.peers.write().map_err(|_| MeshError::Poisoned)?;
        let record = peers.entry(peer_id.to_string()).or_insert_with(|| PeerRecord {
            trust: WeightedTrust::new(&self.policy),
            quarantine: None,
            epochs: 0,
        });
        record.trust.record(&observation, &self.policy);

        let aggregate_trust = record.trust.aggregate();
        let observations = record.trust.observations();
        debug!(
            peer_id = %peer_id,
            observation = ?observation,
            aggregate_trust,
            observations,
            "Trust vote recorded"
        );

        let crossing = record.quarantine.is_none()
            && observations >= self.policy.min_observations
            && aggregate_trust < self.policy.quarantine_threshold;

        let mut status = PeerStatus {
            peer_id: peer_id.to_string(),
            aggregate_trust,
            observations,
            quarantined: record.quarantine.is_some(),
            newly_quarantined: false,
        };
        if !crossing {
            return Ok(status);
        }

        // Isolation takes effect before the audit write
        record.epochs += 1;
        let epoch = record.epochs;
        record.quarantine = Some(Quarantine {
            epoch,
            entry_hash: None,
        });
        status.quarantined = true;
        status.newly_quarantined = true;
        warn!(
            peer_id = %peer_id,
            aggregate_trust,
            threshold = self.policy.quarantine_threshold,
            "Byzantine threshold crossed, peer quarantined"
        );

        let decision = QuarantineRecord {
            peer_id: peer_id.to_string(),
            action: QuarantineAction::Quarantined,
            aggregate_trust,
            observations,
            threshold: self.policy.quarantine_threshold,
            authorities: Vec::new(),
            timestamp_ns: current_time_ns(),
        };

        match self.record_decision(&decision) {
            Ok(entry_hash) => {
                record.quarantine = Some(Quarantine {
                    epoch,
                    entry_hash: Some(entry_hash),
                });
                Ok(status)
            }
            Err(source) => {
                error!(peer_id = %peer_id, epoch, error = %source, "Quarantine decision not recorded");
                Err(MeshError::AuditUnavailable {
                    peer_id: peer_id.to_string(),
                    source,
                })
            }
        }
    }

    fn record_decision(&self, decision: &QuarantineRecord) -> Result<Hash, aethercore_core::LedgerError> {
        let payload = serde_json::to_vec(decision)
            .map_err(|e| aethercore_core::LedgerError::Serialization(e.to_string()))?;
        let entry = self
            .recorder
            .append(QUARANTINE_CHAIN, &payload, EntryKind::QuarantineDecision)?;
        Ok(entry.entry_hash)
    }

    /// Lift a quarantine with a quorum of release-authority signatures.
    ///
    /// Signatures count once per authority, only for ids listed in the
    /// policy, and only if they verify over the canonical release message.
    /// The release is recorded before the peer is re-admitted; its vote
    /// restarts from the prior.
    pub fn release(&self, authorization: &ReleaseAuthorization) -> Result<(), MeshError> {
        let peer_id = authorization.peer_id.as_str();
        let mut peers = self.peers.write().map_err(|_| MeshError::Poisoned)?;
        let record = peers
            .get_mut(peer_id)
            .filter(|r| r.quarantine.is_some())
            .ok_or_else(|| MeshError::NotQuarantined {
                peer_id: peer_id.to_string(),
            })?;

        let (epoch, entry_hash) = match &record.quarantine {
            Some(q) => (q.epoch, q.entry_hash),
            None => (record.epochs, None),
        };
        let message = release_message(peer_id, authorization.issued_at_ns, epoch, entry_hash.as_ref());

        let designated: HashSet<&str> = self
            .policy
            .release_authorities
            .iter()
            .map(String::as_str)
            .collect();
        let mut approved: Vec<String> = Vec::new();
        for sig in &authorization.signatures {
            let id = sig.authority_id.as_str();
            if !designated.contains(id) || approved.iter().any(|a| a == id) {
                continue;
            }
            match self.registry.verify_signature(id, &message, &sig.signature) {
                Ok(()) => approved.push(id.to_string()),
                Err(e) => warn!(peer_id = %peer_id, authority_id = %id, error = %e, "Release signature rejected"),
            }
        }

        if approved.len() < self.policy.release_quorum {
            warn!(
                peer_id = %peer_id,
                required = self.policy.release_quorum,
                actual = approved.len(),
                "Quarantine release refused"
            );
            return Err(MeshError::ReleaseQuorumNotMet {
                required: self.policy.release_quorum,
                actual: approved.len(),
            });
        }

        let decision = QuarantineRecord {
            peer_id: peer_id.to_string(),
            action: QuarantineAction::Released,
            aggregate_trust: record.trust.aggregate(),
            observations: record.trust.observations(),
            threshold: self.policy.quarantine_threshold,
            authorities: approved.clone(),
            timestamp_ns: current_time_ns(),
        };
        self.record_decision(&decision)?;

        record.quarantine = None;
        record.trust = WeightedTrust::new(&self.policy);
        info!(peer_id = %peer_id, authorities = ?approved, "Peer released from quarantine");
        Ok(())
    }

    /// Whether a peer is quarantined
    pub fn is_quarantined(&self, peer_id: &str) -> bool {
        self.peers
            .read()
            .map(|p| p.get(peer_id).map(|r| r.quarantine.is_some()).unwrap_or(false))
            // A poisoned mesh cannot vouch for anyone
            .unwrap_or(true)
    }

    /// Aggregated trust of a peer; unknown peers sit at the prior
    pub fn aggregate_trust(&self, peer_id: &str) -> f64 {
        self.peers
            .read()
            .ok()
            .and_then(|p| p.get(peer_id).map(|r| r.trust.aggregate()))
            .unwrap_or_else(|| WeightedTrust::new(&self.policy).aggregate())
    }

    /// Hash of the ledger entry that quarantined a peer
    pub fn quarantine_entry(&self, peer_id: &str) -> Option<Hash> {
        self.peers
            .read()
            .ok()?
            .get(peer_id)?
            .quarantine
            .as_ref()?
            .entry_hash
    }

    /// Quarantine epoch of a quarantined peer, to be bound into its release
    pub fn quarantine_epoch(&self, peer_id: &str) -> Option<u64> {
        Some(self.peers.read().ok()?.get(peer_id)?.quarantine.as_ref()?.epoch)
    }

    /// All quarantined peers, sorted
    pub fn quarantined_peers(&self) -> Vec<String> {
        let Ok(peers) = self.peers.read() else {
            return Vec::new();
        };
        let mut ids: Vec<String> = peers
            .iter()
            .filter(|(_, r)| r.quarantine.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
