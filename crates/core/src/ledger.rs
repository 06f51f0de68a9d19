//! Truth-Chain recorder: tamper-evident, append-only audit chains.
//!
//! Every accepted command, every command outcome and every quarantine
//! decision is appended as a [`LedgerEntry`] whose hash binds it to its
//! predecessor:
//!
//! ```text
//! entry_hash = BLAKE3(kind_domain || len(chain_id) || chain_id || len(payload)
//!                     || payload || previous_hash || sequence || timestamp_ns)
//! ```
//!
//! Integers are little-endian `u64`. The first entry of every chain links to
//! [`genesis_anchor`], a fixed domain-separated constant.
//!
//! Chain roots are Merkle roots over position-bound leaves
//! `LEAF(sequence || entry_hash)`, committed to the entry count.
//!
//! # Guarantees
//!
//! - Single writer per chain: appends to one chain are serialized behind the
//!   chain's mutex and a compare-and-append on the storage index
//! - Independent chains (different swarms, units, the quarantine chain) never
//!   contend with each other
//! - Fail-visible: a detected break flips the chain to
//!   [`ChainHealth::Compromised`] and refuses further appends until
//!   [`TruthChainRecorder::resolve_integrity_break`] re-verifies it clean
//! - Corruption found at startup is reported through the chain health, never
//!   as a crash

use crate::merkle::{self, Hash, ProofStep};
use crate::storage::{AppendLog, MemoryLog, StorageError};
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Chain identifier (e.g. `swarm/alpha`, `unit/u-17`, `quarantine`)
pub type ChainId = String;

/// Domain prefix of the genesis anchor
pub const GENESIS_DOMAIN: &[u8] = b"4MIK-GENESIS-V1";

/// Previous-hash value of the first entry of every chain
pub fn genesis_anchor() -> Hash {
    *blake3::hash(GENESIS_DOMAIN).as_bytes()
}

/// Kind of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// A command passed the quorum gate and is about to be dispatched
    CommandAccepted,
    /// Aggregated outcome of a dispatch
    CommandResult,
    /// A peer was quarantined or released
    QuarantineDecision,
}

impl EntryKind {
    /// Domain-separation prefix for this kind
    pub fn domain(&self) -> &'static [u8] {
        match self {
            EntryKind::CommandAccepted => b"4MIK-CMD-ACCEPT-V1",
            EntryKind::CommandResult => b"4MIK-CMD-RESULT-V1",
            EntryKind::QuarantineDecision => b"4MIK-QUARANTINE-V1",
        }
    }
}

/// Immutable, hash-linked ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Chain this entry belongs to
    pub chain_id: ChainId,
    /// Position in the chain, starting at 0
    pub sequence: u64,
    /// Entry kind
    pub kind: EntryKind,
    /// Append time (nanoseconds since epoch)
    pub timestamp_ns: u64,
    /// BLAKE3 hash of the payload
    pub payload_hash: Hash,
    /// Hash of the previous entry (genesis anchor for sequence 0)
    pub previous_hash: Hash,
    /// Hash of this entry
    pub entry_hash: Hash,
}

impl LedgerEntry {
    /// Compute the entry hash from its parts
    pub fn compute_hash(
        chain_id: &str,
        kind: EntryKind,
        payload: &[u8],
        previous_hash: &Hash,
        sequence: u64,
        timestamp_ns: u64,
    ) -> Hash {
        let mut hasher = Hasher::new();
        hasher.update(kind.domain());
        hasher.update(&(chain_id.len() as u64).to_le_bytes());
        hasher.update(chain_id.as_bytes());
        hasher.update(&(payload.len() as u64).to_le_bytes());
        hasher.update(payload);
        hasher.update(previous_hash);
        hasher.update(&sequence.to_le_bytes());
        hasher.update(&timestamp_ns.to_le_bytes());
        *hasher.finalize().as_bytes()
    }

    /// Hex rendering of the entry hash
    pub fn entry_hash_hex(&self) -> String {
        hex::encode(self.entry_hash)
    }
}

/// Record layout in the byte log
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    entry: LedgerEntry,
    payload_hex: String,
}

/// Membership proof for one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    /// Claimed position of the entry
    pub index: u64,
    /// Number of entries covered by the root
    pub leaf_count: u64,
    /// The entry being proven
    pub entry: LedgerEntry,
    /// Sibling path from leaf to root
    pub path: Vec<ProofStep>,
}

/// Health of one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainHealth {
    /// Every verification so far succeeded
    Ok,
    /// A break was detected; trust decisions on this chain are halted
    Compromised {
        /// First index that failed verification
        at_index: u64,
    },
}

impl ChainHealth {
    /// Check if the chain is healthy
    pub fn is_ok(&self) -> bool {
        matches!(self, ChainHealth::Ok)
    }
}

/// Health of the whole recorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerHealth {
    /// No chain is compromised
    Ok,
    /// At least one chain awaits operator resolution
    Degraded {
        /// Compromised chains and their first bad index
        compromised: Vec<(ChainId, u64)>,
    },
}

impl LedgerHealth {
    /// Check if the ledger is healthy
    pub fn is_ok(&self) -> bool {
        matches!(self, LedgerHealth::Ok)
    }
}

/// Errors that can occur in ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Recomputed link or hash did not match
    #[error("Chain integrity broken on {chain_id} at index {at_index}")]
    ChainIntegrityBroken {
        /// Chain identifier
        chain_id: ChainId,
        /// First mismatching index
        at_index: u64,
    },

    /// Chain is in the fail-visible compromised state
    #[error("Chain {chain_id} is compromised at index {at_index}; appends halted until resolved")]
    ChainCompromised {
        /// Chain identifier
        chain_id: ChainId,
        /// First bad index
        at_index: u64,
    },

    /// No entry at the requested index
    #[error("Entry not found: {chain_id}[{index}]")]
    EntryNotFound {
        /// Chain identifier
        chain_id: ChainId,
        /// Requested index
        index: u64,
    },

    /// Verification range outside the chain
    #[error("Invalid range {from}..={to} for chain {chain_id} of length {len}")]
    InvalidRange {
        /// Chain identifier
        chain_id: ChainId,
        /// Range start
        from: u64,
        /// Range end (inclusive)
        to: u64,
        /// Chain length
        len: u64,
    },

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Record could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A recorder lock was poisoned
    #[error("Ledger lock poisoned")]
    Poisoned,
}

/// Result alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug)]
struct ChainState {
    entries: Vec<LedgerEntry>,
    health: ChainHealth,
}

impl ChainState {
    fn empty() -> Self {
        Self {
            entries: Vec::new(),
            health: ChainHealth::Ok,
        }
    }

    fn head_hash(&self) -> Hash {
        self.entries
            .last()
            .map(|e| e.entry_hash)
            .unwrap_or_else(genesis_anchor)
    }

    fn mark_compromised(&mut self, chain_id: &str, at_index: u64) {
        let first_bad = match self.health {
            ChainHealth::Compromised { at_index: existing } => existing.min(at_index),
            ChainHealth::Ok => at_index,
        };
        self.health = ChainHealth::Compromised { at_index: first_bad };
        error!(
            chain_id = %chain_id,
            at_index = first_bad,
            "Truth-chain integrity broken; trust decisions on this chain halted"
        );
    }
}

/// Truth-Chain recorder over an append-only byte log
pub struct TruthChainRecorder {
    log: Arc<dyn AppendLog>,
    chains: RwLock<HashMap<ChainId, Arc<Mutex<ChainState>>>>,
}

impl std::fmt::Debug for TruthChainRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TruthChainRecorder")
            .field("health", &self.health())
            .finish()
    }
}

impl TruthChainRecorder {
    /// Create a recorder backed by a fresh in-memory log
    pub fn in_memory() -> Self {
        Self {
            log: Arc::new(MemoryLog::new()),
            chains: RwLock::new(HashMap::new()),
        }
    }

    /// Open a recorder over an existing log.
    ///
    /// Performs the startup continuity check: every chain is re-verified from
    /// storage and broken chains come up compromised instead of failing.
    pub fn open(log: Arc<dyn AppendLog>) -> Result<Self> {
        let recorder = Self {
            log,
            chains: RwLock::new(HashMap::new()),
        };

        for chain_id in recorder.log.chains()? {
            let len = recorder.log.len(&chain_id)?;
            let mut state = ChainState::empty();
            match recorder.scan(&chain_id, 0, len.saturating_sub(1), None) {
                Ok(entries) => state.entries = entries,
                Err(ScanFailure::Broken { at_index, verified }) => {
                    state.entries = verified;
                    state.mark_compromised(&chain_id, at_index);
                }
                Err(ScanFailure::Fatal(e)) => return Err(e),
            }
            info!(chain_id = %chain_id, entries = len, "Truth-chain loaded");
            recorder
                .chains
                .write()
                .map_err(|_| LedgerError::Poisoned)?
                .insert(chain_id, Arc::new(Mutex::new(state)));
        }

        Ok(recorder)
    }

    fn chain(&self, chain_id: &str) -> Result<Arc<Mutex<ChainState>>> {
        if let Some(chain) = self
            .chains
            .read()
            .map_err(|_| LedgerError::Poisoned)?
            .get(chain_id)
        {
            return Ok(Arc::clone(chain));
        }

        let mut chains = self.chains.write().map_err(|_| LedgerError::Poisoned)?;
        Ok(Arc::clone(
            chains
                .entry(chain_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ChainState::empty()))),
        ))
    }

    fn existing_chain(&self, chain_id: &str) -> Result<Option<Arc<Mutex<ChainState>>>> {
        Ok(self
            .chains
            .read()
            .map_err(|_| LedgerError::Poisoned)?
            .get(chain_id)
            .cloned())
    }

    /// Append a payload to a chain, timestamped with the current time
    pub fn append(&self, chain_id: &str, payload: &[u8], kind: EntryKind) -> Result<LedgerEntry> {
        self.append_at(chain_id, payload, kind, crate::current_time_ns())
    }

    /// Append a payload with an explicit timestamp
    pub fn append_at(
        &self,
        chain_id: &str,
        payload: &[u8],
        kind: EntryKind,
        timestamp_ns: u64,
    ) -> Result<LedgerEntry> {
        let chain = self.chain(chain_id)?;
        let mut state = chain.lock().map_err(|_| LedgerError::Poisoned)?;

        if let ChainHealth::Compromised { at_index } = state.health {
            warn!(chain_id = %chain_id, at_index, "Append refused on compromised chain");
            return Err(LedgerError::ChainCompromised {
                chain_id: chain_id.to_string(),
                at_index,
            });
        }

        let sequence = state.entries.len() as u64;
        let previous_hash = state.head_hash();
        let entry = LedgerEntry {
            chain_id: chain_id.to_string(),
            sequence,
            kind,
            timestamp_ns,
            payload_hash: *blake3::hash(payload).as_bytes(),
            previous_hash,
            entry_hash: LedgerEntry::compute_hash(
                chain_id,
                kind,
                payload,
                &previous_hash,
                sequence,
                timestamp_ns,
            ),
        };

        let record = serde_json::to_vec(&StoredRecord {
            entry: entry.clone(),
            payload_hex: hex::encode(payload),
        })
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;

        self.log.append(chain_id, sequence, &record)?;
        state.entries.push(entry.clone());

        debug!(
            chain_id = %chain_id,
            sequence,
            kind = ?kind,
            entry_hash = %entry.entry_hash_hex(),
            "Truth-chain entry appended"
        );
        Ok(entry)
    }

    /// Read an entry
    pub fn get_entry(&self, chain_id: &str, index: u64) -> Result<LedgerEntry> {
        let not_found = || LedgerError::EntryNotFound {
            chain_id: chain_id.to_string(),
            index,
        };
        let chain = self.existing_chain(chain_id)?.ok_or_else(not_found)?;
        let state = chain.lock().map_err(|_| LedgerError::Poisoned)?;
        state
            .entries
            .get(index as usize)
            .cloned()
            .ok_or_else(not_found)
    }

    /// Read the payload stored with an entry
    pub fn get_payload(&self, chain_id: &str, index: u64) -> Result<Vec<u8>> {
        let raw = self
            .log
            .read(chain_id, index)?
            .ok_or_else(|| LedgerError::EntryNotFound {
                chain_id: chain_id.to_string(),
                index,
            })?;
        let record: StoredRecord =
            serde_json::from_slice(&raw).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        hex::decode(record.payload_hex).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    /// Number of entries on a chain
    pub fn len(&self, chain_id: &str) -> u64 {
        self.existing_chain(chain_id)
            .ok()
            .flatten()
            .and_then(|c| c.lock().ok().map(|s| s.entries.len() as u64))
            .unwrap_or(0)
    }

    /// Hash of the last entry, or `None` for an empty chain
    pub fn head_hash(&self, chain_id: &str) -> Option<Hash> {
        let chain = self.existing_chain(chain_id).ok()??;
        let state = chain.lock().ok()?;
        state.entries.last().map(|e| e.entry_hash)
    }

    /// Recompute every link in `from..=to` from the durable log.
    ///
    /// The first mismatch flips the chain to compromised and is returned as
    /// [`LedgerError::ChainIntegrityBroken`].
    pub fn verify_chain(&self, chain_id: &str, from: u64, to: u64) -> Result<()> {
        let len = self.log.len(chain_id)?;
        if from > to || to >= len {
            return Err(LedgerError::InvalidRange {
                chain_id: chain_id.to_string(),
                from,
                to,
                len,
            });
        }

        let chain = self.chain(chain_id)?;
        let arena = chain
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .entries
            .clone();

        match self.scan(chain_id, from, to, Some(&arena)) {
            Ok(_) => Ok(()),
            Err(ScanFailure::Broken { at_index, .. }) => {
                chain
                    .lock()
                    .map_err(|_| LedgerError::Poisoned)?
                    .mark_compromised(chain_id, at_index);
                Err(LedgerError::ChainIntegrityBroken {
                    chain_id: chain_id.to_string(),
                    at_index,
                })
            }
            Err(ScanFailure::Fatal(e)) => Err(e),
        }
    }

    /// Verify an entire chain; an empty chain verifies trivially
    pub fn verify_full(&self, chain_id: &str) -> Result<()> {
        match self.log.len(chain_id)? {
            0 => Ok(()),
            len => self.verify_chain(chain_id, 0, len - 1),
        }
    }

    /// Re-verify a compromised chain after operator intervention.
    ///
    /// The arena is rebuilt from storage; the chain returns to
    /// [`ChainHealth::Ok`] only if every record verifies.
    pub fn resolve_integrity_break(&self, chain_id: &str) -> Result<()> {
        let chain = self.chain(chain_id)?;
        let mut state = chain.lock().map_err(|_| LedgerError::Poisoned)?;
        let len = self.log.len(chain_id)?;

        let rebuilt = if len == 0 {
            Vec::new()
        } else {
            match self.scan(chain_id, 0, len - 1, None) {
                Ok(entries) => entries,
                Err(ScanFailure::Broken { at_index, .. }) => {
                    state.mark_compromised(chain_id, at_index);
                    return Err(LedgerError::ChainIntegrityBroken {
                        chain_id: chain_id.to_string(),
                        at_index,
                    });
                }
                Err(ScanFailure::Fatal(e)) => return Err(e),
            }
        };

        state.entries = rebuilt;
        state.health = ChainHealth::Ok;
        info!(chain_id = %chain_id, entries = len, "Truth-chain integrity break resolved");
        Ok(())
    }

    fn scan(
        &self,
        chain_id: &str,
        from: u64,
        to: u64,
        arena: Option<&[LedgerEntry]>,
    ) -> std::result::Result<Vec<LedgerEntry>, ScanFailure> {
        let mut verified = Vec::new();
        let mut expected_previous = if from == 0 {
            genesis_anchor()
        } else {
            match self.decode(chain_id, from - 1)? {
                Some((entry, _)) => entry.entry_hash,
                None => {
                    return Err(ScanFailure::Broken {
                        at_index: from - 1,
                        verified,
                    })
                }
            }
        };

        for index in from..=to {
            let Some((entry, payload)) = self.decode(chain_id, index)? else {
                return Err(ScanFailure::Broken { at_index: index, verified });
            };

            let recomputed = LedgerEntry::compute_hash(
                chain_id,
                entry.kind,
                &payload,
                &entry.previous_hash,
                entry.sequence,
                entry.timestamp_ns,
            );
            let arena_matches = arena
                .and_then(|a| a.get(index as usize))
                .map(|known| known == &entry)
                .unwrap_or(true);

            let intact = entry.chain_id == chain_id
                && entry.sequence == index
                && entry.previous_hash == expected_previous
                && entry.payload_hash == *blake3::hash(&payload).as_bytes()
                && entry.entry_hash == recomputed
                && arena_matches;

            if !intact {
                return Err(ScanFailure::Broken { at_index: index, verified });
            }

            expected_previous = entry.entry_hash;
            verified.push(entry);
        }

        Ok(verified)
    }

    /// Decode a stored record; `Ok(None)` when it is missing or unreadable
    fn decode(
        &self,
        chain_id: &str,
        index: u64,
    ) -> std::result::Result<Option<(LedgerEntry, Vec<u8>)>, ScanFailure> {
        let Some(raw) = self.log.read(chain_id, index).map_err(LedgerError::from)? else {
            return Ok(None);
        };
        let Ok(record) = serde_json::from_slice::<StoredRecord>(&raw) else {
            return Ok(None);
        };
        let Ok(payload) = hex::decode(&record.payload_hex) else {
            return Ok(None);
        };
        Ok(Some((record.entry, payload)))
    }

    fn leaves(state: &ChainState) -> Vec<Hash> {
        state
            .entries
            .iter()
            .map(|e| merkle::hash_position_leaf(e.sequence, &e.entry_hash))
            .collect()
    }

    /// Merkle root over every entry of a chain, committed to the entry count
    pub fn chain_root(&self, chain_id: &str) -> Option<Hash> {
        let chain = self.existing_chain(chain_id).ok()??;
        let state = chain.lock().ok()?;
        let leaves = Self::leaves(&state);
        merkle::merkle_root(&leaves).map(|root| merkle::commit_root(&root, leaves.len() as u64))
    }

    /// Build an inclusion proof for the entry at `index`
    pub fn generate_proof(&self, chain_id: &str, index: u64) -> Result<InclusionProof> {
        let not_found = || LedgerError::EntryNotFound {
            chain_id: chain_id.to_string(),
            index,
        };
        let chain = self.existing_chain(chain_id)?.ok_or_else(not_found)?;
        let state = chain.lock().map_err(|_| LedgerError::Poisoned)?;
        let entry = state.entries.get(index as usize).cloned().ok_or_else(not_found)?;
        let leaves = Self::leaves(&state);
        let path = merkle::merkle_path(&leaves, index as usize).ok_or_else(not_found)?;

        Ok(InclusionProof {
            index,
            leaf_count: leaves.len() as u64,
            entry,
            path,
        })
    }

    /// Check that `proof` places its entry at the claimed index under `root`.
    ///
    /// `root` is a value published by [`TruthChainRecorder::chain_root`]; the
    /// claimed index and leaf count are both bound into it.
    pub fn verify_proof(proof: &InclusionProof, root: &Hash) -> bool {
        if proof.entry.sequence != proof.index {
            return false;
        }
        let leaf = merkle::hash_position_leaf(proof.index, &proof.entry.entry_hash);
        merkle::fold_path(leaf, proof.index, proof.leaf_count, &proof.path)
            .map(|tree_root| merkle::commit_root(&tree_root, proof.leaf_count) == *root)
            .unwrap_or(false)
    }

    /// Health of one chain; unknown chains are healthy
    pub fn chain_health(&self, chain_id: &str) -> ChainHealth {
        match self.existing_chain(chain_id) {
            Ok(Some(chain)) => chain
                .lock()
                .map(|s| s.health.clone())
                .unwrap_or(ChainHealth::Compromised { at_index: 0 }),
            Ok(None) => ChainHealth::Ok,
            Err(_) => ChainHealth::Compromised { at_index: 0 },
        }
    }

    /// Whether trust decisions may be taken on a chain
    pub fn is_trusted(&self, chain_id: &str) -> bool {
        self.chain_health(chain_id).is_ok()
    }

    /// Aggregate health across all chains
    pub fn health(&self) -> LedgerHealth {
        let Ok(chains) = self.chains.read() else {
            return LedgerHealth::Degraded {
                compromised: Vec::new(),
            };
        };

        let mut compromised: Vec<(ChainId, u64)> = chains
            .iter()
            .filter_map(|(id, chain)| match chain.lock().map(|s| s.health.clone()) {
                Ok(ChainHealth::Ok) => None,
                Ok(ChainHealth::Compromised { at_index }) => Some((id.clone(), at_index)),
                Err(_) => Some((id.clone(), 0)),
            })
            .collect();
        compromised.sort();

        if compromised.is_empty() {
            LedgerHealth::Ok
        } else {
            LedgerHealth::Degraded { compromised }
        }
    }
}

#[derive(Debug)]
enum ScanFailure {
    Broken {
        at_index: u64,
        verified: Vec<LedgerEntry>,
    },
    Fatal(LedgerError),
}

impl From<LedgerError> for ScanFailure {
    fn from(e: LedgerError) -> Self {
        ScanFailure::Fatal(e)
    }
}
