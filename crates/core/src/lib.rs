//! Core functionality for the AetherCore C2 trust core.
//!
//! This crate provides the pieces shared by every other crate in the
//! workspace:
//! - Configuration schema for dispatch, telemetry scoring and Byzantine policy
//! - Structured logging initialization
//! - Domain-separated BLAKE3 hashing and Merkle inclusion proofs
//! - Append-only byte log backends (memory, SQLite)
//! - The Truth-Chain recorder: hash-linked, tamper-evident audit chains

pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod merkle;
pub mod storage;

pub use config::{
    ByzantinePolicy, DispatchSettings, NodeConfig, ReplaySettings, TelemetrySettings,
};
pub use error::{CoreError, Result};
pub use ledger::{
    ChainHealth, ChainId, EntryKind, InclusionProof, LedgerEntry, LedgerError, LedgerHealth,
    TruthChainRecorder,
};
pub use merkle::{Hash, ProofStep};
pub use storage::{AppendLog, MemoryLog, StorageError};

#[cfg(feature = "sqlite")]
pub use storage::SqliteLog;

/// Current wall-clock time in nanoseconds since the UNIX epoch.
///
/// Returns 0 if the system clock reports a time before the epoch.
pub fn current_time_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
