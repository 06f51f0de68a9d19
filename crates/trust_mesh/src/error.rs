//! Trust mesh errors

use aethercore_core::LedgerError;
use thiserror::Error;

/// Errors that can occur in trust mesh operations
#[derive(Debug, Error)]
pub enum MeshError {
    /// The peer was quarantined but the decision could not be recorded
    #[error("Peer {peer_id} quarantined but audit append failed: {source}")]
    AuditUnavailable {
        /// Quarantined peer
        peer_id: String,
        /// Ledger failure
        #[source]
        source: LedgerError,
    },

    /// Release requested for a peer that is not quarantined
    #[error("Peer {peer_id} is not quarantined")]
    NotQuarantined {
        /// Peer identifier
        peer_id: String,
    },

    /// Not enough valid release signatures
    #[error("Release quorum not met: required {required}, got {actual}")]
    ReleaseQuorumNotMet {
        /// Required distinct authorities
        required: usize,
        /// Valid distinct authorities
        actual: usize,
    },

    /// Ledger failure outside a quarantine transition
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Mesh lock was poisoned
    #[error("Trust mesh lock poisoned")]
    Poisoned,
}
