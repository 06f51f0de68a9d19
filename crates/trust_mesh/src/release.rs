//! Authorized quarantine release.
//!
//! The signed message binds the release to the peer, the issuing time, the
//! peer's quarantine epoch and the hash of the quarantine entry it lifts. The
//! epoch counts quarantines of that peer, so a release can never be replayed
//! against a later quarantine even when neither decision reached the ledger.

use aethercore_core::Hash;
use serde::{Deserialize, Serialize};

/// Domain prefix of the release message
pub const RELEASE_DOMAIN: &str = "4MIK-RELEASE-V1";

/// One authority's signature over the release message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSignature {
    /// Identity id of the release authority
    pub authority_id: String,
    /// Ed25519 signature over [`release_message`]
    pub signature: Vec<u8>,
}

/// Request to lift a quarantine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAuthorization {
    /// Peer to release
    pub peer_id: String,
    /// Time the authorization was issued (nanoseconds since epoch)
    pub issued_at_ns: u64,
    /// Authority signatures
    pub signatures: Vec<ReleaseSignature>,
}

/// Canonical release message.
///
/// `epoch` is the peer's quarantine count, starting at 1 for its first
/// quarantine. `quarantine_entry` is `None` when the quarantine decision
/// could not be recorded; the message then carries `none` in its place.
pub fn release_message(
    peer_id: &str,
    issued_at_ns: u64,
    epoch: u64,
    quarantine_entry: Option<&Hash>,
) -> Vec<u8> {
    let entry = quarantine_entry
        .map(hex::encode)
        .unwrap_or_else(|| "none".to_string());
    format!(
        "{RELEASE_DOMAIN}\npeer_id={peer_id}\nissued_at_ns={issued_at_ns}\nepoch={epoch}\nquarantine_entry={entry}"
    )
    .into_bytes()
}
