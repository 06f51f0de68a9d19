//! Identity types

use serde::{Deserialize, Serialize};

/// Registered signing identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique identifier
    pub id: String,
    /// Ed25519 public key
    pub public_key: [u8; 32],
    /// Registration time (nanoseconds since epoch)
    pub registered_at_ns: u64,
    /// Revocation tombstone, if revoked
    pub revocation: Option<Revocation>,
}

/// Revocation tombstone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    /// Revocation time (nanoseconds since epoch)
    pub revoked_at_ns: u64,
    /// Operator-supplied reason
    pub reason: String,
}

impl Identity {
    /// Check if the identity has been revoked
    pub fn is_revoked(&self) -> bool {
        self.revocation.is_some()
    }

    /// Hex rendering of the public key
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }
}
