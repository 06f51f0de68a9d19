//! Shared identity registry with tombstone revocation.

use crate::error::{IdentityError, IdentityResult};
use crate::identity::{Identity, Revocation};
use aethercore_core::current_time_ns;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Registry of known identities.
///
/// Reads take a shared lock; registration and revocation take the write
/// lock briefly. Verification never holds the lock while doing curve math.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    identities: RwLock<HashMap<String, Identity>>,
}

impl IdentityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity.
    ///
    /// Re-registering the same key is a no-op; a different key under an
    /// existing id is rejected.
    pub fn register(&self, identity_id: &str, public_key: [u8; 32]) -> IdentityResult<()> {
        VerifyingKey::from_bytes(&public_key)
            .map_err(|e| IdentityError::InvalidPublicKey(e.to_string()))?;

        let mut identities = self.identities.write().map_err(|_| IdentityError::Poisoned)?;
        if let Some(existing) = identities.get(identity_id) {
            if existing.public_key == public_key {
                debug!(identity_id = %identity_id, "Identity re-registered with same key");
                return Ok(());
            }
            warn!(identity_id = %identity_id, "Rejected registration with conflicting key");
            return Err(IdentityError::DuplicateIdentity {
                identity_id: identity_id.to_string(),
            });
        }

        identities.insert(
            identity_id.to_string(),
            Identity {
                id: identity_id.to_string(),
                public_key,
                registered_at_ns: current_time_ns(),
                revocation: None,
            },
        );
        info!(identity_id = %identity_id, "Identity registered");
        Ok(())
    }

    /// Revoke an identity, leaving a tombstone.
    pub fn revoke(&self, identity_id: &str, reason: &str) -> IdentityResult<()> {
        let mut identities = self.identities.write().map_err(|_| IdentityError::Poisoned)?;
        let identity = identities
            .get_mut(identity_id)
            .ok_or_else(|| IdentityError::UnknownIdentity {
                identity_id: identity_id.to_string(),
            })?;

        if identity.revocation.is_none() {
            identity.revocation = Some(Revocation {
                revoked_at_ns: current_time_ns(),
                reason: reason.to_string(),
            });
            warn!(identity_id = %identity_id, reason = %reason, "Identity revoked");
        }
        Ok(())
    }

    /// Get a snapshot of an identity.
    pub fn get(&self, identity_id: &str) -> Option<Identity> {
        self.identities.read().ok()?.get(identity_id).cloned()
    }

    /// Check whether an id is registered (revoked ids included).
    pub fn contains(&self, identity_id: &str) -> bool {
        self.get(identity_id).is_some()
    }

    /// Number of registered identities, tombstones included.
    pub fn len(&self) -> usize {
        self.identities.read().map(|i| i.len()).unwrap_or(0)
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Verify `signature` over `message` by `identity_id`.
    pub fn verify_signature(
        &self,
        identity_id: &str,
        message: &[u8],
        signature: &[u8],
    ) -> IdentityResult<()> {
        let identity = self
            .identities
            .read()
            .map_err(|_| IdentityError::Poisoned)?
            .get(identity_id)
            .cloned()
            .ok_or_else(|| IdentityError::UnknownIdentity {
                identity_id: identity_id.to_string(),
            })?;

        if identity.is_revoked() {
            return Err(IdentityError::RevokedIdentity {
                identity_id: identity_id.to_string(),
            });
        }

        let invalid = || IdentityError::InvalidSignature {
            identity_id: identity_id.to_string(),
        };
        let key = VerifyingKey::from_bytes(&identity.public_key)
            .map_err(|e| IdentityError::InvalidPublicKey(e.to_string()))?;
        let signature = Signature::from_slice(signature).map_err(|_| invalid())?;
        key.verify(message, &signature).map_err(|_| invalid())
    }
}
