//! Authority verification for command execution
//!
//! Signatures are Ed25519 over [`Command::canonical_bytes`](crate::Command::canonical_bytes),
//! checked against the shared identity registry. Revoked identities never
//! verify.

#![warn(missing_docs)]

use crate::command_types::SignatureSet;
use aethercore_identity::{IdentityError, IdentityRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Authority verification errors
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityError {
    /// Identity is not registered
    #[error("Unknown identity: {identity_id}")]
    UnknownIdentity {
        /// Identity identifier
        identity_id: String,
    },

    /// Identity already registered with a different key
    #[error("Duplicate identity: {identity_id}")]
    DuplicateIdentity {
        /// Identity identifier
        identity_id: String,
    },

    /// Signature malformed or does not verify
    #[error("Invalid signature from {identity_id}")]
    InvalidSignature {
        /// Identity identifier
        identity_id: String,
    },

    /// Identity has been revoked
    #[error("Revoked identity: {identity_id}")]
    RevokedIdentity {
        /// Identity identifier
        identity_id: String,
    },

    /// Public key bytes are not a valid Ed25519 point
    #[error("Invalid public key format: {0}")]
    InvalidPublicKey(String),

    /// Registry unavailable
    #[error("Identity registry unavailable")]
    RegistryUnavailable,
}

impl AuthorityError {
    /// Whether this rejection is evidence of a forged or corrupted signature
    pub fn is_signature_failure(&self) -> bool {
        matches!(self, AuthorityError::InvalidSignature { .. })
    }
}

impl From<IdentityError> for AuthorityError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::UnknownIdentity { identity_id } => {
                AuthorityError::UnknownIdentity { identity_id }
            }
            IdentityError::DuplicateIdentity { identity_id } => {
                AuthorityError::DuplicateIdentity { identity_id }
            }
            IdentityError::RevokedIdentity { identity_id } => {
                AuthorityError::RevokedIdentity { identity_id }
            }
            IdentityError::InvalidSignature { identity_id } => {
                AuthorityError::InvalidSignature { identity_id }
            }
            IdentityError::InvalidPublicKey(msg) => AuthorityError::InvalidPublicKey(msg),
            IdentityError::Poisoned => AuthorityError::RegistryUnavailable,
        }
    }
}

/// Outcome of verifying a signature set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignatureTally {
    /// Identities whose signature verified, in set order
    pub accepted: Vec<String>,
    /// Identities whose signature was rejected, with the reason
    pub rejected: Vec<(String, AuthorityError)>,
    /// Repeated entries for an identity already counted
    pub duplicates: usize,
}

impl SignatureTally {
    /// Number of distinct valid signers
    pub fn valid_count(&self) -> usize {
        self.accepted.len()
    }

    /// Identities whose signature failed to verify
    pub fn signature_failures(&self) -> impl Iterator<Item = &str> {
        self.rejected
            .iter()
            .filter(|(_, e)| e.is_signature_failure())
            .map(|(id, _)| id.as_str())
    }
}

/// Authority verifier for Ed25519 signatures
#[derive(Debug, Clone)]
pub struct AuthorityVerifier {
    registry: Arc<IdentityRegistry>,
}

impl AuthorityVerifier {
    /// Create a verifier over the shared registry
    pub fn new(registry: Arc<IdentityRegistry>) -> Self {
        Self { registry }
    }

    /// Registry backing this verifier
    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    /// Register an authority public key
    pub fn register(&self, identity_id: &str, public_key: [u8; 32]) -> Result<(), AuthorityError> {
        self.registry.register(identity_id, public_key)?;
        Ok(())
    }

    /// Verify one signature over `command_bytes`.
    ///
    /// Returns `Ok(())` only when the identity is registered, not revoked,
    /// and the signature checks out.
    pub fn verify(
        &self,
        command_bytes: &[u8],
        signature: &[u8],
        identity_id: &str,
    ) -> Result<(), AuthorityError> {
        self.registry
            .verify_signature(identity_id, command_bytes, signature)?;
        Ok(())
    }

    /// Verify every signature in `signatures`, counting each identity once
    pub fn tally(&self, command_bytes: &[u8], signatures: &SignatureSet) -> SignatureTally {
        let mut seen = HashSet::new();
        let mut tally = SignatureTally::default();
        for sig in signatures.iter() {
            if !seen.insert(sig.identity_id.as_str()) {
                tally.duplicates += 1;
                continue;
            }
            match self.verify(command_bytes, &sig.signature, &sig.identity_id) {
                Ok(()) => tally.accepted.push(sig.identity_id.clone()),
                Err(e) => {
                    tracing::warn!(identity_id = %sig.identity_id, error = %e, "Authority signature rejected");
                    tally.rejected.push((sig.identity_id.clone(), e));
                }
            }
        }
        tally
    }

    /// Number of distinct identities with a valid signature
    pub fn verify_multi(&self, command_bytes: &[u8], signatures: &SignatureSet) -> usize {
        self.tally(command_bytes, signatures).valid_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn verifier_with(ids: &[&str]) -> (AuthorityVerifier, Vec<SigningKey>) {
        let verifier = AuthorityVerifier::new(Arc::new(IdentityRegistry::new()));
        let keys: Vec<_> = ids.iter().map(|_| SigningKey::generate(&mut OsRng)).collect();
        for (id, key) in ids.iter().zip(&keys) {
            verifier.register(id, key.verifying_key().to_bytes()).unwrap();
        }
        (verifier, keys)
    }

    #[test]
    fn test_signature_verification() {
        let (verifier, keys) = verifier_with(&["operator-1"]);
        let message = b"test command";
        let signature = keys[0].sign(message).to_bytes();

        assert!(verifier.verify(message, &signature, "operator-1").is_ok());
        assert!(matches!(
            verifier.verify(b"other command", &signature, "operator-1"),
            Err(AuthorityError::InvalidSignature { .. })
        ));
        assert!(matches!(
            verifier.verify(&message[..], &signature[..10], "operator-1"),
            Err(AuthorityError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_unknown_and_revoked() {
        let (verifier, keys) = verifier_with(&["operator-1"]);
        let sig = keys[0].sign(b"msg").to_bytes();
        assert!(matches!(
            verifier.verify(b"msg", &sig, "operator-9"),
            Err(AuthorityError::UnknownIdentity { .. })
        ));

        verifier.registry().revoke("operator-1", "compromised").unwrap();
        assert!(matches!(
            verifier.verify(b"msg", &sig, "operator-1"),
            Err(AuthorityError::RevokedIdentity { .. })
        ));
    }

    #[test]
    fn test_tally_counts_each_identity_once() {
        let (verifier, keys) = verifier_with(&["op-1", "op-2", "op-3"]);
        let msg = b"command";
        let mut set = SignatureSet::new();
        set.push("op-1", keys[0].sign(msg).to_bytes().to_vec());
        set.push("op-2", keys[0].sign(msg).to_bytes().to_vec()); // wrong key
        set.push("op-3", keys[2].sign(msg).to_bytes().to_vec());

        let tally = verifier.tally(msg, &set);
        assert_eq!(tally.accepted, vec!["op-1".to_string(), "op-3".to_string()]);
        assert_eq!(tally.signature_failures().collect::<Vec<_>>(), vec!["op-2"]);
        assert_eq!(verifier.verify_multi(msg, &set), 2);

        // A deserialized set can carry repeats; they never add weight
        let json = format!(
            r#"[{{"identity_id":"op-1","signature":{:?}}},{{"identity_id":"op-1","signature":{:?}}}]"#,
            keys[0].sign(msg).to_bytes().to_vec(),
            keys[0].sign(msg).to_bytes().to_vec()
        );
        let repeated: SignatureSet = serde_json::from_str(&json).unwrap();
        let tally = verifier.tally(msg, &repeated);
        assert_eq!(tally.valid_count(), 1);
        assert_eq!(tally.duplicates, 1);
    }
}
