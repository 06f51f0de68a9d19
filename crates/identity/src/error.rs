//! Error types for identity operations.

use thiserror::Error;

/// Errors that can occur in identity operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Identity is not registered
    #[error("Unknown identity: {identity_id}")]
    UnknownIdentity { identity_id: String },

    /// Identity already registered with a different key
    #[error("Identity already registered with a different key: {identity_id}")]
    DuplicateIdentity { identity_id: String },

    /// Identity carries a revocation tombstone
    #[error("Identity revoked: {identity_id}")]
    RevokedIdentity { identity_id: String },

    /// Signature did not verify under the registered key
    #[error("Invalid signature from {identity_id}")]
    InvalidSignature { identity_id: String },

    /// Key bytes are not a valid Ed25519 point
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Registry lock was poisoned
    #[error("Identity registry lock poisoned")]
    Poisoned,
}

/// Result type for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;
