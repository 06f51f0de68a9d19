//! Identity registry for command authorities and field units.
//!
//! Every command signature and every attested telemetry frame is bound to an
//! identity held here. Identities are immutable once registered; revocation
//! leaves a tombstone so that historical audit entries stay attributable.
//!
//! # Security Model
//!
//! - Ed25519 public keys only; verification uses strict checks
//! - Revoked identities are never deleted and never verify
//! - Registry state is shared by `Arc` between the router, the telemetry
//!   attestor and the trust mesh

pub mod error;
pub mod genesis;
pub mod identity;
pub mod registry;

pub use error::{IdentityError, IdentityResult};
pub use genesis::{genesis_hash, DeviceClass, IdentityBlock};
pub use identity::{Identity, Revocation};
pub use registry::IdentityRegistry;
