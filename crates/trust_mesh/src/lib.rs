//! Trust Mesh Service
//!
//! Aggregates per-peer evidence into a weighted trust vote and isolates
//! peers whose behavior crosses the Byzantine threshold:
//! - Telemetry trust scores, spoofed telemetry and signature failures are
//!   weighted votes under an explicit [`ByzantinePolicy`]
//! - Quarantine decisions are appended to the Truth-Chain
//! - Quarantine is one-way; only a quorum-signed release lifts it
//!
//! [`ByzantinePolicy`]: aethercore_core::ByzantinePolicy

pub mod error;
pub mod mesh;
pub mod release;
pub mod trust;

pub use error::MeshError;
pub use mesh::{PeerStatus, QuarantineAction, QuarantineRecord, TrustMesh, QUARANTINE_CHAIN};
pub use release::{release_message, ReleaseAuthorization, ReleaseSignature, RELEASE_DOMAIN};
pub use trust::{Observation, WeightedTrust};
