//! C2 Router - Command and Control routing for AetherCore
//!
//! This crate handles:
//! - Command type definitions for unit and swarm operations
//! - Canonical command encoding and authority signature sets
//! - Authority verification with Ed25519 signatures
//! - Quorum-gated actuation based on command scope
//! - Concurrent fan-out with per-target timeouts, retries and swarm aborts
//! - Truth-Chain audit records for every accepted command and its outcome
//!
//! # Architecture
//!
//! Commands flow through the following pipeline:
//! 1. `SignedCommand` submitted to [`C2Router`]
//! 2. Audit chain health checked on the `TruthChainRecorder`
//! 3. Issue time and command id checked by [`CommandReplayGuard`]
//! 4. Authority signatures verified by [`AuthorityVerifier`]
//! 5. Quorum requirements checked by [`QuorumGate`], which yields an [`AuthorizedCommand`]
//! 6. Command dispatched by [`CommandDispatcher`] and recorded before and after fan-out
//!
//! # Authority Levels
//!
//! - Single unit, non-critical: Operator signature only
//! - Single unit, critical: Operator + 1 coalition member
//! - Swarm command, < 5 units: Operator + 1 coalition member
//! - Swarm command, >= 5 units: 2-of-3 coalition quorum
//! - Emergency stop / abort all: Operator signature only (immediate)
//!
//! # Examples
//!
//! ```no_run
//! use aethercore_c2_router::{
//!     AuthorityVerifier, Command, Coordinate, QuorumGate, SignedCommand, UnitCommand,
//! };
//! use aethercore_identity::IdentityRegistry;
//! use std::sync::Arc;
//!
//! let command = Command::unit(
//!     "cmd-1",
//!     "unit-1",
//!     UnitCommand::Navigate {
//!         waypoint: Coordinate { lat: 45.0, lon: -122.0, alt: Some(100.0) },
//!         speed: Some(10.0),
//!         altitude: Some(100.0),
//!     },
//!     1_000,
//! );
//!
//! let gate = QuorumGate::new(AuthorityVerifier::new(Arc::new(IdentityRegistry::new())));
//! let result = gate.check(&SignedCommand::new(command));
//! assert!(result.is_err());
//! ```

#![warn(missing_docs)]

pub mod authority;
pub mod command_types;
pub mod dispatcher;
pub mod ledger;
pub mod quorum;
pub mod replay;
pub mod router;

// Re-export commonly used types
pub use authority::{AuthorityError, AuthorityVerifier, SignatureTally};
pub use command_types::{
    Command, CommandBody, CommandSignature, ConfigUpdate, Coordinate, FormationType, GeoBoundary,
    MeshTopology, ScanParameters, ScanType, SignatureSet, SignedCommand, SwarmCommand,
    UnitCommand, COMMAND_DOMAIN,
};
pub use dispatcher::{
    CommandDispatcher, CommandFrame, DispatchError, DispatchReport, DispatchStatus,
    TransportError, UnitAck, UnitDispatchResult, UnitTransport,
};
pub use ledger::{CommandRecord, DispatchRecord};
pub use quorum::{
    required_signatures, AuthorizedCommand, CommandScope, Criticality, QuorumError, QuorumGate,
    QuorumScope, SWARM_LARGE_THRESHOLD,
};
pub use replay::{CommandReplayGuard, ReplayError};
pub use router::{C2Router, RouterError};
