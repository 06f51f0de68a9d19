//! Command type definitions for unit and swarm operations
//!
//! This module defines the command structures for controlling individual units
//! and coordinated swarm operations, the signed envelope they travel in, and
//! the canonical byte encoding signatures are computed over.
//!
//! Canonical bytes are `4MIK-CMD-V1\n` followed by the serde_json encoding
//! of the [`Command`]. Struct fields serialize in declaration order and JSON
//! objects inside payloads are key-sorted, so the encoding is deterministic.

#![warn(missing_docs)]

use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};

/// Domain prefix of canonical command bytes
pub const COMMAND_DOMAIN: &[u8] = b"4MIK-CMD-V1\n";

/// Geographic coordinate (latitude, longitude, altitude)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coordinate {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
    /// Altitude in meters (optional)
    pub alt: Option<f32>,
}

/// Scan type enumeration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ScanType {
    /// Visual spectrum scan
    Visual,
    /// Infrared scan
    Infrared,
    /// Radio frequency scan
    RadioFrequency,
    /// Combined multi-spectrum scan
    MultiSpectrum,
}

/// Scan parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanParameters {
    /// Resolution in meters per pixel
    pub resolution_m: Option<f32>,
    /// Scan duration in seconds
    pub duration_secs: Option<u32>,
    /// Additional scan-specific parameters
    pub custom: Option<serde_json::Value>,
}

/// Configuration update
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigUpdate {
    /// Configuration key
    pub key: String,
    /// Configuration value as JSON
    pub value: serde_json::Value,
}

/// Formation type for swarm operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FormationType {
    /// Line formation
    Line,
    /// V formation
    VFormation,
    /// Column formation
    Column,
    /// Spread formation
    Spread,
    /// Custom formation with relative positions
    Custom {
        /// Relative positions for each unit
        positions: Vec<(f32, f32)>,
    },
}

/// Geographic boundary definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoBoundary {
    /// List of coordinates defining the boundary polygon
    pub vertices: Vec<Coordinate>,
}

/// Mesh topology configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MeshTopology {
    /// Fully connected mesh
    FullMesh,
    /// Star topology with hub
    Star {
        /// Hub unit identifier
        hub_unit_id: String,
    },
    /// Ring topology
    Ring,
    /// Custom topology with explicit connections
    Custom {
        /// Explicit unit-to-unit connections
        connections: Vec<(String, String)>,
    },
}

/// Single unit command enumeration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum UnitCommand {
    /// Navigate to waypoint
    Navigate {
        /// Target waypoint coordinate
        waypoint: Coordinate,
        /// Speed in m/s (optional)
        speed: Option<f32>,
        /// Altitude in meters (optional)
        altitude: Option<f32>,
    },
    /// Loiter at current or specified location
    Loiter {
        /// Loiter duration in seconds (optional, infinite if None)
        duration_secs: Option<u32>,
        /// Loiter radius in meters (optional)
        radius_m: Option<f32>,
    },
    /// Return to base
    ReturnToBase {
        /// Base identifier
        base_id: String,
    },
    /// Execute scan operation
    Scan {
        /// Type of scan to perform
        scan_type: ScanType,
        /// Scan parameters
        parameters: ScanParameters,
    },
    /// Relay message to another unit
    Relay {
        /// Target unit identifier
        target_unit_id: String,
        /// Message payload
        payload: Vec<u8>,
    },
    /// Update unit configuration
    Configure {
        /// Configuration delta to apply
        config_delta: ConfigUpdate,
    },
    /// Reboot unit
    Reboot {
        /// Delay before reboot in seconds
        delay_secs: u32,
    },
    /// Execute self-test sequence
    SelfTest,
    /// Emergency stop all operations
    EmergencyStop {
        /// Reason for emergency stop
        reason: String,
    },
}

/// Multi-unit swarm command enumeration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SwarmCommand {
    /// Move formation to destination
    FormationMove {
        /// Formation type
        formation: FormationType,
        /// Destination coordinate
        destination: Coordinate,
        /// Formation speed in m/s
        speed: f32,
    },
    /// Scan area with coordinated coverage
    AreaScan {
        /// Boundary of scan area
        boundary: GeoBoundary,
        /// Type of scan
        scan_type: ScanType,
        /// Overlap percentage between unit coverage
        overlap_percent: u8,
    },
    /// Reconfigure mesh topology
    ReconfigureMesh {
        /// New mesh topology
        topology: MeshTopology,
    },
    /// Execute synchronized action across units
    SyncExecute {
        /// Action to execute on all units
        action: UnitCommand,
        /// Synchronization time in nanoseconds since epoch
        sync_time_ns: u64,
    },
    /// Abort all pending operations
    AbortAll {
        /// Reason for abort
        reason: String,
    },
    /// Recall all units to base
    RecallAll {
        /// Base identifier
        base_id: String,
    },
}

impl UnitCommand {
    /// Kind name used in audit records
    pub fn kind_name(&self) -> &'static str {
        match self {
            UnitCommand::Navigate { .. } => "Navigate",
            UnitCommand::Loiter { .. } => "Loiter",
            UnitCommand::ReturnToBase { .. } => "ReturnToBase",
            UnitCommand::Scan { .. } => "Scan",
            UnitCommand::Relay { .. } => "Relay",
            UnitCommand::Configure { .. } => "Configure",
            UnitCommand::Reboot { .. } => "Reboot",
            UnitCommand::SelfTest => "SelfTest",
            UnitCommand::EmergencyStop { .. } => "EmergencyStop",
        }
    }

    /// Whether the kind is critical regardless of the envelope flag
    pub fn is_intrinsically_critical(&self) -> bool {
        matches!(self, UnitCommand::Reboot { .. } | UnitCommand::Configure { .. })
    }
}

impl SwarmCommand {
    /// Kind name used in audit records
    pub fn kind_name(&self) -> &'static str {
        match self {
            SwarmCommand::FormationMove { .. } => "FormationMove",
            SwarmCommand::AreaScan { .. } => "AreaScan",
            SwarmCommand::ReconfigureMesh { .. } => "ReconfigureMesh",
            SwarmCommand::SyncExecute { .. } => "SyncExecute",
            SwarmCommand::AbortAll { .. } => "AbortAll",
            SwarmCommand::RecallAll { .. } => "RecallAll",
        }
    }

    /// Whether this command cancels in-flight fan-outs for its swarm
    pub fn cancels_in_flight(&self) -> bool {
        matches!(self, SwarmCommand::AbortAll { .. } | SwarmCommand::RecallAll { .. })
    }
}

/// What a command targets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CommandBody {
    /// One unit
    Unit {
        /// Target unit identifier
        target_unit_id: String,
        /// Command
        command: UnitCommand,
    },
    /// A set of units acting as one swarm
    Swarm {
        /// Swarm identifier
        swarm_id: String,
        /// Target unit identifiers
        target_unit_ids: Vec<String>,
        /// Command
        command: SwarmCommand,
    },
}

/// Command envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Command {
    /// Unique command identifier
    pub command_id: String,
    /// Issue time (nanoseconds since epoch)
    pub issued_at_ns: u64,
    /// Operator-declared criticality; can escalate, never downgrade
    pub critical: bool,
    /// Target and payload
    pub body: CommandBody,
}

impl Command {
    /// Build a single-unit command
    pub fn unit(command_id: &str, target_unit_id: &str, command: UnitCommand, issued_at_ns: u64) -> Self {
        Self {
            command_id: command_id.to_string(),
            issued_at_ns,
            critical: false,
            body: CommandBody::Unit {
                target_unit_id: target_unit_id.to_string(),
                command,
            },
        }
    }

    /// Build a swarm command
    pub fn swarm(
        command_id: &str,
        swarm_id: &str,
        target_unit_ids: Vec<String>,
        command: SwarmCommand,
        issued_at_ns: u64,
    ) -> Self {
        Self {
            command_id: command_id.to_string(),
            issued_at_ns,
            critical: false,
            body: CommandBody::Swarm {
                swarm_id: swarm_id.to_string(),
                target_unit_ids,
                command,
            },
        }
    }

    /// Mark the command critical
    pub fn escalated(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Effective criticality: the flag OR the kind's intrinsic criticality
    pub fn is_critical(&self) -> bool {
        self.critical
            || match &self.body {
                CommandBody::Unit { command, .. } => command.is_intrinsically_critical(),
                CommandBody::Swarm { .. } => false,
            }
    }

    /// Whether the command takes the immediate single-signature path
    pub fn is_emergency(&self) -> bool {
        matches!(
            &self.body,
            CommandBody::Unit {
                command: UnitCommand::EmergencyStop { .. },
                ..
            } | CommandBody::Swarm {
                command: SwarmCommand::AbortAll { .. },
                ..
            }
        )
    }

    /// Units this command is delivered to
    pub fn target_unit_ids(&self) -> Vec<String> {
        match &self.body {
            CommandBody::Unit { target_unit_id, .. } => vec![target_unit_id.clone()],
            CommandBody::Swarm { target_unit_ids, .. } => target_unit_ids.clone(),
        }
    }

    /// Number of targets
    pub fn target_count(&self) -> usize {
        match &self.body {
            CommandBody::Unit { .. } => 1,
            CommandBody::Swarm { target_unit_ids, .. } => target_unit_ids.len(),
        }
    }

    /// Swarm identifier, for swarm commands
    pub fn swarm_id(&self) -> Option<&str> {
        match &self.body {
            CommandBody::Unit { .. } => None,
            CommandBody::Swarm { swarm_id, .. } => Some(swarm_id),
        }
    }

    /// Truth-Chain this command is audited on
    pub fn audit_chain(&self) -> String {
        match &self.body {
            CommandBody::Unit { target_unit_id, .. } => format!("unit/{target_unit_id}"),
            CommandBody::Swarm { swarm_id, .. } => format!("swarm/{swarm_id}"),
        }
    }

    /// Kind name used in audit records
    pub fn kind_name(&self) -> &'static str {
        match &self.body {
            CommandBody::Unit { command, .. } => command.kind_name(),
            CommandBody::Swarm { command, .. } => command.kind_name(),
        }
    }

    /// Deterministic bytes that authorities sign
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = COMMAND_DOMAIN.to_vec();
        serde_json::to_writer(&mut bytes, self)?;
        Ok(bytes)
    }

    /// BLAKE3 hash of the canonical bytes
    pub fn command_hash(&self) -> Result<[u8; 32], serde_json::Error> {
        Ok(*blake3::hash(&self.canonical_bytes()?).as_bytes())
    }
}

/// One authority signature over canonical command bytes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandSignature {
    /// Signing identity
    pub identity_id: String,
    /// Ed25519 signature bytes
    pub signature: Vec<u8>,
}

/// Ordered signatures, at most one per identity
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SignatureSet {
    signatures: Vec<CommandSignature>,
}

impl SignatureSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signature; returns false if the identity already signed
    pub fn push(&mut self, identity_id: &str, signature: Vec<u8>) -> bool {
        if self.signatures.iter().any(|s| s.identity_id == identity_id) {
            return false;
        }
        self.signatures.push(CommandSignature {
            identity_id: identity_id.to_string(),
            signature,
        });
        true
    }

    /// Signatures in insertion order.
    ///
    /// A deserialized set may still contain duplicates; verification dedupes
    /// again.
    pub fn iter(&self) -> impl Iterator<Item = &CommandSignature> {
        self.signatures.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// Command plus its authority signatures, as submitted to the router
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignedCommand {
    /// The command
    pub command: Command,
    /// Authority signatures over [`Command::canonical_bytes`]
    pub signatures: SignatureSet,
}

impl SignedCommand {
    /// Wrap a command with no signatures
    pub fn new(command: Command) -> Self {
        Self {
            command,
            signatures: SignatureSet::new(),
        }
    }

    /// Sign the canonical bytes as `identity_id`
    pub fn sign(&mut self, identity_id: &str, key: &SigningKey) -> Result<bool, serde_json::Error> {
        let bytes = self.command.canonical_bytes()?;
        Ok(self
            .signatures
            .push(identity_id, key.sign(&bytes).to_bytes().to_vec()))
    }
}
