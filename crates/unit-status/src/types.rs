//! Unit status types
//!
//! This module defines the types for unit status and telemetry reported by
//! field units.

use serde::{Deserialize, Serialize};

/// Domain prefix of the attestation digest
pub const TELEMETRY_DOMAIN: &[u8] = b"4MIK-TELEMETRY-V1";

/// Platform type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlatformType {
    /// FTCase unit
    FTCase,
    /// Mobile platform
    Mobile,
    /// Fixed sensor station
    Fixed,
    /// Aerial platform
    Aerial,
    /// Unknown or unclassified
    Unknown,
}

/// Operational state of a unit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationalState {
    /// Unit is operational and ready
    Ready,
    /// Unit is active/in-mission
    Active,
    /// Unit is in standby mode
    Standby,
    /// Unit is offline or unreachable
    Offline,
    /// Unit requires maintenance
    Maintenance,
    /// Unit has fault condition
    Fault,
}

/// Connectivity state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectivityState {
    /// Connected with good signal
    Connected,
    /// Connected with degraded signal
    Degraded,
    /// Disconnected
    Disconnected,
    /// Unknown connectivity state
    Unknown,
}

/// Geographic coordinate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coordinate {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
    /// Altitude in meters (optional)
    pub alt: Option<f32>,
}

/// Signature by the unit's registered identity over its attestation digest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttestationToken {
    /// Identity that produced the signature
    pub signer_id: String,
    /// Ed25519 signature over [`UnitStatus::attestation_digest`]
    pub signature: Vec<u8>,
}

/// Unit telemetry data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitTelemetry {
    /// Pressure in PSI (optional)
    pub pressure_psi: Option<f32>,
    /// Temperature in Celsius (optional)
    pub temperature_c: Option<f32>,
    /// Battery percentage (0-100)
    pub battery_percent: Option<u8>,
    /// GPS coordinate (optional)
    pub gps: Option<Coordinate>,
    /// Connectivity state
    pub connectivity: ConnectivityState,
    /// Telemetry timestamp in nanoseconds since epoch
    pub timestamp_ns: u64,
    /// Attestation token (absent for unattested units)
    pub attestation: Option<AttestationToken>,
}

/// Complete unit status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitStatus {
    /// Platform identity id
    pub platform_id: String,
    /// Serial number
    pub serial_number: String,
    /// Unit nickname (optional)
    pub nickname: Option<String>,
    /// Device type
    pub device_type: PlatformType,
    /// Operational state
    pub operational_state: OperationalState,
    /// Telemetry data
    pub telemetry: UnitTelemetry,
}

#[derive(Serialize)]
struct AttestedView<'a> {
    platform_id: &'a str,
    serial_number: &'a str,
    device_type: PlatformType,
    operational_state: OperationalState,
    pressure_psi: Option<f32>,
    temperature_c: Option<f32>,
    battery_percent: Option<u8>,
    gps: &'a Option<Coordinate>,
    connectivity: ConnectivityState,
    timestamp_ns: u64,
}

impl UnitStatus {
    /// Digest the attestation token signs.
    ///
    /// Covers every field that feeds scoring except the token itself and the
    /// operator-assigned nickname.
    pub fn attestation_digest(&self) -> [u8; 32] {
        let t = &self.telemetry;
        let view = AttestedView {
            platform_id: &self.platform_id,
            serial_number: &self.serial_number,
            device_type: self.device_type,
            operational_state: self.operational_state,
            pressure_psi: t.pressure_psi,
            temperature_c: t.temperature_c,
            battery_percent: t.battery_percent,
            gps: &t.gps,
            connectivity: t.connectivity,
            timestamp_ns: t.timestamp_ns,
        };
        let mut hasher = blake3::Hasher::new();
        hasher.update(TELEMETRY_DOMAIN);
        // Serializing plain fields into a Vec cannot fail
        hasher.update(&serde_json::to_vec(&view).unwrap_or_default());
        *hasher.finalize().as_bytes()
    }

    /// Check if unit is operational
    pub fn is_operational(&self) -> bool {
        matches!(
            self.operational_state,
            OperationalState::Ready | OperationalState::Active | OperationalState::Standby
        )
    }
}
