//! Unit Status - Telemetry and trust scoring for AetherCore units
//!
//! This crate handles:
//! - Unit status and telemetry types (pressure, temperature, GPS, battery, connectivity)
//! - Trust scoring for telemetry (attestation, stale detection, signal quality)
//! - Per-unit trust storage ordered by validated sequence id
//! - The ingest pipeline feeding scored telemetry into the trust mesh
//!
//! # Trust Scoring
//!
//! Telemetry trust is scored based on:
//! - **Attestation**: Telemetry with an invalid token is SPOOFED
//! - **Staleness**: Telemetry > 30s old is DEGRADED
//! - **Connectivity**: Connection state impacts trust score
//! - **Completeness**: Missing optional fields reduce trust score
//!
//! # Examples
//!
//! ```no_run
//! use aethercore_core::TelemetrySettings;
//! use aethercore_identity::IdentityRegistry;
//! use aethercore_unit_status::{
//!     ConnectivityState, OperationalState, PlatformType, RegistryAttestor,
//!     TelemetryTrustScorer, UnitStatus, UnitTelemetry,
//! };
//! use std::sync::Arc;
//!
//! let registry = Arc::new(IdentityRegistry::new());
//! let scorer = TelemetryTrustScorer::new(
//!     TelemetrySettings::default(),
//!     Arc::new(RegistryAttestor::new(registry)),
//! );
//!
//! let status = UnitStatus {
//!     platform_id: "unit-1".to_string(),
//!     serial_number: "SN-001".to_string(),
//!     nickname: None,
//!     device_type: PlatformType::FTCase,
//!     operational_state: OperationalState::Ready,
//!     telemetry: UnitTelemetry {
//!         pressure_psi: Some(14.7),
//!         temperature_c: Some(20.0),
//!         battery_percent: Some(80),
//!         gps: None,
//!         connectivity: ConnectivityState::Connected,
//!         timestamp_ns: 1000,
//!         attestation: None,
//!     },
//! };
//!
//! let assessment = scorer.score(&status, 1000);
//! ```

#![warn(missing_docs)]

pub mod book;
pub mod pipeline;
pub mod trust;
pub mod types;

pub use book::{UnitTrustBook, UnitTrustRecord};
pub use pipeline::{IngestError, IngestReport, TelemetryFrame, TelemetryPipeline};
pub use trust::{
    AttestationVerifier, RegistryAttestor, TelemetryTrustScorer, TrustAssessment, TrustLevel,
};
pub use types::{
    AttestationToken, ConnectivityState, Coordinate, OperationalState, PlatformType, UnitStatus,
    UnitTelemetry,
};
