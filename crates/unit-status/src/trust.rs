//! Telemetry trust scoring
//!
//! This module implements trust scoring for unit telemetry based on:
//! - Attestation verification (a failed token is an absolute override)
//! - Staleness (> 30s = degraded, hyperbolic decay that never reaches zero)
//! - Signal quality (connectivity, battery, completeness, operational state)
//!
//! Scoring is a pure function of the status, the current time, the
//! [`TelemetrySettings`] and the attestation verifier.

use crate::types::{
    AttestationToken, ConnectivityState, OperationalState, UnitStatus, UnitTelemetry,
};
use aethercore_core::TelemetrySettings;
use aethercore_identity::IdentityRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Trust level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustLevel {
    /// Fresh telemetry, quality at or above the high threshold
    High,
    /// Fresh telemetry, quality at or above the medium threshold
    Medium,
    /// Fresh telemetry, quality below the medium threshold
    Low,
    /// Stale telemetry (or timestamp too far in the future)
    Degraded,
    /// Attestation present but invalid
    Spoofed,
}

/// Scoring outcome
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustAssessment {
    /// Trust score (0.0 to 1.0)
    pub score: f32,
    /// Classification
    pub level: TrustLevel,
}

impl TrustAssessment {
    /// Spoofed override
    pub const SPOOFED: TrustAssessment = TrustAssessment {
        score: 0.0,
        level: TrustLevel::Spoofed,
    };
}

/// Checks attestation tokens
pub trait AttestationVerifier: Send + Sync {
    /// Whether `token` is a valid attestation of `status`
    fn verify(&self, status: &UnitStatus, token: &AttestationToken) -> bool;
}

/// Verifies tokens as Ed25519 signatures by the unit's own registered identity
pub struct RegistryAttestor {
    registry: Arc<IdentityRegistry>,
}

impl RegistryAttestor {
    /// Create an attestor over `registry`
    pub fn new(registry: Arc<IdentityRegistry>) -> Self {
        Self { registry }
    }
}

impl AttestationVerifier for RegistryAttestor {
    fn verify(&self, status: &UnitStatus, token: &AttestationToken) -> bool {
        if token.signer_id != status.platform_id {
            return false;
        }
        let digest = status.attestation_digest();
        match self
            .registry
            .verify_signature(&token.signer_id, &digest, &token.signature)
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(unit_id = %status.platform_id, error = %e, "Attestation rejected");
                false
            }
        }
    }
}

/// Telemetry trust scorer
pub struct TelemetryTrustScorer {
    settings: TelemetrySettings,
    verifier: Arc<dyn AttestationVerifier>,
}

impl TelemetryTrustScorer {
    /// Create a scorer
    pub fn new(settings: TelemetrySettings, verifier: Arc<dyn AttestationVerifier>) -> Self {
        Self { settings, verifier }
    }

    /// Settings in force
    pub fn settings(&self) -> &TelemetrySettings {
        &self.settings
    }

    /// Score a unit status at `now_ns`
    pub fn score(&self, status: &UnitStatus, now_ns: u64) -> TrustAssessment {
        let attested = match &status.telemetry.attestation {
            Some(token) => {
                if !self.verifier.verify(status, token) {
                    return TrustAssessment::SPOOFED;
                }
                true
            }
            None => false,
        };

        let mut quality = quality_score(status);
        if !attested {
            quality *= self.settings.unattested_penalty as f64;
        }

        let age_ns = self.effective_age_ns(&status.telemetry, now_ns);
        let stale_ns = self.settings.stale_threshold_ns();
        if age_ns > stale_ns {
            let decayed = quality * self.settings.degraded_ceiling as f64 * (stale_ns as f64 / age_ns as f64);
            return TrustAssessment {
                score: (decayed as f32).clamp(f32::MIN_POSITIVE, 1.0),
                level: TrustLevel::Degraded,
            };
        }

        let score = (quality as f32).clamp(0.0, 1.0);
        let level = if score >= self.settings.high_threshold {
            TrustLevel::High
        } else if score >= self.settings.medium_threshold {
            TrustLevel::Medium
        } else {
            TrustLevel::Low
        };
        TrustAssessment { score, level }
    }

    /// Age of a sample; future timestamps beyond the skew tolerance count as
    /// staleness of the same magnitude
    fn effective_age_ns(&self, telemetry: &UnitTelemetry, now_ns: u64) -> u64 {
        if now_ns >= telemetry.timestamp_ns {
            now_ns - telemetry.timestamp_ns
        } else {
            let ahead = telemetry.timestamp_ns - now_ns;
            if ahead <= self.settings.max_future_skew_ns() {
                0
            } else {
                ahead
            }
        }
    }
}

fn connectivity_factor(state: ConnectivityState) -> f64 {
    match state {
        ConnectivityState::Connected => 1.0,
        ConnectivityState::Degraded => 0.7,
        ConnectivityState::Unknown => 0.5,
        ConnectivityState::Disconnected => 0.2,
    }
}

fn operational_factor(state: OperationalState) -> f64 {
    match state {
        OperationalState::Ready | OperationalState::Active => 1.0,
        OperationalState::Standby => 0.9,
        OperationalState::Maintenance => 0.6,
        OperationalState::Offline => 0.3,
        OperationalState::Fault => 0.2,
    }
}

/// Signal quality in (0, 1]; never decreases when any input improves
fn quality_score(status: &UnitStatus) -> f64 {
    let t = &status.telemetry;

    let battery = match t.battery_percent {
        Some(pct) => 0.5 + 0.5 * (f64::from(pct.min(100)) / 100.0),
        None => 1.0,
    };

    let present = [
        t.pressure_psi.is_some(),
        t.temperature_c.is_some(),
        t.battery_percent.is_some(),
        t.gps.is_some(),
    ]
    .iter()
    .filter(|p| **p)
    .count();
    // Completeness contributes up to 20%
    let completeness = 0.8 + 0.2 * (present as f64 / 4.0);

    connectivity_factor(t.connectivity) * battery * completeness * operational_factor(status.operational_state)
}
