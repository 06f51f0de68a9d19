//! Weighted trust votes.
//!
//! A peer's aggregated trust is an exponentially decayed weighted mean of
//! its observations:
//!
//! ```text
//! sum    <- sum * decay + weight * value
//! weight <- weight * decay + weight_i
//! trust  =  sum / weight
//! ```
//!
//! seeded with a full-trust prior of weight `prior_weight`, so a single bad
//! sample cannot sink a peer with no history while sustained bad evidence
//! always does.

use aethercore_core::ByzantinePolicy;
use serde::{Deserialize, Serialize};

/// Evidence about a peer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Observation {
    /// Scored telemetry sample
    Telemetry {
        /// Trust score in [0, 1]
        score: f32,
    },
    /// Telemetry whose attestation failed
    SpoofedTelemetry,
    /// Command signature that failed verification
    SignatureFailure,
}

impl Observation {
    /// Vote value and weight under `policy`
    pub fn vote(&self, policy: &ByzantinePolicy) -> (f64, f64) {
        match self {
            Observation::Telemetry { score } => {
                let value = if score.is_finite() {
                    f64::from(*score).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                (value, policy.telemetry_weight)
            }
            Observation::SpoofedTelemetry => (0.0, policy.spoofed_weight),
            Observation::SignatureFailure => (0.0, policy.signature_failure_weight),
        }
    }
}

/// Running decayed weighted mean for one peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedTrust {
    weighted_sum: f64,
    total_weight: f64,
    observations: u64,
}

impl WeightedTrust {
    /// Start from the full-trust prior
    pub fn new(policy: &ByzantinePolicy) -> Self {
        Self {
            weighted_sum: policy.prior_weight,
            total_weight: policy.prior_weight,
            observations: 0,
        }
    }

    /// Fold one observation in
    pub fn record(&mut self, observation: &Observation, policy: &ByzantinePolicy) {
        let (value, weight) = observation.vote(policy);
        self.weighted_sum = self.weighted_sum * policy.decay + weight * value;
        self.total_weight = self.total_weight * policy.decay + weight;
        self.observations += 1;
    }

    /// Aggregated trust in [0, 1]; 1.0 before any weight accumulates
    pub fn aggregate(&self) -> f64 {
        if self.total_weight <= f64::EPSILON {
            1.0
        } else {
            (self.weighted_sum / self.total_weight).clamp(0.0, 1.0)
        }
    }

    /// Number of observations folded in
    pub fn observations(&self) -> u64 {
        self.observations
    }
}
