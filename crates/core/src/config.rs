//! Configuration management for the C2 trust core.
//!
//! Every tunable of the router, the telemetry scorer and the trust mesh lives
//! here so that a node can be described by one TOML document. Components take
//! their section by value; discovery and hot reload of the file are left to
//! the hosting service.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(feature = "config-file")]
use std::path::Path;

/// Complete node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identifier of this C2 node (used in audit records)
    pub node_id: String,
    /// Command fan-out settings
    pub dispatch: DispatchSettings,
    /// Command freshness window and replay memory
    pub replay: ReplaySettings,
    /// Telemetry trust scoring settings
    pub telemetry: TelemetrySettings,
    /// Weighted-trust quarantine policy
    pub byzantine: ByzantinePolicy,
}

/// Command dispatch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Maximum number of targets in one dispatch
    pub max_batch_size: usize,
    /// Timeout for a single delivery attempt to one unit
    pub target_timeout_ms: u64,
    /// Bound on the whole fan-out; pending targets are recorded as timed out
    pub overall_timeout_ms: u64,
    /// Retries after a failed or timed-out attempt
    pub max_retries: u32,
    /// Pause between attempts to the same unit
    pub retry_backoff_ms: u64,
}

/// Command replay protection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    /// Oldest accepted command issue time, relative to local time
    pub max_command_age_ms: u64,
    /// Clock skew tolerated for commands issued ahead of local time
    pub max_future_skew_ms: u64,
    /// Upper bound on remembered command ids
    pub max_tracked_commands: usize,
}

/// Telemetry trust scoring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Age after which telemetry is Degraded
    pub stale_threshold_ms: u64,
    /// Clock skew tolerated for timestamps ahead of local time
    pub max_future_skew_ms: u64,
    /// Minimum quality score for High
    pub high_threshold: f32,
    /// Minimum quality score for Medium (below is Low)
    pub medium_threshold: f32,
    /// Fraction of the fresh score retained right after the stale threshold
    pub degraded_ceiling: f32,
    /// Multiplier applied when telemetry carries no attestation token
    pub unattested_penalty: f32,
}

/// Explicit Byzantine quarantine policy.
///
/// The aggregated trust of a peer is an exponentially decayed weighted mean
/// of its observations, seeded with a fully trusted prior of weight
/// `prior_weight`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ByzantinePolicy {
    /// Aggregated trust below this value quarantines the peer
    pub quarantine_threshold: f64,
    /// Per-observation decay applied to older votes (0, 1]
    pub decay: f64,
    /// Weight of the initial full-trust prior
    pub prior_weight: f64,
    /// Observations required before a quarantine decision is allowed
    pub min_observations: u64,
    /// Vote weight of a scored telemetry sample
    pub telemetry_weight: f64,
    /// Vote weight of spoofed telemetry (vote value 0.0)
    pub spoofed_weight: f64,
    /// Vote weight of an invalid command signature (vote value 0.0)
    pub signature_failure_weight: f64,
    /// Number of distinct release authorities needed to lift a quarantine
    pub release_quorum: usize,
    /// Identity ids allowed to sign quarantine releases
    pub release_authorities: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "c2-node-001".to_string(),
            dispatch: DispatchSettings::default(),
            replay: ReplaySettings::default(),
            telemetry: TelemetrySettings::default(),
            byzantine: ByzantinePolicy::default(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            target_timeout_ms: 2_000,
            overall_timeout_ms: 10_000,
            max_retries: 2,
            retry_backoff_ms: 100,
        }
    }
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            max_command_age_ms: 300_000,
            max_future_skew_ms: 30_000,
            max_tracked_commands: 10_000,
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            stale_threshold_ms: 30_000,
            max_future_skew_ms: 5_000,
            high_threshold: 0.8,
            medium_threshold: 0.5,
            degraded_ceiling: 0.5,
            unattested_penalty: 0.6,
        }
    }
}

impl Default for ByzantinePolicy {
    fn default() -> Self {
        Self {
            quarantine_threshold: 0.3,
            decay: 0.9,
            prior_weight: 2.0,
            min_observations: 3,
            telemetry_weight: 1.0,
            spoofed_weight: 3.0,
            signature_failure_weight: 2.0,
            release_quorum: 2,
            release_authorities: Vec::new(),
        }
    }
}

impl DispatchSettings {
    /// Per-attempt timeout
    pub fn target_timeout(&self) -> Duration {
        Duration::from_millis(self.target_timeout_ms)
    }

    /// Overall fan-out bound
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }

    /// Backoff between attempts
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl ReplaySettings {
    /// Command age limit in nanoseconds
    pub fn max_command_age_ns(&self) -> u64 {
        self.max_command_age_ms.saturating_mul(1_000_000)
    }

    /// Future skew tolerance in nanoseconds
    pub fn max_future_skew_ns(&self) -> u64 {
        self.max_future_skew_ms.saturating_mul(1_000_000)
    }
}

impl TelemetrySettings {
    /// Stale threshold in nanoseconds
    pub fn stale_threshold_ns(&self) -> u64 {
        self.stale_threshold_ms.saturating_mul(1_000_000)
    }

    /// Future skew tolerance in nanoseconds
    pub fn max_future_skew_ns(&self) -> u64 {
        self.max_future_skew_ms.saturating_mul(1_000_000)
    }
}

impl NodeConfig {
    /// Parse a node configuration from TOML text
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a node configuration from a TOML file
    #[cfg(feature = "config-file")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<(), CoreError> {
        let d = &self.dispatch;
        if d.max_batch_size == 0 {
            return Err(CoreError::InvalidConfig("dispatch.max_batch_size must be > 0".into()));
        }
        if d.target_timeout_ms == 0 || d.overall_timeout_ms == 0 {
            return Err(CoreError::InvalidConfig("dispatch timeouts must be > 0".into()));
        }

        let r = &self.replay;
        if r.max_command_age_ms == 0 || r.max_tracked_commands == 0 {
            return Err(CoreError::InvalidConfig(
                "replay window and capacity must be > 0".into(),
            ));
        }

        let t = &self.telemetry;
        if t.stale_threshold_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "telemetry.stale_threshold_ms must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&t.medium_threshold)
            || !(0.0..=1.0).contains(&t.high_threshold)
            || t.medium_threshold > t.high_threshold
        {
            return Err(CoreError::InvalidConfig(
                "telemetry ladder requires 0 <= medium <= high <= 1".into(),
            ));
        }
        let in_unit = |v: f32| v > 0.0 && v <= 1.0;
        if !in_unit(t.degraded_ceiling) || !in_unit(t.unattested_penalty) {
            return Err(CoreError::InvalidConfig(
                "telemetry multipliers must lie in (0, 1]".into(),
            ));
        }

        let b = &self.byzantine;
        if !(0.0..=1.0).contains(&b.quarantine_threshold) {
            return Err(CoreError::InvalidConfig(
                "byzantine.quarantine_threshold must lie in [0, 1]".into(),
            ));
        }
        if !(b.decay > 0.0 && b.decay <= 1.0) {
            return Err(CoreError::InvalidConfig("byzantine.decay must lie in (0, 1]".into()));
        }
        if b.prior_weight < 0.0
            || b.telemetry_weight <= 0.0
            || b.spoofed_weight <= 0.0
            || b.signature_failure_weight <= 0.0
        {
            return Err(CoreError::InvalidConfig("byzantine weights must be positive".into()));
        }
        if b.release_quorum == 0 {
            return Err(CoreError::InvalidConfig("byzantine.release_quorum must be > 0".into()));
        }
        Ok(())
    }
}
