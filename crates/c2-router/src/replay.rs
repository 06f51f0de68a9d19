//! Command replay protection
//!
//! A signed command captured off the network verifies forever, so the
//! router also checks when it was issued and whether its id was already
//! authorized:
//! - Commands issued more than `max_command_age_ms` ago are stale
//! - Commands issued more than `max_future_skew_ms` ahead are rejected
//! - Authorized command ids are remembered until they fall out of the age
//!   window; an id forgotten by pruning can only come back as stale
//!
//! The memory is bounded by `max_tracked_commands`. When it is full of
//! fresh ids, new commands are refused rather than forgetting one early.

use crate::command_types::Command;
use aethercore_core::ReplaySettings;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

/// Replay protection error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReplayError {
    /// Issue time older than the freshness window
    #[error("Command {command_id} is stale: issued {age_ms} ms ago (max {max_age_ms} ms)")]
    Stale {
        /// Command identifier
        command_id: String,
        /// Age at check time
        age_ms: u64,
        /// Window in force
        max_age_ms: u64,
    },

    /// Issue time too far ahead of local time
    #[error("Command {command_id} issued {ahead_ms} ms in the future (max {max_skew_ms} ms)")]
    FromFuture {
        /// Command identifier
        command_id: String,
        /// Lead over local time
        ahead_ms: u64,
        /// Skew tolerance in force
        max_skew_ms: u64,
    },

    /// Command id already authorized inside the window
    #[error("Duplicate command id: {0}")]
    Duplicate(String),

    /// Too many fresh command ids to remember another
    #[error("Replay memory full ({limit} commands)")]
    CapacityExceeded {
        /// Configured bound
        limit: usize,
    },

    /// Replay memory lock was poisoned
    #[error("Replay memory lock poisoned")]
    Poisoned,
}

/// Freshness window plus bounded memory of authorized command ids
#[derive(Debug)]
pub struct CommandReplayGuard {
    settings: ReplaySettings,
    /// command id -> issued_at_ns
    seen: Mutex<HashMap<String, u64>>,
}

impl CommandReplayGuard {
    /// Create a guard
    pub fn new(settings: ReplaySettings) -> Self {
        Self {
            settings,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Settings in force
    pub fn settings(&self) -> &ReplaySettings {
        &self.settings
    }

    /// Reject a stale, future-dated or already authorized command without
    /// remembering it
    pub fn check(&self, command: &Command, now_ns: u64) -> Result<(), ReplayError> {
        self.check_window(command, now_ns)?;
        let seen = self.seen.lock().map_err(|_| ReplayError::Poisoned)?;
        if seen.contains_key(&command.command_id) {
            return Err(self.duplicate(command));
        }
        Ok(())
    }

    /// Check again and remember the command id.
    ///
    /// Of two concurrent submissions of one command only the first to commit
    /// succeeds.
    pub fn commit(&self, command: &Command, now_ns: u64) -> Result<(), ReplayError> {
        self.check_window(command, now_ns)?;
        let mut seen = self.seen.lock().map_err(|_| ReplayError::Poisoned)?;
        if seen.contains_key(&command.command_id) {
            return Err(self.duplicate(command));
        }

        if seen.len() >= self.settings.max_tracked_commands {
            let cutoff = now_ns.saturating_sub(self.settings.max_command_age_ns());
            seen.retain(|_, issued_at_ns| *issued_at_ns >= cutoff);
        }
        if seen.len() >= self.settings.max_tracked_commands {
            warn!(
                command_id = %command.command_id,
                limit = self.settings.max_tracked_commands,
                "Replay memory full, command refused"
            );
            return Err(ReplayError::CapacityExceeded {
                limit: self.settings.max_tracked_commands,
            });
        }

        seen.insert(command.command_id.clone(), command.issued_at_ns);
        Ok(())
    }

    /// Number of remembered command ids
    pub fn tracked(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn check_window(&self, command: &Command, now_ns: u64) -> Result<(), ReplayError> {
        let issued = command.issued_at_ns;
        if issued <= now_ns {
            let age_ns = now_ns - issued;
            if age_ns > self.settings.max_command_age_ns() {
                warn!(command_id = %command.command_id, age_ms = age_ns / 1_000_000, "Stale command rejected");
                return Err(ReplayError::Stale {
                    command_id: command.command_id.clone(),
                    age_ms: age_ns / 1_000_000,
                    max_age_ms: self.settings.max_command_age_ms,
                });
            }
        } else {
            let ahead_ns = issued - now_ns;
            if ahead_ns > self.settings.max_future_skew_ns() {
                warn!(command_id = %command.command_id, ahead_ms = ahead_ns / 1_000_000, "Future-dated command rejected");
                return Err(ReplayError::FromFuture {
                    command_id: command.command_id.clone(),
                    ahead_ms: ahead_ns / 1_000_000,
                    max_skew_ms: self.settings.max_future_skew_ms,
                });
            }
        }
        Ok(())
    }

    fn duplicate(&self, command: &Command) -> ReplayError {
        warn!(command_id = %command.command_id, "Replayed command rejected");
        ReplayError::Duplicate(command.command_id.clone())
    }
}

impl Default for CommandReplayGuard {
    fn default() -> Self {
        Self::new(ReplaySettings::default())
    }
}
