//! Command dispatcher for unit and swarm operations
//!
//! Fans an [`AuthorizedCommand`] out to its targets concurrently, with a
//! timeout and bounded retries per target and an overall deadline for the
//! whole batch, then aggregates the outcome. The acceptance record is
//! written before any unit is contacted; the result record after.
//!
//! Swarm fan-outs register a cancellation channel keyed by swarm id.
//! `AbortAll`, `RecallAll` and [`CommandDispatcher::abort_swarm`] signal
//! every fan-out in flight for that swarm: tasks make no further attempts,
//! while a delivery already on the wire finishes or times out.

#![warn(missing_docs)]

use crate::command_types::{Command, CommandBody};
use crate::ledger::{record_accepted, record_result, CommandRecord, DispatchRecord};
use crate::quorum::AuthorizedCommand;
use aethercore_core::{current_time_ns, DispatchSettings, LedgerError, TruthChainRecorder};
use aethercore_stream::StreamIntegrityTracker;
use aethercore_trust_mesh::TrustMesh;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Dispatcher errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Swarm batch exceeds limit; nothing was dispatched
    #[error("Swarm batch size {got} exceeds limit {limit}")]
    BatchTooLarge {
        /// Actual batch size
        got: usize,
        /// Maximum allowed batch size
        limit: usize,
    },

    /// The same unit appears twice in the target list
    #[error("Duplicate target unit: {0}")]
    DuplicateTarget(String),

    /// Target list is empty
    #[error("Command has no target units")]
    EmptyTargets,

    /// Acceptance could not be recorded; nothing was dispatched
    #[error("Command acceptance not recorded: {0}")]
    Ledger(#[from] LedgerError),

    /// Units were contacted but the outcome could not be recorded
    #[error("Dispatch result for {} not recorded: {source}", .report.command_id)]
    ResultNotRecorded {
        /// Outcome that failed to land on the ledger
        report: Box<DispatchReport>,
        /// Ledger failure
        #[source]
        source: LedgerError,
    },
}

/// Transport failure for one delivery attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Unit could not be reached; the attempt may be retried
    #[error("Unit not reachable: {0}")]
    Unreachable(String),

    /// Unit answered and refused the command; never retried
    #[error("Unit rejected command: {0}")]
    Rejected(String),
}

/// What a unit receives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandFrame {
    /// Authorized command
    pub command: Command,
    /// Command hash (BLAKE3 of the canonical bytes), hex
    pub command_hash: String,
    /// Identities whose signatures counted
    pub authority_signers: Vec<String>,
}

/// Unit acknowledgment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitAck {
    /// Acknowledging unit
    pub unit_id: String,
    /// Unit-side receive time (nanoseconds since epoch)
    pub received_at_ns: u64,
}

/// Delivery seam to field units
#[async_trait]
pub trait UnitTransport: Send + Sync {
    /// Deliver one frame to one unit and wait for its acknowledgment
    async fn deliver(&self, unit_id: &str, frame: &CommandFrame) -> Result<UnitAck, TransportError>;
}

/// Command dispatch result for a single unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum UnitDispatchResult {
    /// Command acknowledged
    Success {
        /// Unit identifier
        unit_id: String,
        /// Attempts made
        attempts: u32,
        /// Dispatch timestamp
        timestamp_ns: u64,
    },
    /// Command dispatch failed
    Failed {
        /// Unit identifier
        unit_id: String,
        /// Failure reason
        reason: String,
        /// Attempts made
        attempts: u32,
        /// Failure timestamp
        timestamp_ns: u64,
    },
    /// Command dispatch timeout
    Timeout {
        /// Unit identifier
        unit_id: String,
        /// Attempts made
        attempts: u32,
        /// Timeout timestamp
        timestamp_ns: u64,
    },
    /// Unit was never contacted (quarantined or integrity-compromised)
    Refused {
        /// Unit identifier
        unit_id: String,
        /// Refusal reason
        reason: String,
        /// Refusal timestamp
        timestamp_ns: u64,
    },
    /// Swarm abort observed before acknowledgment
    Aborted {
        /// Unit identifier
        unit_id: String,
        /// Attempts made before the abort
        attempts: u32,
        /// Abort timestamp
        timestamp_ns: u64,
    },
}

impl UnitDispatchResult {
    /// Check if dispatch was successful
    pub fn is_success(&self) -> bool {
        matches!(self, UnitDispatchResult::Success { .. })
    }

    /// Get unit ID
    pub fn unit_id(&self) -> &str {
        match self {
            UnitDispatchResult::Success { unit_id, .. }
            | UnitDispatchResult::Failed { unit_id, .. }
            | UnitDispatchResult::Timeout { unit_id, .. }
            | UnitDispatchResult::Refused { unit_id, .. }
            | UnitDispatchResult::Aborted { unit_id, .. } => unit_id,
        }
    }

    /// Delivery attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            UnitDispatchResult::Success { attempts, .. }
            | UnitDispatchResult::Failed { attempts, .. }
            | UnitDispatchResult::Timeout { attempts, .. }
            | UnitDispatchResult::Aborted { attempts, .. } => *attempts,
            UnitDispatchResult::Refused { .. } => 0,
        }
    }
}

/// Aggregate dispatch status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DispatchStatus {
    /// Every target acknowledged
    Success,
    /// Some or all targets did not acknowledge
    PartialFailure {
        /// Targets without an acknowledgment, in target order
        failed: Vec<String>,
    },
}

/// Outcome of one dispatch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchReport {
    /// Command identifier
    pub command_id: String,
    /// Audit chain of the command
    pub chain_id: String,
    /// Aggregate status
    pub status: DispatchStatus,
    /// Per-target outcomes, in target order
    pub results: Vec<UnitDispatchResult>,
    /// Sequence index of the `CommandAccepted` entry
    pub accepted_index: u64,
    /// Sequence index of the `CommandResult` entry once recorded
    pub result_index: Option<u64>,
    /// Aggregation timestamp
    pub timestamp_ns: u64,
}

impl DispatchReport {
    /// Number of acknowledged targets
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Get completion percentage
    pub fn completion_percent(&self) -> f32 {
        if self.results.is_empty() {
            return 0.0;
        }
        (self.success_count() as f32 / self.results.len() as f32) * 100.0
    }

    /// Check if all units succeeded
    pub fn all_success(&self) -> bool {
        self.status == DispatchStatus::Success
    }

    /// Result for one unit
    pub fn result_for(&self, unit_id: &str) -> Option<&UnitDispatchResult> {
        self.results.iter().find(|r| r.unit_id() == unit_id)
    }
}

/// Cancellation channels of in-flight swarm fan-outs
#[derive(Debug, Default)]
struct InFlight {
    next_token: AtomicU64,
    swarms: Mutex<HashMap<String, Vec<(u64, watch::Sender<bool>)>>>,
}

impl InFlight {
    fn register(&self, swarm_id: &str) -> (watch::Receiver<bool>, InFlightGuard<'_>) {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(false);
        if let Ok(mut swarms) = self.swarms.lock() {
            swarms.entry(swarm_id.to_string()).or_default().push((token, tx));
        }
        let guard = InFlightGuard {
            in_flight: self,
            swarm_id: swarm_id.to_string(),
            token,
        };
        (rx, guard)
    }

    fn cancel(&self, swarm_id: &str) -> usize {
        let Ok(swarms) = self.swarms.lock() else {
            return 0;
        };
        swarms.get(swarm_id).map_or(0, |senders| {
            for (_, tx) in senders {
                tx.send_replace(true);
            }
            senders.len()
        })
    }

    fn remove(&self, swarm_id: &str, token: u64) {
        if let Ok(mut swarms) = self.swarms.lock() {
            if let Some(senders) = swarms.get_mut(swarm_id) {
                senders.retain(|(t, _)| *t != token);
                if senders.is_empty() {
                    swarms.remove(swarm_id);
                }
            }
        }
    }
}

struct InFlightGuard<'a> {
    in_flight: &'a InFlight,
    swarm_id: String,
    token: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.swarm_id, self.token);
    }
}

/// Command dispatcher
pub struct CommandDispatcher {
    settings: DispatchSettings,
    transport: Arc<dyn UnitTransport>,
    recorder: Arc<TruthChainRecorder>,
    mesh: Option<Arc<TrustMesh>>,
    integrity: Option<Arc<StreamIntegrityTracker>>,
    in_flight: InFlight,
}

impl CommandDispatcher {
    /// Create a new command dispatcher
    pub fn new(
        settings: DispatchSettings,
        transport: Arc<dyn UnitTransport>,
        recorder: Arc<TruthChainRecorder>,
    ) -> Self {
        Self {
            settings,
            transport,
            recorder,
            mesh: None,
            integrity: None,
            in_flight: InFlight::default(),
        }
    }

    /// Refuse targets the trust mesh has quarantined
    pub fn with_trust_mesh(mut self, mesh: Arc<TrustMesh>) -> Self {
        self.mesh = Some(mesh);
        self
    }

    /// Refuse targets whose telemetry stream is flagged compromised
    pub fn with_integrity_tracker(mut self, tracker: Arc<StreamIntegrityTracker>) -> Self {
        self.integrity = Some(tracker);
        self
    }

    /// Settings in force
    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Signal every in-flight fan-out for `swarm_id` to stop; returns how many were signalled
    pub fn abort_swarm(&self, swarm_id: &str) -> usize {
        let signalled = self.in_flight.cancel(swarm_id);
        if signalled > 0 {
            warn!(swarm_id = %swarm_id, fan_outs = signalled, "Swarm fan-out aborted");
        }
        signalled
    }

    fn validate_targets(&self, targets: &[String]) -> Result<(), DispatchError> {
        if targets.is_empty() {
            return Err(DispatchError::EmptyTargets);
        }
        if targets.len() > self.settings.max_batch_size {
            return Err(DispatchError::BatchTooLarge {
                got: targets.len(),
                limit: self.settings.max_batch_size,
            });
        }
        let mut seen = HashSet::new();
        for unit_id in targets {
            if !seen.insert(unit_id.as_str()) {
                return Err(DispatchError::DuplicateTarget(unit_id.clone()));
            }
        }
        Ok(())
    }

    fn refusal_reason(&self, unit_id: &str) -> Option<&'static str> {
        if self.mesh.as_ref().is_some_and(|m| m.is_quarantined(unit_id)) {
            return Some("unit quarantined");
        }
        if self
            .integrity
            .as_ref()
            .is_some_and(|t| t.is_stream_compromised(unit_id))
        {
            return Some("chain discontinuity detected");
        }
        None
    }

    /// Dispatch an authorized command to all of its targets
    pub async fn dispatch(&self, authorized: &AuthorizedCommand) -> Result<DispatchReport, DispatchError> {
        let command = authorized.command();
        let targets = command.target_unit_ids();
        self.validate_targets(&targets)?;

        let chain_id = command.audit_chain();
        let accepted = record_accepted(
            &self.recorder,
            &CommandRecord::accepted(authorized, current_time_ns()),
        )?;

        if let CommandBody::Swarm {
            swarm_id,
            command: swarm_command,
            ..
        } = &command.body
        {
            if swarm_command.cancels_in_flight() {
                self.abort_swarm(swarm_id);
            }
        }

        let (cancel, guard) = match command.swarm_id() {
            Some(swarm_id) => {
                let (rx, guard) = self.in_flight.register(swarm_id);
                (rx, Some(guard))
            }
            // Sender dropped at once: the receiver never reports a cancel
            None => (watch::channel(false).1, None),
        };

        let frame = Arc::new(CommandFrame {
            command: command.clone(),
            command_hash: hex::encode(authorized.command_hash()),
            authority_signers: authorized.signers().to_vec(),
        });

        let mut outcomes: HashMap<String, UnitDispatchResult> = HashMap::new();
        let mut counters: HashMap<String, Arc<AtomicU32>> = HashMap::new();
        let mut tasks = JoinSet::new();
        for unit_id in &targets {
            if let Some(reason) = self.refusal_reason(unit_id) {
                warn!(command_id = %command.command_id, unit_id = %unit_id, reason, "Target refused");
                outcomes.insert(
                    unit_id.clone(),
                    UnitDispatchResult::Refused {
                        unit_id: unit_id.clone(),
                        reason: reason.to_string(),
                        timestamp_ns: current_time_ns(),
                    },
                );
                continue;
            }
            let attempts = Arc::new(AtomicU32::new(0));
            counters.insert(unit_id.clone(), Arc::clone(&attempts));
            tasks.spawn(deliver_with_retries(
                Arc::clone(&self.transport),
                unit_id.clone(),
                Arc::clone(&frame),
                self.settings.clone(),
                cancel.clone(),
                attempts,
            ));
        }

        let deadline = Instant::now() + self.settings.overall_timeout();
        let mut deadline_hit = false;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(result))) => {
                    outcomes.insert(result.unit_id().to_string(), result);
                }
                Ok(Some(Err(e))) => error!(command_id = %command.command_id, error = %e, "Dispatch task failed"),
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    tasks.abort_all();
                    break;
                }
            }
        }
        drop(guard);

        let now = current_time_ns();
        let results: Vec<UnitDispatchResult> = targets
            .iter()
            .map(|unit_id| {
                outcomes.remove(unit_id).unwrap_or_else(|| {
                    let attempts = counters
                        .get(unit_id)
                        .map_or(0, |c| c.load(Ordering::Relaxed));
                    if deadline_hit {
                        UnitDispatchResult::Timeout {
                            unit_id: unit_id.clone(),
                            attempts,
                            timestamp_ns: now,
                        }
                    } else {
                        UnitDispatchResult::Failed {
                            unit_id: unit_id.clone(),
                            reason: "dispatch task failed".to_string(),
                            attempts,
                            timestamp_ns: now,
                        }
                    }
                })
            })
            .collect();

        let failed: Vec<String> = results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.unit_id().to_string())
            .collect();
        let status = if failed.is_empty() {
            DispatchStatus::Success
        } else {
            DispatchStatus::PartialFailure { failed }
        };

        let mut report = DispatchReport {
            command_id: command.command_id.clone(),
            chain_id,
            status,
            results,
            accepted_index: accepted.sequence,
            result_index: None,
            timestamp_ns: now,
        };

        match record_result(&self.recorder, &report.chain_id, &DispatchRecord::from_report(&report)) {
            Ok(entry) => report.result_index = Some(entry.sequence),
            Err(source) => {
                error!(command_id = %report.command_id, error = %source, "Dispatch result not recorded");
                return Err(DispatchError::ResultNotRecorded {
                    report: Box::new(report),
                    source,
                });
            }
        }

        info!(
            command_id = %report.command_id,
            chain_id = %report.chain_id,
            targets = report.results.len(),
            succeeded = report.success_count(),
            deadline_hit,
            "Dispatch complete"
        );
        Ok(report)
    }
}

enum LastFailure {
    Timeout,
    Unreachable(String),
}

/// Resolves once the receiver reports a cancel; never resolves if the sender is gone
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn deliver_with_retries(
    transport: Arc<dyn UnitTransport>,
    unit_id: String,
    frame: Arc<CommandFrame>,
    settings: DispatchSettings,
    mut cancel: watch::Receiver<bool>,
    attempts: Arc<AtomicU32>,
) -> UnitDispatchResult {
    let max_attempts = settings.max_retries.saturating_add(1);
    let mut last = LastFailure::Timeout;

    for attempt in 1..=max_attempts {
        if *cancel.borrow() {
            return UnitDispatchResult::Aborted {
                unit_id,
                attempts: attempt - 1,
                timestamp_ns: current_time_ns(),
            };
        }
        attempts.store(attempt, Ordering::Relaxed);

        match tokio::time::timeout(settings.target_timeout(), transport.deliver(&unit_id, &frame)).await {
            Ok(Ok(_ack)) => {
                return UnitDispatchResult::Success {
                    unit_id,
                    attempts: attempt,
                    timestamp_ns: current_time_ns(),
                };
            }
            Ok(Err(TransportError::Rejected(reason))) => {
                warn!(unit_id = %unit_id, reason = %reason, "Unit rejected command");
                return UnitDispatchResult::Failed {
                    unit_id,
                    reason,
                    attempts: attempt,
                    timestamp_ns: current_time_ns(),
                };
            }
            Ok(Err(TransportError::Unreachable(reason))) => {
                warn!(unit_id = %unit_id, attempt, reason = %reason, "Delivery attempt failed");
                last = LastFailure::Unreachable(reason);
            }
            Err(_) => {
                warn!(unit_id = %unit_id, attempt, "Delivery attempt timed out");
                last = LastFailure::Timeout;
            }
        }

        if attempt < max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(settings.retry_backoff()) => {}
                _ = cancelled(&mut cancel) => {}
            }
        }
    }

    let timestamp_ns = current_time_ns();
    match last {
        LastFailure::Timeout => UnitDispatchResult::Timeout {
            unit_id,
            attempts: max_attempts,
            timestamp_ns,
        },
        LastFailure::Unreachable(reason) => UnitDispatchResult::Failed {
            unit_id,
            reason,
            attempts: max_attempts,
            timestamp_ns,
        },
    }
}
