//! Truth-Chain records for command audit
//!
//! Every dispatched command leaves two entries on its audit chain
//! (`unit/<id>` or `swarm/<id>`): a `CommandAccepted` record written before
//! any unit is contacted, and a `CommandResult` record with per-target
//! outcomes written after aggregation.

#![warn(missing_docs)]

use crate::command_types::Command;
use crate::dispatcher::{DispatchReport, DispatchStatus, UnitDispatchResult};
use crate::quorum::AuthorizedCommand;
use aethercore_core::{EntryKind, LedgerEntry, LedgerError, TruthChainRecorder};
use serde::{Deserialize, Serialize};

/// Command record for audit trail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandRecord {
    /// Unique command identifier
    pub command_id: String,
    /// Command kind name
    pub command_type: String,
    /// Authority tier the command was authorized under
    pub scope: String,
    /// The full command envelope
    pub command: Command,
    /// Command hash (BLAKE3 of the canonical bytes), hex
    pub command_hash: String,
    /// Identities whose signatures counted
    pub authority_signers: Vec<String>,
    /// Target unit IDs
    pub target_units: Vec<String>,
    /// Record timestamp
    pub timestamp_ns: u64,
}

impl CommandRecord {
    /// Build the acceptance record of an authorized command
    pub fn accepted(authorized: &AuthorizedCommand, timestamp_ns: u64) -> Self {
        let command = authorized.command();
        Self {
            command_id: command.command_id.clone(),
            command_type: command.kind_name().to_string(),
            scope: authorized.scope().operation_name().to_string(),
            command: command.clone(),
            command_hash: hex::encode(authorized.command_hash()),
            authority_signers: authorized.signers().to_vec(),
            target_units: command.target_unit_ids(),
            timestamp_ns,
        }
    }
}

/// Dispatch outcome record for audit trail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchRecord {
    /// Unique command identifier
    pub command_id: String,
    /// Sequence index of the matching `CommandAccepted` entry
    pub accepted_index: u64,
    /// Aggregate status
    pub status: DispatchStatus,
    /// Per-target outcomes
    pub results: Vec<UnitDispatchResult>,
    /// Record timestamp
    pub timestamp_ns: u64,
}

impl DispatchRecord {
    /// Build the result record of a finished dispatch
    pub fn from_report(report: &DispatchReport) -> Self {
        Self {
            command_id: report.command_id.clone(),
            accepted_index: report.accepted_index,
            status: report.status.clone(),
            results: report.results.clone(),
            timestamp_ns: report.timestamp_ns,
        }
    }
}

/// Append a payload as JSON
fn append_json<T: Serialize>(
    recorder: &TruthChainRecorder,
    chain_id: &str,
    value: &T,
    kind: EntryKind,
) -> Result<LedgerEntry, LedgerError> {
    let payload =
        serde_json::to_vec(value).map_err(|e| LedgerError::Serialization(e.to_string()))?;
    recorder.append(chain_id, &payload, kind)
}

/// Record that a command was accepted for dispatch
pub fn record_accepted(
    recorder: &TruthChainRecorder,
    record: &CommandRecord,
) -> Result<LedgerEntry, LedgerError> {
    append_json(
        recorder,
        &record.command.audit_chain(),
        record,
        EntryKind::CommandAccepted,
    )
}

/// Record the aggregated outcome of a dispatch
pub fn record_result(
    recorder: &TruthChainRecorder,
    chain_id: &str,
    record: &DispatchRecord,
) -> Result<LedgerEntry, LedgerError> {
    append_json(recorder, chain_id, record, EntryKind::CommandResult)
}

/// Decode a command record stored at `index` on `chain_id`
pub fn read_command_record(
    recorder: &TruthChainRecorder,
    chain_id: &str,
    index: u64,
) -> Result<CommandRecord, LedgerError> {
    let payload = recorder.get_payload(chain_id, index)?;
    serde_json::from_slice(&payload).map_err(|e| LedgerError::Serialization(e.to_string()))
}

/// Decode a dispatch record stored at `index` on `chain_id`
pub fn read_dispatch_record(
    recorder: &TruthChainRecorder,
    chain_id: &str,
    index: u64,
) -> Result<DispatchRecord, LedgerError> {
    let payload = recorder.get_payload(chain_id, index)?;
    serde_json::from_slice(&payload).map_err(|e| LedgerError::Serialization(e.to_string()))
}
