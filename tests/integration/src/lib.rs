//! Cross-crate integration tests for the C2 trust core
//!
//! This test suite validates:
//! - Command submission through quorum, fan-out and Truth-Chain audit
//! - Telemetry ingest through replay checks, scoring and the trust mesh
//! - Ledger tamper detection, halting and recovery over a shared log
//! - Byzantine unit detection, quarantine and authorized release (Red Cell)

pub mod test_utils;

#[cfg(test)]
mod command_pipeline_tests;

#[cfg(test)]
mod telemetry_pipeline_tests;

#[cfg(test)]
mod chain_of_trust_tests;

#[cfg(test)]
mod red_cell_assault;
