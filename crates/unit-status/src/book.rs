//! Per-unit trust storage ordered by validated sequence id.

use crate::trust::TrustAssessment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Latest trust assessment of a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTrustRecord {
    /// Unit identifier
    pub unit_id: String,
    /// Sequence id of the telemetry frame this assessment came from
    pub sequence_id: u64,
    /// Assessment
    pub assessment: TrustAssessment,
    /// Scoring time (nanoseconds since epoch)
    pub scored_at_ns: u64,
}

/// Trust book with one writer slot per unit.
///
/// A write only lands if its sequence id is newer than the stored one, so
/// racing pipelines can never regress a unit to an older assessment.
#[derive(Debug, Default)]
pub struct UnitTrustBook {
    units: RwLock<HashMap<String, Arc<Mutex<Option<UnitTrustRecord>>>>>,
}

impl UnitTrustBook {
    /// Create an empty book
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, unit_id: &str) -> Option<Arc<Mutex<Option<UnitTrustRecord>>>> {
        if let Some(slot) = self.units.read().ok()?.get(unit_id) {
            return Some(Arc::clone(slot));
        }
        let mut units = self.units.write().ok()?;
        Some(Arc::clone(
            units
                .entry(unit_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        ))
    }

    /// Store `record` if it is newer than the current one; returns whether it landed
    pub fn record(&self, record: UnitTrustRecord) -> bool {
        let Some(slot) = self.slot(&record.unit_id) else {
            return false;
        };
        let Ok(mut current) = slot.lock() else {
            return false;
        };
        match current.as_ref() {
            Some(existing) if existing.sequence_id >= record.sequence_id => {
                tracing::debug!(
                    unit_id = %record.unit_id,
                    stored = existing.sequence_id,
                    offered = record.sequence_id,
                    "Out-of-order trust write discarded"
                );
                false
            }
            _ => {
                *current = Some(record);
                true
            }
        }
    }

    /// Latest record of a unit
    pub fn get(&self, unit_id: &str) -> Option<UnitTrustRecord> {
        let slot = self.units.read().ok()?.get(unit_id).cloned()?;
        let record = slot.lock().ok()?.clone();
        record
    }

    /// Number of units with a stored record
    pub fn len(&self) -> usize {
        self.units.read().map(|u| u.len()).unwrap_or(0)
    }

    /// Check if the book is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
