//! Audit trail of ingested observations.
//!
//! Every observation that passes validation leaves a [`ProvenanceRecord`]
//! here, whether or not it ends up backing a reconciled value. The per-key
//! lists are append-only: records are never mutated, reordered, or
//! deduplicated, so an audit can replay exactly what each source said.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use log::warn;

use crate::models::ProvenanceRecord;

/// Append-only store of observation records, keyed by metric.
///
/// One long-lived instance per service; safe for concurrent appends from
/// parallel fetches. Callers choose the key granularity (plain metric name,
/// or a composite like `company:metric`).
pub struct ProvenanceTracker {
    records: Mutex<HashMap<String, Vec<ProvenanceRecord>>>,
}

impl ProvenanceTracker {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the record map, recovering from poison if necessary.
    ///
    /// An audit trail with one torn entry is still more useful than a
    /// tracker that panics every caller.
    fn lock_records(&self) -> MutexGuard<'_, HashMap<String, Vec<ProvenanceRecord>>> {
        self.records.lock().unwrap_or_else(|poisoned| {
            warn!("Provenance tracker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Append a record under `metric_key`.
    pub fn add(&self, metric_key: &str, record: ProvenanceRecord) {
        let mut records = self.lock_records();
        records.entry(metric_key.to_string()).or_default().push(record);
    }

    /// All records for `metric_key`, oldest first. Unknown keys yield an
    /// empty list.
    pub fn get(&self, metric_key: &str) -> Vec<ProvenanceRecord> {
        let records = self.lock_records();
        records.get(metric_key).cloned().unwrap_or_default()
    }

    /// Drop every record for every key.
    pub fn clear(&self) {
        let mut records = self.lock_records();
        records.clear();
    }
}

impl Default for ProvenanceTracker {
    fn default() -> Self {
        Self::new()
    }
}
