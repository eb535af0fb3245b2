//! Operation telemetry for the fetch pipeline.
//!
//! Counts calls, errors, and latency per named operation (in practice, per
//! source). Increments are commutative, so concurrent recording from
//! parallel fetches needs no coordination beyond the single internal lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

/// Accumulated counters for one operation.
#[derive(Debug, Default)]
struct OperationInner {
    count: u64,
    errors: u64,
    total_latency_secs: f64,
    last_error: Option<DateTime<Utc>>,
}

/// Derived statistics for one operation.
///
/// `error_rate` and `avg_latency` are 0 when nothing has been recorded;
/// reading stats for an unknown operation is not an error.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct OperationStats {
    /// Total recorded calls.
    pub count: u64,
    /// Calls recorded as errors.
    pub errors: u64,
    /// `errors / count`, or 0 when count is 0.
    pub error_rate: f64,
    /// Mean latency in seconds, or 0 when count is 0.
    pub avg_latency: f64,
    /// When the most recent error was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<DateTime<Utc>>,
}

/// Thread-safe telemetry collector.
pub struct MetricsCollector {
    operations: Mutex<HashMap<String, OperationInner>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            operations: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the counter map, recovering from poison if necessary.
    fn lock_operations(&self) -> MutexGuard<'_, HashMap<String, OperationInner>> {
        self.operations.lock().unwrap_or_else(|poisoned| {
            warn!("Metrics collector mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Record one call of `operation`.
    pub fn record(&self, operation: &str, latency: Duration, error: bool) {
        let mut operations = self.lock_operations();
        let inner = operations.entry(operation.to_string()).or_default();

        inner.count += 1;
        inner.total_latency_secs += latency.as_secs_f64();
        if error {
            inner.errors += 1;
            inner.last_error = Some(Utc::now());
        }
    }

    /// Derived statistics for `operation`; all zeros when it has never been
    /// recorded.
    pub fn get_stats(&self, operation: &str) -> OperationStats {
        let operations = self.lock_operations();
        operations
            .get(operation)
            .map(Self::derive)
            .unwrap_or_default()
    }

    /// Statistics for every recorded operation, sorted by name.
    pub fn get_all(&self) -> BTreeMap<String, OperationStats> {
        let operations = self.lock_operations();
        operations
            .iter()
            .map(|(operation, inner)| (operation.clone(), Self::derive(inner)))
            .collect()
    }

    fn derive(inner: &OperationInner) -> OperationStats {
        let (error_rate, avg_latency) = if inner.count == 0 {
            (0.0, 0.0)
        } else {
            (
                inner.errors as f64 / inner.count as f64,
                inner.total_latency_secs / inner.count as f64,
            )
        };
        OperationStats {
            count: inner.count,
            errors: inner.errors,
            error_rate,
            avg_latency,
            last_error: inner.last_error,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
