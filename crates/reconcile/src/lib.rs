//! Metricfold Reconciliation Crate
//!
//! This crate turns several unreliable views of one financial metric into a
//! single trusted value with a confidence grade and an audit trail.
//!
//! # Overview
//!
//! The reconciliation crate supports:
//! - Fetching one metric from many sources behind per-source token buckets
//!   and circuit breakers
//! - Structural schema validation of raw adapter payloads
//! - Deterministic staleness, agreement, and trust reconciliation with a
//!   graded confidence outcome
//! - Provenance and latency bookkeeping for every observation
//!
//! # Architecture
//!
//! ```text
//! +----------------------+
//! |    SourceRegistry    |  (one fetch round per metric)
//! +----------------------+
//!            |
//!            v
//! +----------------------+
//! |    TokenBucket +     |  (per-source quota and fail-fast)
//! |    CircuitBreaker    |
//! +----------------------+
//!            |
//!            v
//! +----------------------+
//! |    SourceAdapter     |  (nse_india, fmp, yfinance, ...)
//! +----------------------+
//!            |
//!            v
//! +----------------------+
//! |   SchemaValidator    |  (structural gate on raw payloads)
//! +----------------------+
//!            |
//!            v
//! +----------------------+
//! |      Candidate       |  (typed observation)
//! +----------------------+
//!            |
//!            v
//! +----------------------+
//! | ReconciliationEngine |  (staleness, agreement, trust)
//! +----------------------+
//!            |
//!            v
//! +----------------------+
//! | ReconciliationResult |  (value, confidence, provenance)
//! +----------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Candidate`] - One source's claim about one metric
//! - [`SourceObservation`] - Validated wire payload from an adapter
//! - [`ReconciliationResult`] - Reconciled value, grade, and audit trail
//! - [`Confidence`] - High / Medium / Low / VeryLow grade
//! - [`MetricReport`] - Result plus the per-source fetch trace
//! - [`FetchError`] - Per-source fetch failures (never reconciliation ones)

pub mod adapter;
pub mod errors;
pub mod models;
pub mod reconcile;
pub mod registry;

// Re-export all public types from models
pub use models::{
    Candidate, Confidence, Diagnostics, Issue, ProvenanceEntry, ProvenanceRecord,
    ReconciliationResult, SourceObservation,
};

// Re-export adapter types
pub use adapter::{SourceAdapter, SourceQuota};

// Re-export error types
pub use errors::FetchError;

// Re-export reconciliation types
pub use reconcile::{
    composite_confidence, cross_validate, CrossCheck, ReconcileConfig, ReconciliationEngine,
};

// Re-export registry types
pub use registry::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, FetchTrace, MetricReport,
    MetricsCollector, OperationStats, ProvenanceTracker, RateLimiter, Schema, SchemaValidator,
    SkipReason, SourceAttempt, SourceRegistry, SourceStatus, TokenBucket,
};
