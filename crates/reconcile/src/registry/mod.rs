//! Per-source protection and the fetch orchestrator.
//!
//! Every outbound source sits behind its own [`TokenBucket`] and
//! [`CircuitBreaker`], owned by a [`RateLimiter`] whose source map is fixed
//! at construction. [`SourceRegistry`] drives fetch rounds across sources
//! and hands the survivors to the reconciliation engine, while
//! [`ProvenanceTracker`] and [`MetricsCollector`] keep the audit and ops
//! trails.

mod circuit_breaker;
mod metrics;
mod provenance;
mod rate_limiter;
mod registry;
mod trace;
mod validator;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use metrics::{MetricsCollector, OperationStats};
pub use provenance::ProvenanceTracker;
pub use rate_limiter::{RateLimiter, SourceStatus, TokenBucket};
pub use registry::{MetricReport, SourceRegistry, DEFAULT_WAIT_TIMEOUT};
pub use trace::{FetchTrace, SkipReason, SourceAttempt};
pub use validator::{FieldType, Schema, SchemaValidator};
