//! Source adapter trait definitions.
//!
//! This module defines the `SourceAdapter` trait that all upstream data
//! sources must implement, plus the quota declaration the registry uses to
//! rate-limit them.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::FetchError;

/// Request quota for one source.
///
/// The token bucket refills at `rate` tokens per second and never holds more
/// than `capacity`, so `capacity` is also the largest burst a source allows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceQuota {
    /// Sustained refill rate, in requests per second.
    pub rate: f64,

    /// Maximum burst size, in requests.
    pub capacity: f64,
}

impl SourceQuota {
    /// Quota expressed as requests per minute, bursting up to the full
    /// per-minute allowance.
    pub fn per_minute(requests: f64) -> Self {
        Self {
            rate: requests / 60.0,
            capacity: requests,
        }
    }

    /// Quota expressed as requests per day, for sources with small daily
    /// allowances (free tiers).
    pub fn per_day(requests: f64) -> Self {
        Self {
            rate: requests / 86_400.0,
            capacity: requests,
        }
    }
}

impl Default for SourceQuota {
    /// 60 requests per minute with a burst of 10.
    fn default() -> Self {
        Self {
            rate: 1.0,
            capacity: 10.0,
        }
    }
}

/// Trait for metric source adapters.
///
/// Implement this trait to feed a new upstream source into the registry.
/// The adapter owns transport (HTTP clients, API keys, response parsing up
/// to JSON); the registry owns quota, failure isolation, validation, and
/// reconciliation.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use metricfold_reconcile::{FetchError, SourceAdapter, SourceQuota};
///
/// struct FmpAdapter {
///     api_key: String,
/// }
///
/// #[async_trait]
/// impl SourceAdapter for FmpAdapter {
///     fn id(&self) -> &'static str {
///         "fmp"
///     }
///
///     fn quota(&self) -> SourceQuota {
///         SourceQuota::per_minute(100.0)
///     }
///
///     async fn fetch_metric(
///         &self,
///         company_id: &str,
///         metric: &str,
///     ) -> Result<serde_json::Value, FetchError> {
///         // call the upstream API and return the raw payload
///         # unimplemented!()
///     }
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique identifier for this source.
    ///
    /// Should be a constant string like "alpha_vantage", "fmp", "nse_india".
    /// Used for logging, circuit breaker tracking, quota lookup, and trust
    /// scoring.
    fn id(&self) -> &'static str;

    /// Request quota to apply when calling this source.
    ///
    /// The registry configures the rate limiter from this at construction.
    fn quota(&self) -> SourceQuota {
        SourceQuota::default()
    }

    /// Fetch one metric for one company.
    ///
    /// Returns the raw JSON payload exactly as the adapter assembled it; the
    /// registry validates it against the adapter response schema before any
    /// field is trusted. Errors are per-source and never abort the round.
    async fn fetch_metric(&self, company_id: &str, metric: &str) -> Result<Value, FetchError>;
}
