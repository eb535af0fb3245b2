//! Source registry orchestrating metric fetches.
//!
//! The registry fans one metric request out to every registered source,
//! applying rate limiting, circuit breaking, and schema validation per
//! source, then reconciles whatever survived into a single graded value.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;

use super::{
    FetchTrace, MetricsCollector, OperationStats, ProvenanceTracker, RateLimiter, SchemaValidator,
    SkipReason, SourceStatus,
};
use crate::adapter::SourceAdapter;
use crate::errors::FetchError;
use crate::models::{Candidate, ProvenanceRecord, ReconciliationResult, SourceObservation};
use crate::reconcile::ReconciliationEngine;

/// How long one round waits on an exhausted bucket before skipping the source.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// One reconciled metric plus the trail of how it was fetched.
#[derive(Clone, Debug, Serialize)]
pub struct MetricReport {
    pub company_id: String,
    pub metric: String,
    pub result: ReconciliationResult,
    pub trace: FetchTrace,
}

/// What one source contributed to a fetch round.
enum SourceOutcome {
    Skipped(SkipReason),
    Failed(FetchError),
    Fetched(Candidate),
}

/// Registry of metric sources and the machinery guarding them.
pub struct SourceRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    limiter: RateLimiter,
    validator: SchemaValidator,
    engine: ReconciliationEngine,
    provenance: ProvenanceTracker,
    metrics: MetricsCollector,
    wait_timeout: Duration,
}

impl SourceRegistry {
    /// Registry with default components; the limiter takes each adapter's
    /// declared quota.
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        let limiter = RateLimiter::with_sources(
            adapters
                .iter()
                .map(|adapter| (adapter.id().to_string(), adapter.quota())),
        );
        Self::with_components(
            adapters,
            limiter,
            SchemaValidator::adapter_response(),
            ReconciliationEngine::new(),
            DEFAULT_WAIT_TIMEOUT,
        )
    }

    /// Registry with custom components.
    pub fn with_components(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        limiter: RateLimiter,
        validator: SchemaValidator,
        engine: ReconciliationEngine,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            adapters,
            limiter,
            validator,
            engine,
            provenance: ProvenanceTracker::new(),
            metrics: MetricsCollector::new(),
            wait_timeout,
        }
    }

    /// Fetch one metric from every source and reconcile the candidates.
    ///
    /// Each source runs its own path:
    /// 1. Take a rate-limit token, waiting up to the configured budget;
    ///    an exhausted budget skips the source for this round
    /// 2. Call the adapter through its circuit breaker; an open circuit
    ///    skips the source without invoking it
    /// 3. Validate and decode the payload; a bad payload discards the
    ///    candidate without touching the breaker
    /// 4. Record latency, provenance, and the trace entry
    ///
    /// One source failing, stalling, or lying never aborts the round; it
    /// just leaves fewer candidates for the engine.
    pub async fn fetch_metric(&self, company_id: &str, metric: &str) -> MetricReport {
        let outcomes = join_all(
            self.adapters
                .iter()
                .map(|adapter| self.fetch_one(Arc::clone(adapter), company_id, metric)),
        )
        .await;

        let mut trace = FetchTrace::new();
        let mut candidates = Vec::new();
        for (adapter, outcome) in self.adapters.iter().zip(outcomes) {
            let source = adapter.id();
            match outcome {
                SourceOutcome::Skipped(reason) => trace.record_skip(source, reason),
                SourceOutcome::Failed(error) => trace.record_error(source, error.to_string()),
                SourceOutcome::Fetched(candidate) => {
                    trace.record_success(source);
                    candidates.push(candidate);
                }
            }
        }

        let result = self.engine.reconcile(metric, &candidates);
        info!(
            "Fetched '{}' for '{}': {} candidates, confidence {} [{}]",
            metric,
            company_id,
            candidates.len(),
            result.confidence,
            trace.summary()
        );

        MetricReport {
            company_id: company_id.to_string(),
            metric: metric.to_string(),
            result,
            trace,
        }
    }

    async fn fetch_one(
        &self,
        adapter: Arc<dyn SourceAdapter>,
        company_id: &str,
        metric: &str,
    ) -> SourceOutcome {
        let source = adapter.id();

        if !self.limiter.acquire(source, 1.0) {
            debug!("Source '{}' is out of tokens, waiting", source);
            if !self.limiter.wait_for(source, 1.0, self.wait_timeout).await {
                warn!("Source '{}' stayed rate limited, skipping this round", source);
                return SourceOutcome::Skipped(SkipReason::RateLimited);
            }
        }

        let start = Instant::now();
        let fetched = match self.limiter.breaker(source) {
            Some(breaker) => {
                breaker
                    .call(|| adapter.fetch_metric(company_id, metric))
                    .await
            }
            None => adapter.fetch_metric(company_id, metric).await,
        };
        let latency = start.elapsed();

        let payload = match fetched {
            Ok(payload) => payload,
            Err(error @ FetchError::CircuitOpen { .. }) => {
                debug!("{}, skipping this round", error);
                return SourceOutcome::Skipped(SkipReason::CircuitOpen);
            }
            Err(error) => {
                warn!("Source '{}' failed: {}", source, error);
                self.metrics.record(source, latency, true);
                return SourceOutcome::Failed(error);
            }
        };

        let observation = match self.decode(source, payload) {
            Ok(observation) => observation,
            Err(error) => {
                warn!("Source '{}' returned a bad payload: {}", source, error);
                self.metrics.record(source, latency, true);
                return SourceOutcome::Failed(error);
            }
        };

        self.metrics.record(source, latency, false);
        self.provenance
            .add(&metric_key(company_id, metric), observation.to_provenance());
        SourceOutcome::Fetched(observation.to_candidate())
    }

    /// Schema gate plus typed decode for one adapter payload.
    fn decode(&self, source: &str, payload: Value) -> Result<SourceObservation, FetchError> {
        self.validator.validate(&payload)?;
        serde_json::from_value(payload).map_err(|e| FetchError::ValidationFailed {
            message: format!("Malformed observation from '{}': {}", source, e),
        })
    }

    /// Rate and circuit status for every configured source.
    pub fn status(&self) -> BTreeMap<String, SourceStatus> {
        self.limiter.status()
    }

    /// Latency and error stats per source.
    pub fn metrics(&self) -> BTreeMap<String, OperationStats> {
        self.metrics.get_all()
    }

    /// Every raw observation recorded for one company's metric.
    pub fn provenance(&self, company_id: &str, metric: &str) -> Vec<ProvenanceRecord> {
        self.provenance.get(&metric_key(company_id, metric))
    }

    /// Close a source's circuit by hand.
    pub fn reset_circuit(&self, source: &str) {
        if let Some(breaker) = self.limiter.breaker(source) {
            breaker.reset();
        }
    }

    /// The registered adapters.
    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }
}

fn metric_key(company_id: &str, metric: &str) -> String {
    format!("{}:{}", company_id, metric)
}
