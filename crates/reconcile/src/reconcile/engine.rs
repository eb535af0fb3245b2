//! Deterministic reconciliation of multi-source metric candidates.
//!
//! Given every source's candidate for one metric, the engine produces a
//! single trusted value, a confidence grade, and an audit trail. The
//! algorithm is a pure function of its inputs and the clock: no I/O, no
//! shared state, no blocking. [`ReconciliationEngine::reconcile_at`] takes
//! the clock explicitly, so the whole decision is replayable.
//!
//! Decision ladder:
//! 1. staleness filter per metric (unparsable timestamps are kept)
//! 2. tight agreement (relative spread within the primary tolerance)
//!    -> High, value = median
//! 3. trust plus recency scoring; top two within the secondary tolerance
//!    -> Medium, value = median
//! 4. otherwise -> Low with `conflicting_sources`, value = top-scored

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::debug;

use crate::models::{
    Candidate, Confidence, Diagnostics, Issue, ProvenanceEntry, ReconciliationResult,
};

/// Relative spread under which sources count as agreeing.
const PRIMARY_TOLERANCE: f64 = 0.15;

/// Relative gap between the top two trust-scored values that still yields a
/// medium-confidence result.
const SECONDARY_TOLERANCE: f64 = 0.30;

/// Staleness window for metrics without an entry in the table.
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 3600);

/// Trust assigned to sources missing from the trust table.
const DEFAULT_SOURCE_TRUST: f64 = 0.5;

/// Hours over which recency decays from full weight to none.
const RECENCY_DECAY_HOURS: f64 = 48.0;

/// Share of the candidate score contributed by recency.
const RECENCY_WEIGHT: f64 = 0.3;

/// Recency weight for candidates whose timestamp cannot be parsed.
const UNPARSABLE_RECENCY_WEIGHT: f64 = 0.5;

lazy_static! {
    /// How much each known source is trusted, from historical accuracy.
    static ref SOURCE_TRUST: HashMap<&'static str, f64> = {
        let mut trust = HashMap::new();
        trust.insert("nse_india", 0.95);
        trust.insert("bse_india", 0.90);
        trust.insert("fmp", 0.80);
        trust.insert("yfinance", 0.78);
        trust.insert("alpha_vantage", 0.75);
        trust.insert("gnews", 0.70);
        trust.insert("newsapi", 0.70);
        trust.insert("tavily", 0.65);
        trust
    };

    /// How old an observation may be, per metric, before it is dropped.
    static ref MAX_AGE_WINDOWS: HashMap<&'static str, Duration> = {
        let mut windows = HashMap::new();
        windows.insert("price", Duration::from_secs(5 * 60));
        windows.insert("market_cap", Duration::from_secs(48 * 3600));
        windows.insert("revenue", Duration::from_secs(24 * 3600));
        windows.insert("ebitda", Duration::from_secs(24 * 3600));
        windows.insert("pe_ratio", Duration::from_secs(24 * 3600));
        windows.insert("roe", Duration::from_secs(24 * 3600));
        windows
    };
}

/// Tunable thresholds and tables for the engine.
#[derive(Clone, Debug)]
pub struct ReconcileConfig {
    /// Relative spread for the high-confidence agreement check.
    pub primary_tolerance: f64,
    /// Relative top-two gap for the medium-confidence check.
    pub secondary_tolerance: f64,
    /// Per-source trust scores; unlisted sources get 0.5.
    pub source_trust: HashMap<String, f64>,
    /// Per-metric staleness windows.
    pub max_age: HashMap<String, Duration>,
    /// Staleness window for metrics not listed in `max_age`.
    pub default_max_age: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            primary_tolerance: PRIMARY_TOLERANCE,
            secondary_tolerance: SECONDARY_TOLERANCE,
            source_trust: SOURCE_TRUST
                .iter()
                .map(|(source, trust)| (source.to_string(), *trust))
                .collect(),
            max_age: MAX_AGE_WINDOWS
                .iter()
                .map(|(metric, window)| (metric.to_string(), *window))
                .collect(),
            default_max_age: DEFAULT_MAX_AGE,
        }
    }
}

/// Deterministic reconciliation engine.
///
/// Never returns an error and never panics on candidate data: degraded
/// inputs degrade the confidence grade instead.
pub struct ReconciliationEngine {
    config: ReconcileConfig,
}

impl ReconciliationEngine {
    /// Engine with the built-in tolerances and tables.
    pub fn new() -> Self {
        Self::with_config(ReconcileConfig::default())
    }

    /// Engine with custom thresholds or tables.
    pub fn with_config(config: ReconcileConfig) -> Self {
        Self { config }
    }

    /// Reconcile against the real clock.
    pub fn reconcile(&self, metric_key: &str, candidates: &[Candidate]) -> ReconciliationResult {
        self.reconcile_at(metric_key, candidates, Utc::now())
    }

    /// Reconcile with an explicit clock.
    ///
    /// Identical inputs and `now` always produce an identical result.
    pub fn reconcile_at(
        &self,
        metric_key: &str,
        candidates: &[Candidate],
        now: DateTime<Utc>,
    ) -> ReconciliationResult {
        if candidates.is_empty() {
            return degenerate(Confidence::VeryLow, Issue::MissingData);
        }

        // Staleness filter. A timestamp that does not parse keeps its
        // candidate: dropping data over a formatting quirk is worse than
        // letting the scoring below discount it.
        let max_age = self.max_age(metric_key).as_secs_f64();
        let valid: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| match c.fetched_at_time() {
                Some(fetched) => age_seconds(now, fetched) <= max_age,
                None => true,
            })
            .collect();

        if valid.len() < candidates.len() {
            debug!(
                "Reconcile '{}': dropped {} stale of {} candidates (window {}s)",
                metric_key,
                candidates.len() - valid.len(),
                candidates.len(),
                max_age
            );
        }
        if valid.is_empty() {
            return degenerate(Confidence::VeryLow, Issue::StaleData);
        }

        let values: Vec<f64> = valid.iter().filter_map(|c| c.value).collect();
        if values.is_empty() {
            return degenerate(Confidence::Low, Issue::NoNumericValues);
        }

        let n = values.len();
        let mut sorted = values.clone();
        sorted.sort_by(f64::total_cmp);
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        let mean = values.iter().sum::<f64>() / n as f64;
        let std_dev = if n > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64).sqrt()
        } else {
            0.0
        };
        let min_val = sorted[0];
        let max_val = sorted[n - 1];

        // A zero median means the relative spread is undefined; treat it as
        // maximal disagreement and fall through to trust scoring.
        let variance = if median != 0.0 {
            (max_val - min_val) / median.abs()
        } else {
            f64::INFINITY
        };

        if variance <= self.config.primary_tolerance {
            debug!(
                "Reconcile '{}': {} sources agree (variance {:.4})",
                metric_key,
                valid.len(),
                variance
            );
            return ReconciliationResult {
                value: Some(median),
                confidence: Confidence::High,
                provenance: top_provenance(&valid, 3),
                issue: None,
                diagnostics: Diagnostics {
                    median: Some(median),
                    mean: Some(mean),
                    std_dev: Some(std_dev),
                    variance: Some(variance),
                    top_source: None,
                    candidate_count: valid.len(),
                },
            };
        }

        // Sources disagree; rank candidates by trust plus recency.
        let mut scored: Vec<(f64, &Candidate)> = valid
            .iter()
            .filter(|c| c.value.is_some())
            .map(|c| {
                let trust = self.trust(&c.source);
                let recency_weight = match c.fetched_at_time() {
                    Some(fetched) => {
                        let age_hours = age_seconds(now, fetched) / 3600.0;
                        (1.0 - age_hours / RECENCY_DECAY_HOURS).max(0.0)
                    }
                    None => UNPARSABLE_RECENCY_WEIGHT,
                };
                (trust + recency_weight * RECENCY_WEIGHT, *c)
            })
            .collect();
        // Stable sort: equal scores keep candidate order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let Some(&(_, top)) = scored.first() else {
            // values was non-empty, so at least one candidate scored
            return degenerate(Confidence::Low, Issue::ConflictingSources);
        };

        if scored.len() >= 2 {
            let top_value = top.value.unwrap_or(0.0);
            let second_value = scored[1].1.value.unwrap_or(0.0);

            // A zero on either side would make the ratio meaningless
            if top_value != 0.0 && second_value != 0.0 {
                let secondary_variance = (top_value - second_value).abs() / top_value.abs();

                if secondary_variance <= self.config.secondary_tolerance {
                    debug!(
                        "Reconcile '{}': top two within secondary tolerance ({:.4}), led by '{}'",
                        metric_key, secondary_variance, top.source
                    );
                    return ReconciliationResult {
                        value: Some(median),
                        confidence: Confidence::Medium,
                        provenance: top_provenance(&valid, 3),
                        issue: None,
                        diagnostics: Diagnostics {
                            median: Some(median),
                            variance: Some(variance),
                            top_source: Some(top.source.clone()),
                            candidate_count: valid.len(),
                            ..Default::default()
                        },
                    };
                }
            }
        }

        debug!(
            "Reconcile '{}': conflicting sources (variance {:.4}), falling back to '{}'",
            metric_key, variance, top.source
        );
        ReconciliationResult {
            value: top.value,
            confidence: Confidence::Low,
            provenance: top_provenance(&valid, 1),
            issue: Some(Issue::ConflictingSources),
            diagnostics: Diagnostics {
                variance: Some(variance),
                top_source: Some(top.source.clone()),
                candidate_count: valid.len(),
                ..Default::default()
            },
        }
    }

    fn max_age(&self, metric_key: &str) -> Duration {
        self.config
            .max_age
            .get(metric_key)
            .copied()
            .unwrap_or(self.config.default_max_age)
    }

    fn trust(&self, source: &str) -> f64 {
        self.config
            .source_trust
            .get(source)
            .copied()
            .unwrap_or(DEFAULT_SOURCE_TRUST)
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Signed age in seconds; future timestamps come out negative and therefore
/// always pass the staleness check.
fn age_seconds(now: DateTime<Utc>, fetched: DateTime<Utc>) -> f64 {
    (now - fetched).num_milliseconds() as f64 / 1000.0
}

/// A result with no value: grade plus issue, nothing else.
fn degenerate(confidence: Confidence, issue: Issue) -> ReconciliationResult {
    ReconciliationResult {
        value: None,
        confidence,
        provenance: Vec::new(),
        issue: Some(issue),
        diagnostics: Diagnostics::default(),
    }
}

/// The `k` most recently fetched candidates as audit entries.
///
/// Sorts on the raw `fetched_at` string, descending: ISO timestamps order
/// chronologically that way, and unparsable ones order deterministically
/// instead of being dropped.
fn top_provenance(candidates: &[&Candidate], k: usize) -> Vec<ProvenanceEntry> {
    let mut by_recency = candidates.to_vec();
    by_recency.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
    by_recency
        .into_iter()
        .take(k)
        .map(ProvenanceEntry::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{SecondsFormat, TimeZone};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn hours_ago(now: DateTime<Utc>, hours: i64) -> String {
        (now - chrono::Duration::hours(hours)).to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn candidate(source: &str, value: Option<f64>, fetched_at: String) -> Candidate {
        Candidate::new(source.to_string(), value, fetched_at)
    }

    #[test]
    fn test_empty_candidates_is_missing_data() {
        let engine = ReconciliationEngine::new();
        let result = engine.reconcile_at("market_cap", &[], fixed_now());

        assert_eq!(result.value, None);
        assert_eq!(result.confidence, Confidence::VeryLow);
        assert_eq!(result.issue, Some(Issue::MissingData));
        assert!(result.provenance.is_empty());
        assert_eq!(result.diagnostics, Diagnostics::default());
    }

    #[test]
    fn test_all_stale_is_stale_data() {
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![
            candidate("fmp", Some(100.0), hours_ago(now, 72)),
            candidate("nse_india", Some(101.0), hours_ago(now, 96)),
        ];

        let result = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(result.value, None);
        assert_eq!(result.confidence, Confidence::VeryLow);
        assert_eq!(result.issue, Some(Issue::StaleData));
    }

    #[test]
    fn test_unparsable_timestamp_is_kept() {
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        // The parsable candidate is stale; the garbled one must survive
        let candidates = vec![
            candidate("fmp", Some(100.0), hours_ago(now, 72)),
            candidate("nse_india", Some(101.0), "last tuesday".to_string()),
        ];

        let result = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.value, Some(101.0));
        assert_eq!(result.diagnostics.candidate_count, 1);
    }

    #[test]
    fn test_no_numeric_values_is_low() {
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![
            candidate("gnews", None, hours_ago(now, 1)),
            candidate("newsapi", None, hours_ago(now, 2)),
        ];

        let result = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(result.value, None);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.issue, Some(Issue::NoNumericValues));
        assert!(result.provenance.is_empty());
    }

    #[test]
    fn test_identical_values_reach_high() {
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![
            candidate("fmp", Some(250.0), hours_ago(now, 1)),
            candidate("nse_india", Some(250.0), hours_ago(now, 2)),
            candidate("bse_india", Some(250.0), hours_ago(now, 3)),
        ];

        let result = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.value, Some(250.0));
        assert_eq!(result.diagnostics.variance, Some(0.0));
        assert_eq!(result.issue, None);
    }

    #[test]
    fn test_staleness_drop_then_agreement() {
        // Two fresh market caps agree; a 72h-old outlier is dropped first
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![
            candidate("fmp", Some(100.0), hours_ago(now, 0)),
            candidate("nse_india", Some(105.0), hours_ago(now, 0)),
            candidate("gnews", Some(260.0), hours_ago(now, 72)),
        ];

        let result = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.value, Some(102.5));
        assert_eq!(result.diagnostics.candidate_count, 2);
        let variance = result.diagnostics.variance.unwrap();
        assert!((variance - 5.0 / 102.5).abs() < 1e-9);
    }

    #[test]
    fn test_trusted_fresh_source_wins_conflict() {
        // 100 from an unknown 40h-old source vs 150 from a fresh exchange:
        // spread is far outside both tolerances, so the top-scored value
        // wins with low confidence
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![
            candidate("some_blog", Some(100.0), hours_ago(now, 40)),
            candidate("nse_india", Some(150.0), hours_ago(now, 1)),
        ];

        let result = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.value, Some(150.0));
        assert_eq!(result.issue, Some(Issue::ConflictingSources));
        assert_eq!(result.diagnostics.top_source.as_deref(), Some("nse_india"));
        assert_eq!(result.provenance.len(), 1);
    }

    #[test]
    fn test_secondary_tolerance_yields_medium_median() {
        // variance (120-100)/110 = 0.18 fails the primary check; the top
        // two differ by 20% of the top value, within the secondary band
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![
            candidate("source_one", Some(100.0), hours_ago(now, 0)),
            candidate("source_two", Some(120.0), hours_ago(now, 0)),
        ];

        let result = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(result.confidence, Confidence::Medium);
        assert_eq!(result.value, Some(110.0));
        assert_eq!(result.issue, None);
        assert_eq!(result.diagnostics.top_source.as_deref(), Some("source_one"));
        // Medium diagnostics carry median and variance but not mean/std_dev
        assert!(result.diagnostics.mean.is_none());
        assert!(result.diagnostics.std_dev.is_none());
        assert!(result.diagnostics.median.is_some());
    }

    #[test]
    fn test_zero_median_is_conflict_not_crash() {
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![
            candidate("fmp", Some(-5.0), hours_ago(now, 1)),
            candidate("nse_india", Some(5.0), hours_ago(now, 1)),
        ];

        let result = engine.reconcile_at("pe_ratio", &candidates, now);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.issue, Some(Issue::ConflictingSources));
        assert_eq!(result.diagnostics.variance, Some(f64::INFINITY));
    }

    #[test]
    fn test_single_zero_value_is_conflict() {
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![candidate("fmp", Some(0.0), hours_ago(now, 1))];

        let result = engine.reconcile_at("pe_ratio", &candidates, now);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.value, Some(0.0));
        assert_eq!(result.issue, Some(Issue::ConflictingSources));
    }

    #[test]
    fn test_age_exactly_at_window_is_kept() {
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![candidate("fmp", Some(100.0), hours_ago(now, 48))];

        let result = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.diagnostics.candidate_count, 1);
    }

    #[test]
    fn test_future_timestamp_is_kept() {
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![candidate("fmp", Some(100.0), hours_ago(now, -1))];

        let result = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn test_default_window_applies_to_unknown_metric() {
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![candidate("fmp", Some(3.2), hours_ago(now, 30))];

        let result = engine.reconcile_at("dividend_yield", &candidates, now);
        assert_eq!(result.issue, Some(Issue::StaleData));
    }

    #[test]
    fn test_price_window_is_five_minutes() {
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![candidate("fmp", Some(101.5), hours_ago(now, 1))];

        let result = engine.reconcile_at("price", &candidates, now);
        assert_eq!(result.issue, Some(Issue::StaleData));
    }

    #[test]
    fn test_provenance_is_most_recent_first_capped_at_three() {
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![
            candidate("fmp", Some(100.0), hours_ago(now, 4)),
            candidate("nse_india", Some(101.0), hours_ago(now, 1)),
            candidate("bse_india", Some(102.0), hours_ago(now, 3)),
            candidate("yfinance", Some(103.0), hours_ago(now, 2)),
        ];

        let result = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.provenance.len(), 3);
        assert_eq!(result.provenance[0].source, "nse_india");
        assert_eq!(result.provenance[1].source, "yfinance");
        assert_eq!(result.provenance[2].source, "bse_india");
    }

    #[test]
    fn test_conflict_provenance_is_recency_not_score() {
        // The trusted exchange wins the value, but the audit trail points
        // at whatever was fetched last
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![
            candidate("nse_india", Some(150.0), hours_ago(now, 40)),
            candidate("some_blog", Some(100.0), hours_ago(now, 1)),
        ];

        let result = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.value, Some(150.0));
        assert_eq!(result.provenance.len(), 1);
        assert_eq!(result.provenance[0].source, "some_blog");
        assert_eq!(result.provenance[0].value, Some(100.0));
    }

    #[test]
    fn test_reconcile_at_is_idempotent() {
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        let candidates = vec![
            candidate("fmp", Some(100.0), hours_ago(now, 40)),
            candidate("nse_india", Some(150.0), hours_ago(now, 1)),
            candidate("gnews", None, hours_ago(now, 2)),
        ];

        let first = engine.reconcile_at("market_cap", &candidates, now);
        let second = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_tolerances() {
        let engine = ReconciliationEngine::with_config(ReconcileConfig {
            primary_tolerance: 0.5,
            ..Default::default()
        });
        let now = fixed_now();
        let candidates = vec![
            candidate("source_one", Some(100.0), hours_ago(now, 0)),
            candidate("source_two", Some(120.0), hours_ago(now, 0)),
        ];

        // 0.18 spread passes a loosened primary tolerance
        let result = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn test_custom_trust_table() {
        let mut trust = HashMap::new();
        trust.insert("house_feed".to_string(), 0.99);
        let engine = ReconciliationEngine::with_config(ReconcileConfig {
            source_trust: trust,
            ..Default::default()
        });
        let now = fixed_now();
        let candidates = vec![
            candidate("nse_india", Some(100.0), hours_ago(now, 1)),
            candidate("house_feed", Some(200.0), hours_ago(now, 1)),
        ];

        // nse_india is unlisted in the custom table, so the house feed
        // outscores it and wins the conflict
        let result = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(result.value, Some(200.0));
        assert_eq!(result.diagnostics.top_source.as_deref(), Some("house_feed"));
    }

    #[test]
    fn test_equal_scores_keep_input_order() {
        let engine = ReconciliationEngine::new();
        let now = fixed_now();
        // Same unknown trust, same timestamp: the sort is stable, so the
        // first-listed candidate stays on top
        let candidates = vec![
            candidate("feed_a", Some(100.0), hours_ago(now, 0)),
            candidate("feed_b", Some(200.0), hours_ago(now, 0)),
        ];

        let result = engine.reconcile_at("market_cap", &candidates, now);
        assert_eq!(result.diagnostics.top_source.as_deref(), Some("feed_a"));
    }
}
