//! Token bucket rate limiter for metric sources.
//!
//! Implements per-source rate limiting using the token bucket algorithm.
//! Each source gets its own bucket (and its own circuit breaker) with the
//! quota the adapter declares; the source map is fixed at construction, so
//! the only locks taken at request time are per-bucket.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::adapter::SourceQuota;
use crate::registry::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

/// How often `wait_and_acquire` re-checks the bucket.
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);

lazy_static! {
    /// Published quotas of the sources this system ships with.
    static ref DEFAULT_SOURCE_QUOTAS: HashMap<&'static str, SourceQuota> = {
        let mut quotas = HashMap::new();
        quotas.insert("alpha_vantage", SourceQuota::per_day(25.0));
        quotas.insert("fmp", SourceQuota::per_minute(100.0));
        quotas.insert("gnews", SourceQuota::per_day(100.0));
        quotas.insert("newsapi", SourceQuota::per_day(100.0));
        quotas.insert("tavily", SourceQuota::per_minute(1000.0));
        quotas.insert("groq", SourceQuota::per_minute(30.0));
        quotas
    };
}

/// Mutable bucket state, guarded by the instance lock.
#[derive(Debug)]
struct BucketInner {
    /// Current number of available tokens.
    tokens: f64,
    /// Last time the bucket was refilled.
    last_update: Instant,
}

/// Token bucket for a single source.
///
/// Starts full and refills lazily: every operation first credits
/// `elapsed * rate` tokens (capped at `capacity`), so no background task is
/// needed. The token count never leaves `[0, capacity]`.
#[derive(Debug)]
pub struct TokenBucket {
    /// Token refill rate (tokens per second).
    rate: f64,
    /// Maximum bucket capacity.
    capacity: f64,
    /// Mutable state.
    inner: Mutex<BucketInner>,
}

impl TokenBucket {
    /// Create a full bucket refilling at `rate` tokens per second.
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            rate,
            capacity,
            inner: Mutex::new(BucketInner {
                tokens: capacity,
                last_update: Instant::now(),
            }),
        }
    }

    /// Create a bucket from a declared source quota.
    pub fn from_quota(quota: SourceQuota) -> Self {
        Self::new(quota.rate, quota.capacity)
    }

    /// Lock the state mutex, recovering from poison if necessary.
    ///
    /// Recovering is safe here: the worst case is a slightly wrong token
    /// count, which beats panicking every caller of the source.
    fn lock_inner(&self) -> MutexGuard<'_, BucketInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Token bucket mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Credit tokens for the time elapsed since the last update.
    fn refill(&self, inner: &mut BucketInner) {
        let now = Instant::now();
        let elapsed = now.duration_since(inner.last_update).as_secs_f64();

        inner.tokens = (inner.tokens + elapsed * self.rate).min(self.capacity);
        inner.last_update = now;
    }

    /// Try to take `tokens` immediately.
    ///
    /// Returns true and spends the tokens if enough are available, false
    /// without spending anything otherwise. Never blocks.
    pub fn try_acquire(&self, tokens: f64) -> bool {
        let mut inner = self.lock_inner();
        self.refill(&mut inner);

        if inner.tokens >= tokens {
            inner.tokens -= tokens;
            true
        } else {
            false
        }
    }

    /// Poll [`try_acquire`](Self::try_acquire) until it succeeds or
    /// `timeout` elapses.
    ///
    /// Checks once immediately, then every 100 ms; the final poll lands on
    /// the deadline, so the call always returns by `timeout`. This is the
    /// only suspending operation in the crate.
    pub async fn wait_and_acquire(&self, tokens: f64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_acquire(tokens) {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Current token count, after crediting elapsed time.
    pub fn available(&self) -> f64 {
        let mut inner = self.lock_inner();
        self.refill(&mut inner);
        inner.tokens
    }
}

/// Rate/circuit status of one configured source.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SourceStatus {
    /// Whole tokens currently available.
    pub available_tokens: u64,
    /// State of the source's circuit breaker.
    pub circuit_state: CircuitState,
}

/// Bucket plus breaker for one source.
struct SourceControl {
    bucket: TokenBucket,
    breaker: CircuitBreaker,
}

/// Per-source rate limiter.
///
/// Holds one [`TokenBucket`] and one [`CircuitBreaker`] per configured
/// source. The map never changes after construction; all mutability lives
/// inside the per-source instances, so callers hitting different sources
/// never contend on a shared lock. A source without an entry is
/// deliberately unrestricted rather than an error.
pub struct RateLimiter {
    sources: HashMap<String, SourceControl>,
}

impl RateLimiter {
    /// Create a limiter covering the built-in source quotas.
    pub fn new() -> Self {
        Self::with_sources(
            DEFAULT_SOURCE_QUOTAS
                .iter()
                .map(|(source, quota)| (source.to_string(), *quota)),
        )
    }

    /// Create a limiter for the given quotas with default breaker settings.
    pub fn with_sources<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = (String, SourceQuota)>,
    {
        Self::with_breaker_config(sources, CircuitBreakerConfig::default())
    }

    /// Create a limiter with a shared circuit breaker configuration.
    pub fn with_breaker_config<I>(sources: I, config: CircuitBreakerConfig) -> Self
    where
        I: IntoIterator<Item = (String, SourceQuota)>,
    {
        let sources = sources
            .into_iter()
            .map(|(source, quota)| {
                let control = SourceControl {
                    bucket: TokenBucket::from_quota(quota),
                    breaker: CircuitBreaker::with_config(&source, config.clone()),
                };
                (source, control)
            })
            .collect();
        Self { sources }
    }

    /// Take `tokens` from the named source's bucket without waiting.
    ///
    /// Unknown sources always succeed: no configured quota means no limit.
    pub fn acquire(&self, source: &str, tokens: f64) -> bool {
        match self.sources.get(source) {
            Some(control) => {
                let acquired = control.bucket.try_acquire(tokens);
                if !acquired {
                    debug!("Rate limiter: '{}' is out of tokens", source);
                }
                acquired
            }
            None => {
                debug!("Rate limiter: no quota for '{}', allowing", source);
                true
            }
        }
    }

    /// Wait for `tokens` from the named source's bucket, up to `timeout`.
    ///
    /// Unknown sources succeed immediately.
    pub async fn wait_for(&self, source: &str, tokens: f64, timeout: Duration) -> bool {
        match self.sources.get(source) {
            Some(control) => {
                let acquired = control.bucket.wait_and_acquire(tokens, timeout).await;
                if !acquired {
                    debug!(
                        "Rate limiter: gave up waiting {:?} for '{}'",
                        timeout, source
                    );
                }
                acquired
            }
            None => true,
        }
    }

    /// The circuit breaker guarding the named source, if one is configured.
    pub fn breaker(&self, source: &str) -> Option<&CircuitBreaker> {
        self.sources.get(source).map(|control| &control.breaker)
    }

    /// Rate/circuit status for every configured source, sorted by name.
    pub fn status(&self) -> BTreeMap<String, SourceStatus> {
        self.sources
            .iter()
            .map(|(source, control)| {
                let status = SourceStatus {
                    available_tokens: control.bucket.available() as u64,
                    circuit_state: control.breaker.state(),
                };
                (source.clone(), status)
            })
            .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_starts_full() {
        let bucket = TokenBucket::new(1.0, 10.0);

        for _ in 0..10 {
            assert!(bucket.try_acquire(1.0));
        }
        assert!(!bucket.try_acquire(1.0));
    }

    #[test]
    fn test_bucket_refills_over_time() {
        let bucket = TokenBucket::new(1.0, 1.0); // 1 token/second

        assert!(bucket.try_acquire(1.0));
        assert!(!bucket.try_acquire(1.0));

        // Simulate two seconds having passed
        bucket.lock_inner().last_update = Instant::now() - Duration::from_secs(2);

        assert!(bucket.try_acquire(1.0));
    }

    #[test]
    fn test_bucket_refill_caps_at_capacity() {
        let bucket = TokenBucket::new(100.0, 5.0);

        // A long idle period must not overfill the bucket
        bucket.lock_inner().last_update = Instant::now() - Duration::from_secs(3600);

        let available = bucket.available();
        assert!(available <= 5.0 + 1e-9, "available = {}", available);
    }

    #[test]
    fn test_bucket_failed_acquire_spends_nothing() {
        let bucket = TokenBucket::new(0.0, 3.0);

        assert!(!bucket.try_acquire(5.0));
        // The three tokens are still there
        assert!(bucket.try_acquire(3.0));
        assert!(bucket.available() >= 0.0);
    }

    #[test]
    fn test_bucket_multi_token_acquire() {
        let bucket = TokenBucket::new(0.0, 5.0);

        assert!(bucket.try_acquire(3.0));
        assert!(!bucket.try_acquire(3.0));
        assert!(bucket.try_acquire(2.0));
        assert!(!bucket.try_acquire(1.0));
    }

    #[tokio::test]
    async fn test_wait_and_acquire_succeeds_after_refill() {
        let bucket = TokenBucket::new(20.0, 1.0); // refills fast
        assert!(bucket.try_acquire(1.0));

        let acquired = bucket.wait_and_acquire(1.0, Duration::from_secs(2)).await;
        assert!(acquired);
    }

    #[tokio::test]
    async fn test_wait_and_acquire_times_out() {
        let bucket = TokenBucket::from_quota(SourceQuota::per_day(25.0));
        while bucket.try_acquire(1.0) {}

        let start = Instant::now();
        let acquired = bucket
            .wait_and_acquire(1.0, Duration::from_millis(150))
            .await;
        assert!(!acquired);
        // Returned close to the deadline, not long after
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_wait_and_acquire_immediate_when_tokens_available() {
        let bucket = TokenBucket::new(0.0, 1.0);

        let acquired = bucket.wait_and_acquire(1.0, Duration::ZERO).await;
        assert!(acquired);
    }

    #[test]
    fn test_limiter_unknown_source_is_unrestricted() {
        let limiter = RateLimiter::new();

        for _ in 0..100 {
            assert!(limiter.acquire("unconfigured_source", 1.0));
        }
    }

    #[test]
    fn test_limiter_known_source_respects_capacity() {
        let limiter = RateLimiter::with_sources(vec![(
            "small_source".to_string(),
            SourceQuota { rate: 0.0, capacity: 2.0 },
        )]);

        assert!(limiter.acquire("small_source", 1.0));
        assert!(limiter.acquire("small_source", 1.0));
        assert!(!limiter.acquire("small_source", 1.0));
    }

    #[test]
    fn test_limiter_sources_are_isolated() {
        let limiter = RateLimiter::with_sources(vec![
            ("source_a".to_string(), SourceQuota { rate: 0.0, capacity: 1.0 }),
            ("source_b".to_string(), SourceQuota { rate: 0.0, capacity: 1.0 }),
        ]);

        assert!(limiter.acquire("source_a", 1.0));
        assert!(!limiter.acquire("source_a", 1.0));

        // Exhausting source_a leaves source_b untouched
        assert!(limiter.acquire("source_b", 1.0));
    }

    #[test]
    fn test_default_table_matches_published_quotas() {
        let limiter = RateLimiter::new();
        let status = limiter.status();

        assert_eq!(status.len(), 6);
        assert_eq!(status["alpha_vantage"].available_tokens, 25);
        assert_eq!(status["fmp"].available_tokens, 100);
        assert_eq!(status["tavily"].available_tokens, 1000);
        assert_eq!(status["groq"].available_tokens, 30);
    }

    #[test]
    fn test_status_reports_circuit_state() {
        let limiter = RateLimiter::with_breaker_config(
            vec![("flaky".to_string(), SourceQuota::default())],
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            },
        );

        assert_eq!(
            limiter.status()["flaky"].circuit_state,
            CircuitState::Closed
        );

        limiter.breaker("flaky").unwrap().record_failure();
        assert_eq!(limiter.status()["flaky"].circuit_state, CircuitState::Open);
    }

    #[test]
    fn test_status_floors_partial_tokens() {
        let limiter =
            RateLimiter::with_sources(vec![("partial".to_string(), SourceQuota {
                rate: 0.0,
                capacity: 2.5,
            })]);

        assert_eq!(limiter.status()["partial"].available_tokens, 2);
    }

    #[test]
    fn test_breaker_lookup_unknown_source() {
        let limiter = RateLimiter::new();
        assert!(limiter.breaker("nobody").is_none());
        assert!(limiter.breaker("fmp").is_some());
    }

    #[tokio::test]
    async fn test_wait_for_unknown_source_returns_immediately() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        assert!(
            limiter
                .wait_for("unconfigured_source", 1.0, Duration::from_secs(30))
                .await
        );
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
