//! Per-source circuit breaker for fault tolerance.
//!
//! Implements the circuit breaker pattern to stop hammering a source that is
//! failing. The circuit has three states:
//!
//! - **Closed**: Normal operation, requests are allowed through.
//! - **Open**: Source is failing, requests are blocked.
//! - **HalfOpen**: Testing if the source has recovered.
//!
//! Transitions only ever run Closed -> Open -> HalfOpen -> Closed (or back
//! to Open); an open circuit never closes without passing through HalfOpen.
//! Each breaker guards exactly one source and carries its own lock, so
//! breakers for different sources never contend. State is in-memory and
//! resets on application restart.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::FetchError;

/// Default number of failures before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time to wait before transitioning from Open to HalfOpen.
const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of successful requests needed to close the circuit from HalfOpen.
const HALF_OPEN_SUCCESS_THRESHOLD: u32 = 2;

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests are allowed.
    Closed,
    /// Source is failing - requests are blocked.
    Open,
    /// Testing recovery - limited requests allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Mutable breaker state, guarded by the instance lock.
#[derive(Debug)]
struct CircuitInner {
    /// Current circuit state.
    state: CircuitState,
    /// Number of consecutive failures.
    failure_count: u32,
    /// Number of consecutive successes in HalfOpen state.
    half_open_successes: u32,
    /// Time of the last failure (for recovery timeout).
    last_failure: Option<Instant>,
}

impl CircuitInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_successes: 0,
            last_failure: None,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time to wait before testing recovery.
    pub recovery_timeout: Duration,
    /// Number of successes needed to close from HalfOpen.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            half_open_success_threshold: HALF_OPEN_SUCCESS_THRESHOLD,
        }
    }
}

/// Circuit breaker for a single source.
///
/// Thread-safe: one long-lived instance per source, shared by every
/// concurrent caller targeting that source.
pub struct CircuitBreaker {
    /// Source this breaker guards.
    source: String,
    /// Mutable state.
    inner: Mutex<CircuitInner>,
    /// Configuration.
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a breaker with default settings.
    pub fn new(source: &str) -> Self {
        Self::with_config(source, CircuitBreakerConfig::default())
    }

    /// Create a breaker with custom configuration.
    pub fn with_config(source: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            source: source.to_string(),
            inner: Mutex::new(CircuitInner::new()),
            config,
        }
    }

    /// The source this breaker guards.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Lock the state mutex, recovering from poison if necessary.
    ///
    /// Recovering is safe here: the worst case is slightly stale circuit
    /// state, which beats panicking every caller of the source.
    fn lock_inner(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex for '{}' was poisoned, recovering", self.source);
            poisoned.into_inner()
        })
    }

    /// Check if a request is allowed through.
    ///
    /// Returns true if the circuit is Closed or HalfOpen (test requests).
    /// Returns false while the circuit is Open, except that once the
    /// recovery timeout has fully elapsed since the last failure the circuit
    /// transitions to HalfOpen and the request is allowed as a probe.
    pub fn is_allowed(&self) -> bool {
        let mut inner = self.lock_inner();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if let Some(last_failure) = inner.last_failure {
                    if last_failure.elapsed() > self.config.recovery_timeout {
                        info!(
                            "Circuit breaker: transitioning '{}' from open to half_open",
                            self.source
                        );
                        inner.state = CircuitState::HalfOpen;
                        inner.half_open_successes = 0;
                        return true;
                    }
                }
                false
            }
        }
    }

    /// Run `operation` under this breaker.
    ///
    /// While the circuit is open the operation is never invoked and
    /// [`FetchError::CircuitOpen`] comes back immediately. Otherwise the
    /// operation runs without holding the breaker lock, and its outcome is
    /// recorded afterwards. A future dropped mid-flight records neither
    /// success nor failure.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        if !self.is_allowed() {
            return Err(FetchError::CircuitOpen {
                source: self.source.clone(),
            });
        }

        let result = operation().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }

    /// Record a successful request.
    ///
    /// In Closed state: resets the failure count.
    /// In HalfOpen state: counts toward closing the circuit.
    pub fn record_success(&self) {
        let mut inner = self.lock_inner();

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
                debug!(
                    "Circuit breaker: success for '{}', failure count reset",
                    self.source
                );
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                debug!(
                    "Circuit breaker: success for '{}' in half_open ({}/{})",
                    self.source, inner.half_open_successes, self.config.half_open_success_threshold
                );

                if inner.half_open_successes >= self.config.half_open_success_threshold {
                    info!(
                        "Circuit breaker: closing circuit for '{}' after {} successes",
                        self.source, inner.half_open_successes
                    );
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.half_open_successes = 0;
                    inner.last_failure = None;
                }
            }
            CircuitState::Open => {
                // is_allowed should have moved us to HalfOpen first
                debug!(
                    "Circuit breaker: unexpected success for '{}' in open state",
                    self.source
                );
            }
        }
    }

    /// Record a failed request.
    ///
    /// Increments the failure count and may open the circuit. In HalfOpen
    /// state any failure immediately reopens it.
    pub fn record_failure(&self) {
        let mut inner = self.lock_inner();

        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    info!(
                        "Circuit breaker: opening circuit for '{}' after {} failures",
                        self.source, inner.failure_count
                    );
                    inner.state = CircuitState::Open;
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{})",
                        self.source, inner.failure_count, self.config.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: reopening circuit for '{}' after failure in half_open",
                    self.source
                );
                inner.state = CircuitState::Open;
                inner.half_open_successes = 0;
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: additional failure for '{}' (already open)",
                    self.source
                );
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock_inner().state
    }

    /// Consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.lock_inner().failure_count
    }

    /// Reset the circuit to Closed.
    pub fn reset(&self) {
        let mut inner = self.lock_inner();
        info!(
            "Circuit breaker: manually resetting circuit for '{}'",
            self.source
        );
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.half_open_successes = 0;
        inner.last_failure = None;
    }

    #[cfg(test)]
    fn rewind_last_failure(&self, by: Duration) {
        let mut inner = self.lock_inner();
        if let Some(last_failure) = inner.last_failure {
            inner.last_failure = Some(last_failure - by);
        }
    }
}
