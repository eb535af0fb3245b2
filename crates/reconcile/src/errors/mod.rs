//! Error types for metric fetching and validation.
//!
//! Every variant is local to a single source: the registry reports the
//! failed source in the fetch trace and carries on with the others, so no
//! error here ever aborts a reconciliation round.

use std::fmt;

/// Errors that can occur while fetching a metric from one source.
#[derive(Debug)]
pub enum FetchError {
    /// The circuit breaker is open for this source.
    /// The source is skipped until the circuit allows a probe.
    CircuitOpen {
        /// The source with an open circuit
        source: String,
    },

    /// The token bucket stayed empty for the whole wait window.
    /// The source sits out this round; its quota is not spent.
    RateLimitTimeout {
        /// The source whose quota was exhausted
        source: String,
    },

    /// The adapter payload failed schema validation.
    /// The observation is discarded before it can become a candidate.
    ValidationFailed {
        /// Description of the validation failure
        message: String,
    },

    /// The adapter reported a failure (network, auth, upstream parse, ...).
    Source {
        /// The source that returned the error
        source: String,
        /// The error message from the adapter
        message: String,
    },

    /// The adapter call timed out on its own side.
    Timeout {
        /// The source that timed out
        source: String,
    },
}

// `thiserror` cannot derive this enum: it hardwires any field named `source`
// as the `Error::source()` cause, and these `source` fields are source IDs,
// not nested errors. Hand-written impls keep the field names and messages.
impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen { source } => write!(f, "Circuit open: {source}"),
            Self::RateLimitTimeout { source } => write!(f, "Rate limit timeout: {source}"),
            Self::ValidationFailed { message } => write!(f, "Validation failed: {message}"),
            Self::Source { source, message } => write!(f, "Source error: {source} - {message}"),
            Self::Timeout { source } => write!(f, "Timeout: {source}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Returns the source this error is attributed to, when there is one.
    ///
    /// [`ValidationFailed`](Self::ValidationFailed) carries no source of its
    /// own; the registry knows which adapter produced the payload.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            Self::CircuitOpen { source }
            | Self::RateLimitTimeout { source }
            | Self::Source { source, .. }
            | Self::Timeout { source } => Some(source),
            Self::ValidationFailed { .. } => None,
        }
    }
}
