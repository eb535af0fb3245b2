//! Per-source attempt tracking for fetch diagnostics.

use serde::{Deserialize, Serialize};

/// Why a source was skipped without being called.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Circuit breaker is open for this source.
    CircuitOpen,

    /// Token bucket stayed empty for the whole wait window.
    RateLimited,
}

/// Record of a single source attempt during a fetch round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceAttempt {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
}

/// What happened to every source in one fetch round.
///
/// Attempts appear in adapter order, one entry per source, whichever way
/// the attempt ended.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FetchTrace {
    pub attempts: Vec<SourceAttempt>,
}

impl FetchTrace {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record_skip(&mut self, source: &str, reason: SkipReason) {
        self.attempts.push(SourceAttempt {
            source: source.to_string(),
            skipped: Some(reason),
            error: None,
            success: false,
        });
    }

    pub fn record_error(&mut self, source: &str, error: String) {
        self.attempts.push(SourceAttempt {
            source: source.to_string(),
            skipped: None,
            error: Some(error),
            success: false,
        });
    }

    pub fn record_success(&mut self, source: &str) {
        self.attempts.push(SourceAttempt {
            source: source.to_string(),
            skipped: None,
            error: None,
            success: true,
        });
    }

    /// One-line summary for logging.
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(|a| {
                if a.success {
                    format!("{}: SUCCESS", a.source)
                } else if let Some(skip) = &a.skipped {
                    format!("{}: SKIPPED ({:?})", a.source, skip)
                } else if let Some(err) = &a.error {
                    format!("{}: ERROR ({})", a.source, err)
                } else {
                    format!("{}: UNKNOWN", a.source)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Check if any source delivered a usable observation.
    pub fn has_success(&self) -> bool {
        self.attempts.iter().any(|a| a.success)
    }

    /// All skipped sources with their reasons.
    pub fn skip_reasons(&self) -> Vec<(&str, SkipReason)> {
        self.attempts
            .iter()
            .filter_map(|a| a.skipped.map(|s| (a.source.as_str(), s)))
            .collect()
    }

    /// All failed sources with their error messages.
    pub fn errors(&self) -> Vec<(&str, &str)> {
        self.attempts
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| (a.source.as_str(), e.as_str())))
            .collect()
    }
}
