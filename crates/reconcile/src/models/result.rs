use std::fmt;

use serde::{Deserialize, Serialize};

use super::candidate::Candidate;

/// How much to trust a reconciled value. Ordered: High > Medium > Low > VeryLow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Sources agree within the primary tolerance
    High,
    /// Agreement within the secondary tolerance after trust weighting
    Medium,
    /// Sources conflict, or no numeric values were available
    Low,
    /// No usable data at all
    VeryLow,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
            Confidence::VeryLow => write!(f, "very_low"),
        }
    }
}

/// Why a result is degraded. These are data for the caller, not errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Issue {
    /// No candidates were supplied
    MissingData,
    /// Every candidate fell outside the staleness window
    StaleData,
    /// Candidates exist but none carries a numeric value
    NoNumericValues,
    /// Sources disagree beyond both tolerances
    ConflictingSources,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::MissingData => write!(f, "missing_data"),
            Issue::StaleData => write!(f, "stale_data"),
            Issue::NoNumericValues => write!(f, "no_numeric_values"),
            Issue::ConflictingSources => write!(f, "conflicting_sources"),
        }
    }
}

/// Supporting numbers behind a reconciliation decision.
///
/// Which entries are present depends on the path taken; degenerate results
/// carry an empty diagnostics block with a zero candidate count.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,

    /// Relative spread `(max - min) / |median|`; infinite when the median is zero
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variance: Option<f64>,

    /// Source of the top trust-scored candidate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_source: Option<String>,

    /// Candidates that survived the staleness filter
    pub candidate_count: usize,
}

/// One candidate's contribution to the audit trail of a result.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProvenanceEntry {
    pub source: String,
    pub value: Option<f64>,
    pub fetched_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_id: Option<String>,
}

impl From<&Candidate> for ProvenanceEntry {
    fn from(candidate: &Candidate) -> Self {
        Self {
            source: candidate.source.clone(),
            value: candidate.value,
            fetched_at: candidate.fetched_at.clone(),
            blob_id: candidate.blob_id.clone(),
        }
    }
}

/// The outcome of reconciling one metric's candidates.
///
/// Always fully populated: `confidence` and `diagnostics` are set even when
/// `value` is `None`. A missing value means the metric is unknown; callers
/// must not substitute a placeholder number.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationResult {
    /// The reconciled value, when one could be chosen
    pub value: Option<f64>,

    /// Trust grade for `value`
    pub confidence: Confidence,

    /// Candidates backing the chosen value, most recent first
    pub provenance: Vec<ProvenanceEntry>,

    /// Why the result is degraded, when it is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<Issue>,

    /// Numbers behind the decision
    pub diagnostics: Diagnostics,
}
