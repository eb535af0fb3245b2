use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::candidate::Candidate;
use super::provenance::ProvenanceRecord;

/// A validated adapter response.
///
/// Adapters return raw `serde_json::Value` payloads; the registry runs them
/// through the schema validator and only then deserializes into this struct,
/// so the optional fields here really are optional rather than silently
/// missing data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceObservation {
    /// Company the metric belongs to
    pub company_id: String,

    /// Metric name (market_cap, pe_ratio, revenue, ...)
    pub metric: String,

    /// Source identifier, matching the adapter's `id()`
    pub source_id: String,

    /// Fetch timestamp reported by the adapter
    pub fetched_at: String,

    /// Numeric value, or null when the source had no number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_value: Option<f64>,

    /// Unit label from the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_units: Option<String>,

    /// Currency code from the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_currency: Option<String>,

    /// Publication timestamp claimed by the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_at: Option<String>,

    /// Free-form adapter metadata; `meta.blob_id` references an archived
    /// copy of the raw payload when the adapter stored one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl SourceObservation {
    /// The reconciliation candidate this observation contributes.
    pub fn to_candidate(&self) -> Candidate {
        Candidate {
            value: self.raw_value,
            source: self.source_id.clone(),
            fetched_at: self.fetched_at.clone(),
            reported_at: self.reported_at.clone(),
            units: self.raw_units.clone().unwrap_or_default(),
            currency: self.raw_currency.clone().unwrap_or_default(),
            blob_id: self.blob_id(),
        }
    }

    /// The audit record this observation contributes.
    pub fn to_provenance(&self) -> ProvenanceRecord {
        ProvenanceRecord {
            source: self.source_id.clone(),
            raw_value: self.raw_value,
            raw_units: self.raw_units.clone(),
            raw_currency: self.raw_currency.clone(),
            fetched_at: self.fetched_at.clone(),
            reported_at: self.reported_at.clone(),
            raw_blob_id: self.blob_id(),
        }
    }

    fn blob_id(&self) -> Option<String> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.get("blob_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}
