use serde::{Deserialize, Serialize};

/// The recorded origin of one ingested observation.
///
/// Records are append-only: the tracker never mutates or deduplicates them,
/// so an audit can replay exactly what each source said and when.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProvenanceRecord {
    /// Source identifier
    pub source: String,

    /// Raw numeric value as received (the adapter contract allows null)
    pub raw_value: Option<f64>,

    /// Unit label as received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_units: Option<String>,

    /// Currency code as received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_currency: Option<String>,

    /// When the observation was fetched
    pub fetched_at: String,

    /// When the source claims the data was published
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_at: Option<String>,

    /// Reference to an archived copy of the raw payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_blob_id: Option<String>,
}
