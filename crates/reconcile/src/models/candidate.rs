use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One source's observation of one metric at one point in time.
///
/// Candidates are immutable once created; the reconciliation engine only
/// reads them. `fetched_at` stays a raw string so that an observation with a
/// malformed timestamp can still participate in reconciliation (the engine
/// keeps such candidates rather than dropping data).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    /// Numeric value as parsed by the adapter, if any
    pub value: Option<f64>,

    /// Source identifier (alpha_vantage, fmp, nse_india, ...)
    pub source: String,

    /// When this crate received the data, as reported by the adapter
    pub fetched_at: String,

    /// When the source claims the data was published
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_at: Option<String>,

    /// Unit label from the source (crores, millions, percent, ...)
    pub units: String,

    /// Currency code from the source
    pub currency: String,

    /// Reference to an archived copy of the raw payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_id: Option<String>,
}

impl Candidate {
    /// Create a candidate with the fields every observation carries.
    pub fn new(source: String, value: Option<f64>, fetched_at: String) -> Self {
        Self {
            value,
            source,
            fetched_at,
            reported_at: None,
            units: String::new(),
            currency: String::new(),
            blob_id: None,
        }
    }

    /// The fetch timestamp as a UTC instant, or `None` when it does not
    /// parse. Callers must treat `None` as "unknown age", not as an error.
    pub fn fetched_at_time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.fetched_at)
    }
}

/// Parse the timestamp formats adapters actually emit: RFC 3339 (with `Z` or
/// a numeric offset) and bare ISO 8601 datetimes, which are taken as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = raw.parse::<NaiveDateTime>() {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
