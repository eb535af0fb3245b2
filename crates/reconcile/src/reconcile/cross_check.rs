//! Lightweight cross-source screening for spot checks.
//!
//! Where [`super::engine`] runs the full staleness/trust ladder over typed
//! candidates, these helpers answer a simpler question over bare numbers:
//! do the sources roughly agree, and how much should a composite record be
//! trusted? Confidence here is a 0-100 integer score, not a grade.

use std::collections::HashMap;

use lazy_static::lazy_static;
use log::warn;
use serde::Serialize;

/// Relative spread (percent) above which a cross-check is flagged.
const VARIANCE_FLAG_PERCENT: f64 = 15.0;

/// Numeric score for unlisted sources.
const DEFAULT_SOURCE_WEIGHT: u32 = 60;

lazy_static! {
    /// Numeric source weights for the composite score.
    static ref SOURCE_WEIGHTS: HashMap<&'static str, u32> = {
        let mut weights = HashMap::new();
        weights.insert("NSE", 88);
        weights.insert("BSE", 85);
        weights.insert("YAHOO", 78);
        weights.insert("FMP", 76);
        weights.insert("ALPHA_VANTAGE", 75);
        weights.insert("SCREENER", 68);
        weights
    };
}

/// Agreement summary across one field's raw values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CrossCheck {
    /// Median of the inputs, rounded to 4 decimals; `None` when empty
    pub value: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,

    /// `|max - min| / mean * 100`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variance_percent: Option<f64>,

    /// True when the spread exceeds the flag threshold
    pub variance_flag: bool,

    /// 0-100 score; 70 for a lone value, 60-90 otherwise
    pub confidence: u8,
}

/// Check how well several sources agree on one field.
///
/// A single value passes through untouched at confidence 70. With more,
/// the median wins and confidence drops one point per percent of spread,
/// floored at 60.
pub fn cross_validate(field_name: &str, values: &[f64]) -> CrossCheck {
    if values.is_empty() {
        return CrossCheck {
            value: None,
            mean: None,
            variance_percent: None,
            variance_flag: false,
            confidence: 0,
        };
    }

    if values.len() == 1 {
        return CrossCheck {
            value: Some(values[0]),
            mean: None,
            variance_percent: None,
            variance_flag: false,
            confidence: 70,
        };
    }

    let n = values.len();
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };
    let mean = values.iter().sum::<f64>() / n as f64;

    // Guard the divisor: a zero mean would blow up the ratio
    let divisor = if mean != 0.0 { mean } else { 1.0 };
    let variance_percent = (sorted[n - 1] - sorted[0]).abs() / divisor * 100.0;

    let variance_flag = variance_percent > VARIANCE_FLAG_PERCENT;
    if variance_flag {
        warn!(
            "High variance for {}: {:.1}%",
            field_name, variance_percent
        );
    }

    CrossCheck {
        value: Some(round4(median)),
        mean: Some(round4(mean)),
        variance_percent: Some(round2(variance_percent)),
        variance_flag,
        confidence: 90i64.saturating_sub(variance_percent as i64).max(60) as u8,
    }
}

/// Composite 0-100 confidence for a record built from several sources.
///
/// Half the best source weight, plus a freshness tier, plus up to 30
/// points for field completeness, capped at 100.
pub fn composite_confidence(sources: &[&str], data_age_hours: f64, field_completeness: f64) -> u8 {
    let source_score = sources
        .iter()
        .map(|s| {
            SOURCE_WEIGHTS
                .get(s)
                .copied()
                .unwrap_or(DEFAULT_SOURCE_WEIGHT)
        })
        .max()
        .unwrap_or(0);

    let freshness = if data_age_hours < 1.0 {
        40
    } else if data_age_hours < 24.0 {
        35
    } else if data_age_hours < 72.0 {
        25
    } else {
        10
    };

    let completeness = (field_completeness * 30.0) as u32;

    (source_score / 2 + freshness + completeness).min(100) as u8
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
