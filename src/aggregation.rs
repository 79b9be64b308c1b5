//! Statistical aggregation over repeated oracle samples.
//!
//! Reduces N per-field values to one consensus value plus a confidence score,
//! flags numeric outliers via the IQR rule, combines per-field confidences
//! into an overall score, and maps the result onto a human review level.
//! Everything here is a pure function; orchestration lives in `consensus`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::FieldType;

/// Default IQR multiplier for outlier bounds.
pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

// =============================================================================
// Reports and verdicts
// =============================================================================

/// A numeric value that fell outside the expected range of its peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierReport {
    /// Which field diverged.
    pub field: String,
    /// What most samples produced (the median).
    pub consensus_value: f64,
    /// What the offending sample produced.
    pub outlier_value: f64,
    /// Which sample (0-indexed).
    pub sample_index: usize,
    /// How far from consensus, normalised to [0, 1].
    pub divergence: f64,
    /// Human-readable explanation.
    pub reason: String,
}

/// Recommended level of human review before trusting an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewLevel {
    /// High confidence, no review needed.
    None,
    /// Moderate confidence, quick glance.
    SpotCheck,
    /// Low confidence, careful review.
    DetailedReview,
    /// Very low confidence or outliers detected.
    ExpertRequired,
}

// =============================================================================
// Basic statistics
// =============================================================================

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = v.len();
    if n % 2 == 1 {
        v[n / 2]
    } else {
        0.5 * (v[n / 2 - 1] + v[n / 2])
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0.0 below two values.
fn stdev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

/// Descriptive summary of a numeric field's values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericSummary {
    pub median: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub stdev: f64,
}

pub fn summarize_numeric(values: &[f64]) -> NumericSummary {
    NumericSummary {
        median: median(values),
        mean: mean(values),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        stdev: stdev(values),
    }
}

// =============================================================================
// Outlier detection (IQR rule)
// =============================================================================

/// Quartiles at floor indices (no interpolation). Returns (q1, q3, iqr).
pub fn compute_iqr(values: &[f64]) -> (f64, f64, f64) {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    let q1 = sorted[n / 4];
    let q3 = sorted[(3 * n) / 4];
    (q1, q3, q3 - q1)
}

/// IQR-rule outlier detection over a numeric field's values.
///
/// Returns the field's [`NumericSummary`] (its median is the consensus) plus
/// the reports. Below 3 samples there is no meaningful spread estimate: the
/// report list is empty. Divergence is |value - median| normalised by the
/// observed range (1 when all values coincide), clamped to [0, 1].
pub fn detect_numeric_outliers(
    values: &[f64],
    sample_indices: &[usize],
    field: &str,
    iqr_multiplier: f64,
) -> (NumericSummary, Vec<OutlierReport>) {
    let summary = summarize_numeric(values);
    if values.len() < 3 {
        return (summary, Vec::new());
    }

    let (q1, q3, iqr) = compute_iqr(values);
    let lower = q1 - iqr_multiplier * iqr;
    let upper = q3 + iqr_multiplier * iqr;
    let range = if summary.max > summary.min {
        summary.max - summary.min
    } else {
        1.0
    };

    let mut outliers = Vec::new();
    for (&value, &sample_index) in values.iter().zip(sample_indices) {
        if value >= lower && value <= upper {
            continue;
        }
        let divergence = ((value - summary.median).abs() / range).min(1.0);
        let reason = if value < lower {
            format!(
                "{field} value {value} is below lower bound {lower:.2} (Q1 - {iqr_multiplier}*IQR)"
            )
        } else {
            format!(
                "{field} value {value} is above upper bound {upper:.2} (Q3 + {iqr_multiplier}*IQR)"
            )
        };
        outliers.push(OutlierReport {
            field: field.to_string(),
            consensus_value: summary.median,
            outlier_value: value,
            sample_index,
            divergence,
            reason,
        });
    }

    (summary, outliers)
}

// =============================================================================
// Per-type aggregation
// =============================================================================

/// Mode after exact matching, with first-seen tie breaking.
/// Returns (mode, agreement ratio); None on empty input.
fn mode_with_agreement(values: &[String]) -> Option<(String, f64)> {
    if values.is_empty() {
        return None;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for v in values {
        let entry = counts.entry(v.as_str()).or_insert(0);
        if *entry == 0 {
            order.push(v.as_str());
        }
        *entry += 1;
    }
    // Scan in first-seen order with a strictly-greater comparison so a split
    // vote resolves to the earliest leader.
    let mut mode = order[0];
    let mut mode_count = counts[mode];
    for &candidate in &order[1..] {
        let count = counts[candidate];
        if count > mode_count {
            mode = candidate;
            mode_count = count;
        }
    }
    Some((mode.to_string(), mode_count as f64 / values.len() as f64))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Categorical consensus: exact-match mode over the raw strings.
pub fn aggregate_categorical(values: &[String]) -> Option<(String, f64)> {
    mode_with_agreement(values)
}

/// Text consensus: whitespace-normalised mode.
pub fn aggregate_text(values: &[String]) -> Option<(String, f64)> {
    let normalized: Vec<String> = values.iter().map(|v| collapse_whitespace(v)).collect();
    mode_with_agreement(&normalized)
}

/// List consensus: items appearing in at least half the samples.
///
/// Items are normalised (trim, lowercase, collapse whitespace) before
/// counting. Coverage = kept / distinct seen, 1.0 when nothing was seen.
pub fn aggregate_list(values: &[Vec<String>]) -> (Vec<String>, f64) {
    if values.is_empty() {
        return (Vec::new(), 0.0);
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for list in values {
        for item in list {
            let normalized = collapse_whitespace(item).to_lowercase();
            let entry = counts.entry(normalized.clone()).or_insert(0);
            if *entry == 0 {
                order.push(normalized);
            }
            *entry += 1;
        }
    }

    let threshold = values.len() as f64 / 2.0;
    let common: Vec<String> = order
        .into_iter()
        .filter(|item| counts[item] as f64 >= threshold)
        .collect();

    let total_distinct = counts.len();
    let coverage = if total_distinct > 0 {
        common.len() as f64 / total_distinct as f64
    } else {
        1.0
    };

    (common, coverage)
}

/// Confidence for a numeric field from its coefficient of variation.
///
/// cv = stdev / |mean|; confidence = max(0, 1 - cv). A single value is fully
/// confident. Identical values are fully confident. A zero mean with spread
/// leaves cv undefined: confidence 0.5.
pub fn numeric_confidence(values: &[f64]) -> f64 {
    match values.len() {
        0 => 0.0,
        1 => 1.0,
        _ => {
            let m = mean(values);
            let s = stdev(values);
            if m == 0.0 {
                if s == 0.0 {
                    1.0
                } else {
                    0.5
                }
            } else {
                (1.0 - s / m.abs()).max(0.0)
            }
        }
    }
}

// =============================================================================
// Field dispatch
// =============================================================================

/// Aggregation outcome for a single field.
#[derive(Debug, Clone)]
pub struct FieldAggregate {
    pub consensus: Value,
    pub confidence: f64,
    pub outliers: Vec<OutlierReport>,
}

/// Render a JSON value the way it would appear as a categorical label.
fn value_to_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Coerce a JSON value to f64; strings holding numbers count.
fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Reduce one field's non-null values to consensus + confidence + outliers.
///
/// `values` pairs each value with its originating sample index. Fields with a
/// declared numeric type that fail coercion fall back to text aggregation for
/// the whole field (scoped: other fields are unaffected). Fields with no
/// declared type take the categorical path at a fixed 0.5 confidence.
pub fn aggregate_field(
    field: &str,
    values: &[(usize, Value)],
    field_type: Option<FieldType>,
    iqr_multiplier: f64,
) -> Option<FieldAggregate> {
    let non_null: Vec<(usize, &Value)> = values
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(i, v)| (*i, v))
        .collect();
    if non_null.is_empty() {
        return None;
    }

    match field_type {
        Some(FieldType::Numeric) => {
            let coerced: Option<Vec<f64>> =
                non_null.iter().map(|&(_, v)| coerce_numeric(v)).collect();
            match coerced {
                Some(numbers) => {
                    let indices: Vec<usize> = non_null.iter().map(|(i, _)| *i).collect();
                    let (summary, outliers) =
                        detect_numeric_outliers(&numbers, &indices, field, iqr_multiplier);
                    Some(FieldAggregate {
                        consensus: json_number(summary.median),
                        confidence: numeric_confidence(&numbers),
                        outliers,
                    })
                }
                None => text_aggregate(&non_null),
            }
        }
        Some(FieldType::Categorical) => {
            let labels: Vec<String> = non_null.iter().map(|&(_, v)| value_to_label(v)).collect();
            let (mode, agreement) = aggregate_categorical(&labels)?;
            Some(FieldAggregate {
                consensus: Value::String(mode),
                confidence: nonempty_agreement(&labels, agreement),
                outliers: Vec::new(),
            })
        }
        Some(FieldType::Text) => text_aggregate(&non_null),
        Some(FieldType::List) => {
            let lists: Vec<Vec<String>> = non_null
                .iter()
                .filter_map(|(_, v)| v.as_array())
                .map(|arr| arr.iter().map(value_to_label).collect())
                .collect();
            if lists.is_empty() {
                // Declared as a list but no sample produced one.
                return text_aggregate(&non_null);
            }
            let (common, coverage) = aggregate_list(&lists);
            Some(FieldAggregate {
                consensus: Value::Array(common.into_iter().map(Value::String).collect()),
                confidence: coverage,
                outliers: Vec::new(),
            })
        }
        None => {
            // Unknown type: categorical consensus, defined fallback confidence.
            let labels: Vec<String> = non_null.iter().map(|&(_, v)| value_to_label(v)).collect();
            let (mode, _) = aggregate_categorical(&labels)?;
            Some(FieldAggregate {
                consensus: Value::String(mode),
                confidence: 0.5,
                outliers: Vec::new(),
            })
        }
    }
}

fn text_aggregate(non_null: &[(usize, &Value)]) -> Option<FieldAggregate> {
    let labels: Vec<String> = non_null.iter().map(|&(_, v)| value_to_label(v)).collect();
    let (mode, agreement) = aggregate_text(&labels)?;
    Some(FieldAggregate {
        consensus: Value::String(mode),
        confidence: nonempty_agreement(&labels, agreement),
        outliers: Vec::new(),
    })
}

/// Agreement computed over non-empty labels only; 0.0 if nothing remains.
fn nonempty_agreement(labels: &[String], fallback: f64) -> f64 {
    let non_empty: Vec<String> = labels
        .iter()
        .filter(|l| !l.trim().is_empty())
        .cloned()
        .collect();
    if non_empty.is_empty() {
        return 0.0;
    }
    if non_empty.len() == labels.len() {
        return fallback;
    }
    mode_with_agreement(&non_empty).map(|(_, a)| a).unwrap_or(0.0)
}

fn json_number(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

// =============================================================================
// Overall confidence and review policy
// =============================================================================

/// Weighted mean of per-field confidences with weight `2.0 - confidence`.
///
/// Low-confidence fields carry more weight, pulling the overall score down
/// harder than a plain mean would. Order of iteration does not matter.
pub fn overall_confidence(field_confidence: &HashMap<String, f64>) -> f64 {
    if field_confidence.is_empty() {
        return 0.0;
    }
    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for conf in field_confidence.values() {
        let weight = 2.0 - conf;
        weighted_sum += conf * weight;
        weight_sum += weight;
    }
    if weight_sum > 0.0 {
        weighted_sum / weight_sum
    } else {
        0.0
    }
}

/// Map (confidence, outliers) onto a review verdict with a reason.
pub fn determine_review_level(
    confidence: f64,
    outliers: &[OutlierReport],
    field_confidence: &HashMap<String, f64>,
) -> (ReviewLevel, Option<String>) {
    if !outliers.is_empty() || confidence < 0.4 {
        let mut reasons = Vec::new();
        if !outliers.is_empty() {
            reasons.push(format!("{} outlier(s) detected", outliers.len()));
        }
        if confidence < 0.4 {
            reasons.push(format!("low overall confidence ({confidence:.2})"));
        }
        return (ReviewLevel::ExpertRequired, Some(reasons.join("; ")));
    }

    if confidence < 0.6 {
        let mut low_fields: Vec<&str> = field_confidence
            .iter()
            .filter(|(_, c)| **c < 0.5)
            .map(|(f, _)| f.as_str())
            .collect();
        low_fields.sort_unstable();
        let mut reason = format!("moderate confidence ({confidence:.2})");
        if !low_fields.is_empty() {
            reason.push_str(&format!("; low confidence on: {}", low_fields.join(", ")));
        }
        return (ReviewLevel::DetailedReview, Some(reason));
    }

    if confidence < 0.8 {
        return (
            ReviewLevel::SpotCheck,
            Some(format!(
                "good confidence ({confidence:.2}), spot check recommended"
            )),
        );
    }

    (ReviewLevel::None, None)
}

// =============================================================================
// Early stop
// =============================================================================

/// Whether the samples collected so far agree enough to stop early.
///
/// Requires at least 3 parsed payloads. For every field observed anywhere,
/// computes the modal agreement ratio across samples containing it; stops
/// once the average across fields reaches the threshold.
pub fn check_early_stop(payloads: &[&Value], threshold: f64) -> bool {
    if payloads.len() < 3 {
        return false;
    }

    let mut fields: Vec<&str> = Vec::new();
    for payload in payloads {
        if let Some(map) = payload.as_object() {
            for key in map.keys() {
                if !fields.contains(&key.as_str()) {
                    fields.push(key);
                }
            }
        }
    }

    let mut agreements = Vec::new();
    for field in fields {
        let values: Vec<String> = payloads
            .iter()
            .filter_map(|p| p.get(field))
            .map(value_to_label)
            .collect();
        if values.is_empty() {
            continue;
        }
        if let Some((_, agreement)) = mode_with_agreement(&values) {
            agreements.push(agreement);
        }
    }

    if agreements.is_empty() {
        return false;
    }
    let avg = agreements.iter().sum::<f64>() / agreements.len() as f64;
    avg >= threshold
}

// =============================================================================
// TESTS
// =============================================================================
