//! Cheap pre-clustering quality gate for mined responses.
//!
//! Heuristic scores only: the point is to drop degenerate samples (empty,
//! truncated, off-topic) before the expensive embed/cluster stage, not to
//! rank survivors precisely. Ranking happens later in `mining::scoring`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stand-in semantic entropy until a real estimator lands. Chosen below the
/// 0.5 penalty knee so it never affects the composite.
pub const PLACEHOLDER_ENTROPY: f64 = 0.3;

/// Component and composite quality scores for a single response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScore {
    pub coherence: f64,
    pub relevance: f64,
    pub completeness: f64,
    pub semantic_entropy: f64,
    pub overall: f64,
    pub passed: bool,
}

/// Score one raw response against the originating query.
///
/// `payload` is the parsed structured payload, if parsing succeeded.
pub fn assess_quality(
    raw: &str,
    query: &str,
    payload: Option<&Value>,
    threshold: f64,
) -> QualityScore {
    let coherence = score_coherence(raw, payload);
    let relevance = score_relevance(raw, query);
    let completeness = score_completeness(payload);
    let semantic_entropy = PLACEHOLDER_ENTROPY;

    let entropy_penalty = (semantic_entropy - 0.5).max(0.0) * 0.5;
    let overall = (0.4 * coherence + 0.4 * relevance + 0.2 * completeness - entropy_penalty)
        .max(0.0);

    QualityScore {
        coherence,
        relevance,
        completeness,
        semantic_entropy,
        overall,
        passed: overall >= threshold,
    }
}

/// Starts at 1.0; near-empty responses score 0.0 outright, and a response
/// that failed structured parsing loses 0.3.
fn score_coherence(raw: &str, payload: Option<&Value>) -> f64 {
    if raw.trim().len() < 10 {
        return 0.0;
    }
    let mut score: f64 = 1.0;
    if payload.is_none() {
        score -= 0.3;
    }
    score.max(0.0)
}

/// Fraction of the query's distinct words that appear as whole words in the
/// response. Lower-cased word-set overlap; substring hits do not count.
fn score_relevance(raw: &str, query: &str) -> f64 {
    let response_lower = raw.to_lowercase();
    let query_lower = query.to_lowercase();
    let response_words: HashSet<&str> = response_lower.split_whitespace().collect();
    let query_words: HashSet<&str> = query_lower.split_whitespace().collect();
    if query_words.is_empty() {
        return 1.0;
    }
    let hits = query_words.intersection(&response_words).count();
    hits as f64 / query_words.len() as f64
}

/// 0.0 without a payload; 0.7 for any parsed payload, 0.9 when it carries a
/// non-empty item list.
fn score_completeness(payload: Option<&Value>) -> f64 {
    match payload {
        None => 0.0,
        Some(p) => {
            let has_items = p
                .get("items")
                .and_then(Value::as_array)
                .map(|a| !a.is_empty())
                .unwrap_or(false);
            if has_items {
                0.9
            } else {
                0.7
            }
        }
    }
}
