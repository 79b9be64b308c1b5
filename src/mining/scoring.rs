//! Candidate scoring: novelty, coherence, coverage, composite.

use nalgebra::DVector;
use serde_json::Value;

/// 1 - max cosine similarity to any other candidate's embedding.
///
/// A candidate with no peers is maximally novel. Zero-norm vectors
/// contribute similarity 0.
pub fn compute_novelty(candidate: &DVector<f64>, others: &[DVector<f64>]) -> f64 {
    if others.is_empty() {
        return 1.0;
    }
    let max_sim = others
        .iter()
        .map(|other| cosine_similarity(candidate, other))
        .fold(f64::NEG_INFINITY, f64::max);
    1.0 - max_sim
}

fn cosine_similarity(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    let norm_prod = a.norm() * b.norm();
    if norm_prod > 0.0 {
        a.dot(b) / norm_prod
    } else {
        0.0
    }
}

/// Quality score lifted by structural bonuses.
///
/// +0.1 for a non-empty item list, a further +0.1 when every item carries
/// the same key set, capped at 1.0. Empty content scores 0.
pub fn compute_coherence(content: &Value, quality_overall: f64) -> f64 {
    if is_empty_content(content) {
        return 0.0;
    }

    let mut score = quality_overall;
    if let Some(items) = content.get("items").and_then(Value::as_array) {
        if !items.is_empty() {
            score = (score + 0.1).min(1.0);
            if items.len() > 1 && uniform_keys(items) {
                score = (score + 0.1).min(1.0);
            }
        }
    }
    score
}

fn uniform_keys(items: &[Value]) -> bool {
    let first_keys: Vec<&String> = match items[0].as_object() {
        Some(map) => map.keys().collect(),
        None => Vec::new(),
    };
    items[1..].iter().all(|item| match item.as_object() {
        Some(map) => {
            map.len() == first_keys.len() && map.keys().all(|k| first_keys.contains(&k))
        }
        None => true,
    })
}

/// Base 0.5, plus up to 0.25 for query keyword coverage and 0.25 for having
/// extracted items. Empty content scores 0.
pub fn compute_coverage(content: &Value, query: &str) -> f64 {
    if is_empty_content(content) {
        return 0.0;
    }

    let mut score = 0.5;

    let content_str = content.to_string().to_lowercase();
    let query_words: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if !query_words.is_empty() {
        let matched = query_words
            .iter()
            .filter(|w| content_str.contains(w.as_str()))
            .count();
        score += 0.25 * (matched as f64 / query_words.len() as f64);
    }

    let has_items = content
        .get("items")
        .and_then(Value::as_array)
        .map(|a| !a.is_empty())
        .unwrap_or(false);
    if has_items {
        score += 0.25;
    }

    score.min(1.0)
}

fn is_empty_content(content: &Value) -> bool {
    match content {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Weighted combination of the three component scores.
pub fn compute_composite(
    novelty: f64,
    coherence: f64,
    coverage: f64,
    novelty_weight: f64,
    coherence_weight: f64,
    coverage_weight: f64,
) -> f64 {
    novelty * novelty_weight + coherence * coherence_weight + coverage * coverage_weight
}
