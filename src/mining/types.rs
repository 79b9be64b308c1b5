//! Result types for diversity mining.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::quality::QualityScore;

/// One distinct approach surfaced by mining: the representative of a cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningCandidate {
    pub id: String,
    pub cluster_id: i32,
    /// Indices (into the quality-filtered sample list) of this cluster's
    /// members.
    pub sample_indices: Vec<usize>,
    /// Parsed payload of the representative; `Null` when parsing failed.
    pub content: Value,
    pub raw_response: String,
    pub quality: QualityScore,
    /// 1 - max cosine similarity to any other candidate.
    pub novelty_score: f64,
    pub coherence_score: f64,
    pub coverage_score: f64,
    /// Weighted combination used for ranking.
    pub composite_score: f64,
    /// How this approach differs from the consensus baseline. Reserved:
    /// baseline comparison is not computed yet.
    pub differences_from_baseline: Vec<String>,
    /// Original generation index of the representative sample.
    pub generation_rank: usize,
    pub token_count: u32,
    pub temperature_used: f64,
}

/// Summary of one cluster, candidate or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: i32,
    pub size: usize,
    pub sample_indices: Vec<usize>,
    pub is_singleton: bool,
}

/// Full outcome of a mining run. Always populated; a run where nothing
/// passed quality yields the zeroed shape rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningResult {
    pub query: String,
    pub context: Option<String>,
    pub schema_used: String,
    /// Ranked and truncated to `max_candidates`.
    pub candidates: Vec<MiningCandidate>,
    pub clusters: Vec<ClusterSummary>,
    pub num_clusters: usize,
    pub silhouette: f64,
    /// Mean novelty across all candidates, pre-truncation.
    pub diversity_score: f64,
    /// Diversity discounted by the quality pass rate.
    pub effective_diversity: f64,
    pub samples_generated: usize,
    pub samples_passed_quality: usize,
    pub quality_pass_rate: f64,
    /// Candidate ids in recommended review order (ranked order).
    pub review_priority: Vec<String>,
    /// Candidate ids with novelty above 0.7.
    pub high_novelty_candidates: Vec<String>,
    /// Candidate ids whose semantic entropy exceeds the configured threshold.
    pub potential_hallucinations: Vec<String>,
    pub tokens_used: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

/// Aggregate outcome of mining several queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMiningResult {
    pub results: Vec<MiningResult>,
    pub total_tokens: u32,
    pub total_cost_usd: f64,
    pub total_latency_ms: u64,
    /// Queries that surfaced at least one candidate.
    pub queries_succeeded: usize,
    /// Queries whose run produced no candidates at all.
    pub queries_failed: usize,
}
