//! Diversity mining: deliberately maximise disagreement, then keep one
//! representative per distinct approach.
//!
//! Where consensus extraction collapses samples into one answer, mining runs
//! the oracle hot (temperature scheduling, prompt perturbation), filters out
//! degenerate responses, clusters the survivors, and scores each cluster's
//! representative for novelty, coherence, and coverage. The caller gets a
//! ranked shortlist of genuinely different answers instead of a forced
//! average.

pub mod config;
pub mod scoring;
pub mod types;
pub mod variation;

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tracing::{debug, warn};

use crate::clustering::{ClusterCapabilities, ResponseClusterer, NOISE};
use crate::oracle::{CompletionRequest, Message, Oracle};
use crate::parser::parse_payload;
use crate::quality::{assess_quality, QualityScore};
use crate::schema::{build_extraction_prompt, SchemaDefinition, SchemaKind};

pub use config::{MiningConfig, PromptVariation, TemperatureSchedule};
pub use types::{BatchMiningResult, ClusterSummary, MiningCandidate, MiningResult};
pub use variation::diversify_prompt;

/// Default concurrent mining runs in `mine_batch`.
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

/// Candidates above this novelty are flagged as high-novelty.
const HIGH_NOVELTY_THRESHOLD: f64 = 0.7;

struct Generation {
    sample_index: usize,
    content: String,
    payload: Option<Value>,
    quality: Option<QualityScore>,
    temperature: f64,
    tokens_used: u32,
}

/// Mines a query for diverse approaches.
pub struct DiversityMiner {
    oracle: Arc<dyn Oracle>,
    config: MiningConfig,
    capabilities: ClusterCapabilities,
}

impl DiversityMiner {
    pub fn new(oracle: Arc<dyn Oracle>, config: MiningConfig) -> Self {
        Self {
            oracle,
            config,
            capabilities: ClusterCapabilities::default(),
        }
    }

    /// Force a particular rung of the clustering ladder.
    pub fn with_capabilities(mut self, capabilities: ClusterCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn config(&self) -> &MiningConfig {
        &self.config
    }

    /// Mine one query. Never fails: oracle errors and parse failures degrade
    /// into a result with fewer (possibly zero) candidates.
    pub async fn mine(
        &self,
        query: &str,
        context: Option<&str>,
        schema: &SchemaDefinition,
    ) -> MiningResult {
        let start = Instant::now();
        let base_prompt = build_extraction_prompt(query, context, &schema.extraction_prompt);
        let mut rng = StdRng::seed_from_u64(self.config.rng_seed);

        let mut generations: Vec<Generation> = Vec::with_capacity(self.config.samples);
        let mut total_tokens: u32 = 0;
        let mut total_cost = 0.0;

        for i in 0..self.config.samples {
            let temperature = self
                .config
                .temperature_for(i, self.config.samples, &mut rng);
            let prompt = diversify_prompt(&base_prompt, i, self.config.variation);

            let request = CompletionRequest::new(vec![Message::user(prompt)])
                .temperature(temperature)
                .max_tokens(self.config.max_tokens);

            match self.oracle.complete(request).await {
                Ok(response) => {
                    total_tokens += response.tokens_used;
                    total_cost += response.cost_usd;

                    let payload = parse_payload(&response.content);
                    let quality = assess_quality(
                        &response.content,
                        query,
                        payload.as_ref(),
                        self.config.quality_threshold,
                    );

                    generations.push(Generation {
                        sample_index: i,
                        content: response.content,
                        payload,
                        quality: Some(quality),
                        temperature,
                        tokens_used: response.tokens_used,
                    });
                }
                Err(e) => {
                    warn!(sample = i, error = %e, code = e.code(), "mining sample failed");
                    generations.push(Generation {
                        sample_index: i,
                        content: String::new(),
                        payload: None,
                        quality: None,
                        temperature,
                        tokens_used: 0,
                    });
                }
            }
        }

        let filtered: Vec<&Generation> = generations
            .iter()
            .filter(|g| g.quality.as_ref().map(|q| q.passed).unwrap_or(false))
            .collect();
        let quality_pass_rate = if generations.is_empty() {
            0.0
        } else {
            filtered.len() as f64 / generations.len() as f64
        };

        if filtered.is_empty() {
            debug!(query, "no samples passed quality filtering");
            return self.empty_result(
                query,
                context,
                &schema.name,
                generations.len(),
                total_tokens,
                total_cost,
                start,
            );
        }

        let texts: Vec<&str> = filtered.iter().map(|g| g.content.as_str()).collect();
        let mut clusterer = ResponseClusterer::new(self.capabilities);
        let cluster_result = clusterer.cluster(&texts);

        // One candidate per cluster: the member nearest the centroid.
        let mut labels: Vec<i32> = cluster_result
            .labels
            .iter()
            .copied()
            .filter(|&l| l != NOISE)
            .collect();
        labels.sort_unstable();
        labels.dedup();

        let mut candidates = Vec::new();
        let mut rep_indices = Vec::new();
        let mut clusters = Vec::new();

        for &cluster_id in &labels {
            let member_indices: Vec<usize> = cluster_result
                .labels
                .iter()
                .enumerate()
                .filter(|(_, &l)| l == cluster_id)
                .map(|(i, _)| i)
                .collect();

            let rep_idx = clusterer
                .nearest_to_center(cluster_id, &cluster_result)
                .unwrap_or(member_indices[0]);
            let generation = filtered[rep_idx];
            let quality = generation
                .quality
                .clone()
                .unwrap_or_else(|| assess_quality("", query, None, self.config.quality_threshold));

            clusters.push(ClusterSummary {
                cluster_id,
                size: member_indices.len(),
                sample_indices: member_indices.clone(),
                is_singleton: member_indices.len() == 1,
            });
            candidates.push(MiningCandidate {
                id: format!("cand_{cluster_id}"),
                cluster_id,
                sample_indices: member_indices,
                content: generation.payload.clone().unwrap_or(Value::Null),
                raw_response: generation.content.clone(),
                quality,
                novelty_score: 0.0,
                coherence_score: 0.0,
                coverage_score: 0.0,
                composite_score: 0.0,
                differences_from_baseline: Vec::new(),
                generation_rank: generation.sample_index,
                token_count: generation.tokens_used,
                temperature_used: generation.temperature,
            });
            rep_indices.push(rep_idx);
        }

        if cluster_result.reduced.nrows() > 0 {
            let embeddings: Vec<DVector<f64>> = rep_indices
                .iter()
                .map(|&i| cluster_result.reduced.row(i).transpose())
                .collect();
            for (i, candidate) in candidates.iter_mut().enumerate() {
                let others: Vec<DVector<f64>> = embeddings
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, e)| e.clone())
                    .collect();
                candidate.novelty_score = scoring::compute_novelty(&embeddings[i], &others);
                candidate.coherence_score =
                    scoring::compute_coherence(&candidate.content, candidate.quality.overall);
                candidate.coverage_score = scoring::compute_coverage(&candidate.content, query);
                candidate.composite_score = scoring::compute_composite(
                    candidate.novelty_score,
                    candidate.coherence_score,
                    candidate.coverage_score,
                    self.config.novelty_weight,
                    self.config.coherence_weight,
                    self.config.coverage_weight,
                );
            }
        }

        let diversity_score = if candidates.is_empty() {
            0.0
        } else {
            candidates.iter().map(|c| c.novelty_score).sum::<f64>() / candidates.len() as f64
        };
        let effective_diversity = diversity_score * quality_pass_rate;

        candidates.sort_by(|a, b| {
            b.composite_score
                .partial_cmp(&a.composite_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.config.max_candidates);

        let review_priority: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
        let high_novelty_candidates: Vec<String> = candidates
            .iter()
            .filter(|c| c.novelty_score > HIGH_NOVELTY_THRESHOLD)
            .map(|c| c.id.clone())
            .collect();
        let potential_hallucinations: Vec<String> = candidates
            .iter()
            .filter(|c| c.quality.semantic_entropy > self.config.entropy_threshold)
            .map(|c| c.id.clone())
            .collect();

        debug!(
            query,
            clusters = cluster_result.n_clusters,
            candidates = candidates.len(),
            diversity = diversity_score,
            "mining complete"
        );

        MiningResult {
            query: query.to_string(),
            context: context.map(str::to_string),
            schema_used: schema.name.clone(),
            candidates,
            clusters,
            num_clusters: cluster_result.n_clusters,
            silhouette: cluster_result.silhouette,
            diversity_score,
            effective_diversity,
            samples_generated: generations.len(),
            samples_passed_quality: filtered.len(),
            quality_pass_rate,
            review_priority,
            high_novelty_candidates,
            potential_hallucinations,
            tokens_used: total_tokens,
            cost_usd: total_cost,
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Mine several queries with bounded concurrency.
    ///
    /// Schemas broadcast: a single schema applies to every query; otherwise
    /// schemas pair with queries by index (missing entries reuse the last,
    /// an empty slice means the risk schema).
    pub async fn mine_batch(
        &self,
        queries: &[String],
        context: Option<&str>,
        schemas: &[SchemaDefinition],
        max_concurrent: usize,
    ) -> BatchMiningResult {
        let default_schema = SchemaKind::Risk.definition();
        let tasks = queries.iter().enumerate().map(|(i, query)| {
            let schema = schemas
                .get(if schemas.len() == 1 { 0 } else { i })
                .or_else(|| schemas.last())
                .unwrap_or(&default_schema);
            async move { (i, self.mine(query, context, schema).await) }
        });

        let mut indexed: Vec<(usize, MiningResult)> = stream::iter(tasks)
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await;
        indexed.sort_by_key(|(i, _)| *i);
        let results: Vec<MiningResult> = indexed.into_iter().map(|(_, r)| r).collect();

        let queries_failed = results.iter().filter(|r| r.candidates.is_empty()).count();
        BatchMiningResult {
            total_tokens: results.iter().map(|r| r.tokens_used).sum(),
            total_cost_usd: results.iter().map(|r| r.cost_usd).sum(),
            total_latency_ms: results.iter().map(|r| r.latency_ms).sum(),
            queries_succeeded: results.len() - queries_failed,
            queries_failed,
            results,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn empty_result(
        &self,
        query: &str,
        context: Option<&str>,
        schema_name: &str,
        samples_generated: usize,
        tokens: u32,
        cost: f64,
        start: Instant,
    ) -> MiningResult {
        MiningResult {
            query: query.to_string(),
            context: context.map(str::to_string),
            schema_used: schema_name.to_string(),
            candidates: Vec::new(),
            clusters: Vec::new(),
            num_clusters: 0,
            silhouette: 0.0,
            diversity_score: 0.0,
            effective_diversity: 0.0,
            samples_generated,
            samples_passed_quality: 0,
            quality_pass_rate: 0.0,
            review_priority: Vec::new(),
            high_novelty_candidates: Vec::new(),
            potential_hallucinations: Vec::new(),
            tokens_used: tokens,
            cost_usd: cost,
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }
}
