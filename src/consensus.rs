//! Consensus extraction: sample the oracle repeatedly, aggregate the
//! agreement.
//!
//! Runs up to `samples` sequential oracle calls at a fixed temperature,
//! parses each response tolerantly, and checks for early stopping once three
//! samples have parsed. Aggregation then collapses each observed field to a
//! consensus value with a confidence score, flags numeric outliers, and maps
//! the whole extraction onto a review level. A run never fails outright:
//! oracle errors and parse failures are recorded per sample, and a run with
//! zero usable samples degrades to the explicit terminal verdict.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::aggregation::{
    aggregate_field, check_early_stop, determine_review_level, overall_confidence,
    OutlierReport, ReviewLevel, DEFAULT_IQR_MULTIPLIER,
};
use crate::oracle::{CompletionRequest, Message, Oracle};
use crate::parser::parse_payload;
use crate::schema::{build_extraction_prompt, SchemaDefinition, SchemaKind};

/// Default concurrent extractions in `extract_batch`.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Minimum successful parses before early stopping is considered.
const EARLY_STOP_MIN_PARSES: usize = 3;

/// Tunables for a consensus extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Oracle samples to request.
    pub samples: usize,
    /// Fixed sampling temperature for every call.
    pub temperature: f64,
    /// Stop early once average modal agreement reaches this.
    pub early_stop_threshold: f64,
    /// Whether early stopping is considered at all.
    pub early_stop: bool,
    /// Token cap per oracle call.
    pub max_tokens: u32,
    /// IQR multiplier for numeric outlier bounds.
    pub iqr_multiplier: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            samples: 5,
            temperature: 0.7,
            early_stop_threshold: 0.6,
            early_stop: true,
            max_tokens: 2000,
            iqr_multiplier: DEFAULT_IQR_MULTIPLIER,
        }
    }
}

/// One oracle sample: what came back, or why it didn't.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub sample_index: usize,
    pub raw_response: String,
    /// Parsed payload; `None` when the call failed or parsing failed.
    pub payload: Option<Value>,
    pub error: Option<String>,
    pub tokens_used: u32,
    pub cost_usd: f64,
    pub temperature: f64,
}

/// Outcome of one consensus extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub query: String,
    pub context: Option<String>,
    pub schema_used: String,
    /// Consensus value per observed field.
    pub consensus: HashMap<String, Value>,
    pub field_confidence: HashMap<String, f64>,
    /// Overall confidence in [0, 1].
    pub confidence: f64,
    pub outliers: Vec<OutlierReport>,
    pub review_level: ReviewLevel,
    pub review_reason: Option<String>,
    /// Raw per-sample records, including failures.
    pub samples: Vec<Sample>,
    pub samples_requested: usize,
    pub samples_run: usize,
    pub successful_parses: usize,
    pub early_stopped: bool,
    /// Estimated cost of the samples early stopping skipped.
    pub cost_saved_usd: f64,
    pub tokens_used: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

impl ConsensusResult {
    /// Whether any human review is recommended.
    pub fn review_recommended(&self) -> bool {
        self.review_level != ReviewLevel::None
    }
}

/// Aggregate outcome of extracting several queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConsensusResult {
    pub results: Vec<ConsensusResult>,
    pub total_tokens: u32,
    pub total_cost_usd: f64,
    pub total_latency_ms: u64,
    /// Queries that produced at least one usable sample.
    pub queries_succeeded: usize,
    /// Queries that hit the zero-parse terminal verdict.
    pub queries_failed: usize,
}

/// Extracts structured data by sampling the oracle and aggregating agreement.
pub struct ConsensusExtractor {
    oracle: Arc<dyn Oracle>,
    config: ConsensusConfig,
}

impl ConsensusExtractor {
    pub fn new(oracle: Arc<dyn Oracle>, config: ConsensusConfig) -> Self {
        Self { oracle, config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Extract one query. Never fails: a run with zero usable samples
    /// reports confidence 0.0 and expert review.
    pub async fn extract(
        &self,
        query: &str,
        context: Option<&str>,
        schema: &SchemaDefinition,
    ) -> ConsensusResult {
        let start = Instant::now();
        let prompt = build_extraction_prompt(query, context, &schema.extraction_prompt);

        let mut samples: Vec<Sample> = Vec::with_capacity(self.config.samples);
        let mut early_stopped = false;

        for i in 0..self.config.samples {
            let request = CompletionRequest::new(vec![Message::user(prompt.clone())])
                .temperature(self.config.temperature)
                .max_tokens(self.config.max_tokens);

            match self.oracle.complete(request).await {
                Ok(response) => {
                    let payload = parse_payload(&response.content);
                    if payload.is_none() {
                        debug!(sample = i, "response did not parse as structured payload");
                    }
                    samples.push(Sample {
                        sample_index: i,
                        raw_response: response.content,
                        payload,
                        error: None,
                        tokens_used: response.tokens_used,
                        cost_usd: response.cost_usd,
                        temperature: self.config.temperature,
                    });
                }
                Err(e) => {
                    warn!(sample = i, error = %e, code = e.code(), "oracle call failed");
                    samples.push(Sample {
                        sample_index: i,
                        raw_response: String::new(),
                        payload: None,
                        error: Some(e.to_string()),
                        tokens_used: 0,
                        cost_usd: 0.0,
                        temperature: self.config.temperature,
                    });
                }
            }

            if self.config.early_stop {
                let payloads: Vec<&Value> =
                    samples.iter().filter_map(|s| s.payload.as_ref()).collect();
                if payloads.len() >= EARLY_STOP_MIN_PARSES
                    && check_early_stop(&payloads, self.config.early_stop_threshold)
                {
                    debug!(samples_run = i + 1, "early stop: samples agree");
                    early_stopped = true;
                    break;
                }
            }
        }

        let samples_run = samples.len();
        let tokens_used: u32 = samples.iter().map(|s| s.tokens_used).sum();
        let cost_usd: f64 = samples.iter().map(|s| s.cost_usd).sum();
        let cost_saved_usd = if early_stopped && samples_run > 0 {
            let unrun = self.config.samples - samples_run;
            unrun as f64 * (cost_usd / samples_run as f64)
        } else {
            0.0
        };

        let payloads: Vec<(usize, &Value)> = samples
            .iter()
            .filter_map(|s| s.payload.as_ref().map(|p| (s.sample_index, p)))
            .collect();
        let successful_parses = payloads.len();

        if successful_parses == 0 {
            return ConsensusResult {
                query: query.to_string(),
                context: context.map(str::to_string),
                schema_used: schema.name.clone(),
                consensus: HashMap::new(),
                field_confidence: HashMap::new(),
                confidence: 0.0,
                outliers: Vec::new(),
                review_level: ReviewLevel::ExpertRequired,
                review_reason: Some("no successful extractions".to_string()),
                samples,
                samples_requested: self.config.samples,
                samples_run,
                successful_parses: 0,
                early_stopped,
                cost_saved_usd,
                tokens_used,
                cost_usd,
                latency_ms: start.elapsed().as_millis() as u64,
            };
        }

        // Gather per-field values across payloads, preserving first-seen
        // field order for deterministic aggregation.
        let mut field_order: Vec<String> = Vec::new();
        let mut field_values: HashMap<String, Vec<(usize, Value)>> = HashMap::new();
        for (sample_index, payload) in &payloads {
            if let Some(map) = payload.as_object() {
                for (key, value) in map {
                    if !field_values.contains_key(key) {
                        field_order.push(key.clone());
                    }
                    field_values
                        .entry(key.clone())
                        .or_default()
                        .push((*sample_index, value.clone()));
                }
            }
        }

        let mut consensus = HashMap::new();
        let mut field_confidence = HashMap::new();
        let mut outliers = Vec::new();
        for field in &field_order {
            let values = &field_values[field];
            let agg = aggregate_field(
                field,
                values,
                schema.field_type(field),
                self.config.iqr_multiplier,
            );
            if let Some(agg) = agg {
                consensus.insert(field.clone(), agg.consensus);
                field_confidence.insert(field.clone(), agg.confidence);
                outliers.extend(agg.outliers);
            }
        }

        let confidence = overall_confidence(&field_confidence);
        let (review_level, review_reason) =
            determine_review_level(confidence, &outliers, &field_confidence);

        debug!(
            query,
            confidence,
            outliers = outliers.len(),
            review = ?review_level,
            "consensus extraction complete"
        );

        ConsensusResult {
            query: query.to_string(),
            context: context.map(str::to_string),
            schema_used: schema.name.clone(),
            consensus,
            field_confidence,
            confidence,
            outliers,
            review_level,
            review_reason,
            samples,
            samples_requested: self.config.samples,
            samples_run,
            successful_parses,
            early_stopped,
            cost_saved_usd,
            tokens_used,
            cost_usd,
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Extract several queries with bounded concurrency.
    ///
    /// Schemas broadcast the same way as [`crate::mining::DiversityMiner::mine_batch`].
    pub async fn extract_batch(
        &self,
        queries: &[String],
        context: Option<&str>,
        schemas: &[SchemaDefinition],
        max_concurrent: usize,
    ) -> BatchConsensusResult {
        let default_schema = SchemaKind::Risk.definition();
        let tasks = queries.iter().enumerate().map(|(i, query)| {
            let schema = schemas
                .get(if schemas.len() == 1 { 0 } else { i })
                .or_else(|| schemas.last())
                .unwrap_or(&default_schema);
            async move { (i, self.extract(query, context, schema).await) }
        });

        let mut indexed: Vec<(usize, ConsensusResult)> = stream::iter(tasks)
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await;
        indexed.sort_by_key(|(i, _)| *i);
        let results: Vec<ConsensusResult> = indexed.into_iter().map(|(_, r)| r).collect();

        let queries_failed = results.iter().filter(|r| r.successful_parses == 0).count();
        BatchConsensusResult {
            total_tokens: results.iter().map(|r| r.tokens_used).sum(),
            total_cost_usd: results.iter().map(|r| r.cost_usd).sum(),
            total_latency_ms: results.iter().map(|r| r.latency_ms).sum(),
            queries_succeeded: results.len() - queries_failed,
            queries_failed,
            results,
        }
    }
}
