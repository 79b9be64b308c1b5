use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use accord_harness::clustering::ClusterCapabilities;
use accord_harness::{
    CompletionRequest, CompletionResponse, DiversityMiner, MiningConfig, Oracle, OracleError,
    SchemaKind,
};

struct ScriptedOracle {
    script: Mutex<VecDeque<Result<String, OracleError>>>,
}

impl ScriptedOracle {
    fn new(script: Vec<Result<String, OracleError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, OracleError> {
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("script exhausted");
        next.map(|content| CompletionResponse {
            content,
            tokens_used: 150,
            cost_usd: 0.02,
        })
    }
}

struct FixedOracle {
    content: String,
}

#[async_trait]
impl Oracle for FixedOracle {
    async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, OracleError> {
        Ok(CompletionResponse {
            content: self.content.clone(),
            tokens_used: 150,
            cost_usd: 0.02,
        })
    }
}

const QUERY: &str = "identify delivery risks";

/// A response that parses, mentions the query terms, and carries items.
fn duplicate_response(i: usize) -> String {
    format!(
        "Delivery risks identified below.\n{}",
        json!({"items": [{
            "description": format!("schedule slip on the delivery plan, note {i}"),
            "category": "Schedule"
        }]})
    )
}

fn distinct_response() -> String {
    format!(
        "Delivery risks identified below.\n{}",
        json!({"items": [{
            "description": "vendor bankruptcy wipes out the hardware supply chain entirely",
            "category": "External"
        }]})
    )
}

fn seven_sample_config() -> MiningConfig {
    MiningConfig {
        samples: 7,
        ..Default::default()
    }
}

fn mixed_script() -> Vec<Result<String, OracleError>> {
    let mut script: Vec<Result<String, OracleError>> =
        (0..6).map(|i| Ok(duplicate_response(i))).collect();
    script.push(Ok(distinct_response()));
    script
}

#[tokio::test]
async fn near_duplicates_plus_distinct_surface_two_approaches() {
    let oracle = ScriptedOracle::new(mixed_script());
    let miner = DiversityMiner::new(oracle, seven_sample_config()).with_capabilities(
        ClusterCapabilities {
            density: false,
            agglomerative: true,
        },
    );
    let schema = SchemaKind::Risk.definition();

    let result = miner.mine(QUERY, None, &schema).await;

    assert_eq!(result.samples_generated, 7);
    assert_eq!(result.samples_passed_quality, 7);
    assert_eq!(result.num_clusters, 2);
    assert_eq!(result.candidates.len(), 2);

    let singleton = result
        .clusters
        .iter()
        .find(|c| c.is_singleton)
        .expect("one cluster should be a singleton");
    assert_eq!(singleton.size, 1);

    let singleton_candidate = result
        .candidates
        .iter()
        .find(|c| c.cluster_id == singleton.cluster_id)
        .expect("singleton cluster should have a candidate");
    assert!(singleton_candidate.novelty_score > 0.5);
    assert!(singleton_candidate.raw_response.contains("vendor bankruptcy"));
}

#[tokio::test]
async fn density_strategy_treats_the_lone_distinct_response_as_noise() {
    let oracle = ScriptedOracle::new(mixed_script());
    let miner = DiversityMiner::new(oracle, seven_sample_config());
    let schema = SchemaKind::Risk.definition();

    let result = miner.mine(QUERY, None, &schema).await;

    // The six near-duplicates form the only cluster; the outlier is noise.
    assert_eq!(result.num_clusters, 1);
    assert_eq!(result.candidates.len(), 1);
    assert_eq!(result.candidates[0].novelty_score, 1.0);
    assert!(result.candidates[0].raw_response.contains("schedule slip"));
}

#[tokio::test]
async fn candidates_are_ranked_by_composite_score() {
    let oracle = ScriptedOracle::new(mixed_script());
    let miner = DiversityMiner::new(oracle, seven_sample_config()).with_capabilities(
        ClusterCapabilities {
            density: false,
            agglomerative: true,
        },
    );
    let schema = SchemaKind::Risk.definition();

    let result = miner.mine(QUERY, None, &schema).await;

    for pair in result.candidates.windows(2) {
        assert!(pair[0].composite_score >= pair[1].composite_score);
    }
    for candidate in &result.candidates {
        assert!((0.7..=1.0).contains(&candidate.temperature_used));
        assert!(candidate.id.starts_with("cand_"));
    }
    let ranked_ids: Vec<&str> = result.candidates.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(result.review_priority, ranked_ids);
}

#[tokio::test]
async fn nothing_passing_quality_yields_an_empty_result() {
    let oracle = Arc::new(FixedOracle {
        content: "??".to_string(),
    });
    let config = MiningConfig {
        samples: 5,
        ..Default::default()
    };
    let miner = DiversityMiner::new(oracle, config);
    let schema = SchemaKind::Risk.definition();

    let result = miner.mine(QUERY, None, &schema).await;

    assert_eq!(result.samples_generated, 5);
    assert_eq!(result.samples_passed_quality, 0);
    assert_eq!(result.quality_pass_rate, 0.0);
    assert!(result.candidates.is_empty());
    assert!(result.clusters.is_empty());
    assert_eq!(result.num_clusters, 0);
    assert_eq!(result.diversity_score, 0.0);
    // Spend is still reported even when nothing survives.
    assert_eq!(result.tokens_used, 750);
}

#[tokio::test]
async fn oracle_failures_reduce_the_pass_rate_but_never_abort() {
    let mut script = mixed_script();
    script[1] = Err(OracleError::provider("upstream 500", true));
    script[4] = Err(OracleError::refused("content policy"));
    let oracle = ScriptedOracle::new(script);
    let miner = DiversityMiner::new(oracle, seven_sample_config());
    let schema = SchemaKind::Risk.definition();

    let result = miner.mine(QUERY, None, &schema).await;

    assert_eq!(result.samples_generated, 7);
    assert_eq!(result.samples_passed_quality, 5);
    assert!((result.quality_pass_rate - 5.0 / 7.0).abs() < 1e-12);
    assert!(result.effective_diversity <= result.diversity_score);
}

#[tokio::test]
async fn mining_is_deterministic_for_a_fixed_script_and_seed() {
    let schema = SchemaKind::Risk.definition();

    let first = DiversityMiner::new(ScriptedOracle::new(mixed_script()), seven_sample_config())
        .mine(QUERY, None, &schema)
        .await;
    let second = DiversityMiner::new(ScriptedOracle::new(mixed_script()), seven_sample_config())
        .mine(QUERY, None, &schema)
        .await;

    assert_eq!(first.num_clusters, second.num_clusters);
    assert_eq!(first.candidates.len(), second.candidates.len());
    for (a, b) in first.candidates.iter().zip(&second.candidates) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.novelty_score, b.novelty_score);
        assert_eq!(a.composite_score, b.composite_score);
    }
}

#[tokio::test]
async fn truncation_honours_max_candidates() {
    let oracle = ScriptedOracle::new(mixed_script());
    let config = MiningConfig {
        samples: 7,
        max_candidates: 1,
        ..Default::default()
    };
    let miner = DiversityMiner::new(oracle, config).with_capabilities(ClusterCapabilities {
        density: false,
        agglomerative: true,
    });
    let schema = SchemaKind::Risk.definition();

    let result = miner.mine(QUERY, None, &schema).await;

    assert_eq!(result.candidates.len(), 1);
    // Cluster summaries still describe everything found.
    assert_eq!(result.clusters.len(), 2);
}

#[tokio::test]
async fn batch_counts_queries_with_no_candidates_as_failed() {
    // First query yields usable samples, second yields only degenerate ones.
    let script = vec![
        Ok(duplicate_response(0)),
        Ok(duplicate_response(1)),
        Ok("??".to_string()),
        Ok("??".to_string()),
    ];
    let oracle = ScriptedOracle::new(script);
    let config = MiningConfig {
        samples: 2,
        ..Default::default()
    };
    let miner = DiversityMiner::new(oracle, config);
    let schema = SchemaKind::Risk.definition();
    let queries = vec![QUERY.to_string(), format!("{QUERY} again")];

    let batch = miner
        .mine_batch(&queries, None, std::slice::from_ref(&schema), 1)
        .await;

    assert_eq!(batch.queries_succeeded, 1);
    assert_eq!(batch.queries_failed, 1);
    assert!(!batch.results[0].candidates.is_empty());
    assert!(batch.results[1].candidates.is_empty());
    assert_eq!(batch.results[1].samples_passed_quality, 0);
}

#[tokio::test]
async fn batch_mining_preserves_query_order() {
    let oracle = Arc::new(FixedOracle {
        content: duplicate_response(0),
    });
    let config = MiningConfig {
        samples: 4,
        ..Default::default()
    };
    let miner = DiversityMiner::new(oracle, config);
    let schema = SchemaKind::Risk.definition();
    let queries = vec![
        "identify delivery risks".to_string(),
        "identify delivery risks again".to_string(),
    ];

    let batch = miner
        .mine_batch(&queries, None, std::slice::from_ref(&schema), 2)
        .await;

    assert_eq!(batch.queries_succeeded, 2);
    assert_eq!(batch.queries_failed, 0);
    assert_eq!(batch.results[0].query, queries[0]);
    assert_eq!(batch.results[1].query, queries[1]);
    assert_eq!(
        batch.total_cost_usd,
        batch.results.iter().map(|r| r.cost_usd).sum::<f64>()
    );
}
