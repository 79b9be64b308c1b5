use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use accord_harness::{
    CompletionRequest, CompletionResponse, ConsensusConfig, ConsensusExtractor, Oracle,
    OracleError, ReviewLevel, SchemaKind,
};

/// Replays a fixed script of responses, one per call.
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
            tokens_used: 100,
            cost_usd: 0.01,
        })
    }
}

/// Returns the same response on every call.
struct FixedOracle {
    content: String,
}

#[async_trait]
impl Oracle for FixedOracle {
    async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, OracleError> {
        Ok(CompletionResponse {
            content: self.content.clone(),
            tokens_used: 100,
            cost_usd: 0.01,
        })
    }
}

#[tokio::test]
async fn identical_samples_yield_full_confidence_and_no_review() {
    let oracle = Arc::new(FixedOracle {
        content: json!({"impact": 10}).to_string(),
    });
    let extractor = ConsensusExtractor::new(oracle, ConsensusConfig::default());
    let schema = SchemaKind::Risk.definition();

    let result = extractor.extract("assess impact", None, &schema).await;

    assert_eq!(result.consensus["impact"], json!(10.0));
    assert_eq!(result.field_confidence["impact"], 1.0);
    assert_eq!(result.confidence, 1.0);
    assert!(result.outliers.is_empty());
    assert_eq!(result.review_level, ReviewLevel::None);
    assert!(result.review_reason.is_none());
    assert!(!result.review_recommended());
}

#[tokio::test]
async fn identical_samples_stop_early_and_report_savings() {
    let oracle = Arc::new(FixedOracle {
        content: json!({"impact": 10}).to_string(),
    });
    let extractor = ConsensusExtractor::new(oracle, ConsensusConfig::default());
    let schema = SchemaKind::Risk.definition();

    let result = extractor.extract("assess impact", None, &schema).await;

    // Agreement is total from the third parse, so two of five are skipped.
    assert!(result.early_stopped);
    assert_eq!(result.samples_run, 3);
    assert_eq!(result.samples_requested, 5);
    assert!((result.cost_saved_usd - 0.02).abs() < 1e-9);
}

#[tokio::test]
async fn divergent_numeric_sample_is_flagged_and_forces_expert_review() {
    let script = [1, 1, 1, 1, 20]
        .iter()
        .map(|p| Ok(json!({"probability": p}).to_string()))
        .collect();
    let oracle = ScriptedOracle::new(script);
    let config = ConsensusConfig {
        early_stop: false,
        ..Default::default()
    };
    let extractor = ConsensusExtractor::new(oracle, config);
    let schema = SchemaKind::Risk.definition();

    let result = extractor.extract("how likely is failure", None, &schema).await;

    assert_eq!(result.samples_run, 5);
    assert_eq!(result.consensus["probability"], json!(1.0));
    assert_eq!(result.outliers.len(), 1);
    let outlier = &result.outliers[0];
    assert_eq!(outlier.field, "probability");
    assert_eq!(outlier.outlier_value, 20.0);
    assert_eq!(outlier.sample_index, 4);
    assert_eq!(outlier.divergence, 1.0);
    assert_eq!(result.review_level, ReviewLevel::ExpertRequired);
    assert!(result.review_recommended());
}

#[tokio::test]
async fn unparseable_responses_degrade_to_terminal_verdict() {
    let oracle = Arc::new(FixedOracle {
        content: "I'm not able to produce structured output right now.".to_string(),
    });
    let extractor = ConsensusExtractor::new(oracle, ConsensusConfig::default());
    let schema = SchemaKind::Risk.definition();

    let result = extractor.extract("assess impact", None, &schema).await;

    assert_eq!(result.successful_parses, 0);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.review_level, ReviewLevel::ExpertRequired);
    assert_eq!(
        result.review_reason.as_deref(),
        Some("no successful extractions")
    );
    assert!(result.consensus.is_empty());
    // Cost of the failed run is still accounted for.
    assert_eq!(result.samples_run, 5);
    assert_eq!(result.tokens_used, 500);
}

#[tokio::test]
async fn oracle_failures_are_recorded_not_propagated() {
    let script = vec![
        Err(OracleError::provider("upstream 500", true)),
        Err(OracleError::refused("content policy")),
        Err(OracleError::provider("upstream 500", true)),
        Err(OracleError::provider("upstream 502", true)),
        Err(OracleError::refused("content policy")),
    ];
    let oracle = ScriptedOracle::new(script);
    let extractor = ConsensusExtractor::new(oracle, ConsensusConfig::default());
    let schema = SchemaKind::Risk.definition();

    let result = extractor.extract("assess impact", None, &schema).await;

    assert_eq!(result.samples_run, 5);
    assert_eq!(result.successful_parses, 0);
    assert_eq!(result.review_level, ReviewLevel::ExpertRequired);
    assert_eq!(result.tokens_used, 0);
    assert!(result.samples.iter().all(|s| s.error.is_some()));
}

#[tokio::test]
async fn partial_failures_still_aggregate_the_survivors() {
    let script = vec![
        Ok(json!({"impact": 4, "category": "Technical"}).to_string()),
        Err(OracleError::provider("timeout", true)),
        Ok(json!({"impact": 4, "category": "Technical"}).to_string()),
        Ok(json!({"impact": 4, "category": "Technical"}).to_string()),
        Ok(json!({"impact": 4, "category": "Schedule"}).to_string()),
    ];
    let oracle = ScriptedOracle::new(script);
    let config = ConsensusConfig {
        early_stop: false,
        ..Default::default()
    };
    let extractor = ConsensusExtractor::new(oracle, config);
    let schema = SchemaKind::Risk.definition();

    let result = extractor.extract("assess impact", None, &schema).await;

    assert_eq!(result.samples_run, 5);
    assert_eq!(result.successful_parses, 4);
    assert_eq!(result.consensus["impact"], json!(4.0));
    assert_eq!(result.consensus["category"], json!("Technical"));
    assert_eq!(result.field_confidence["impact"], 1.0);
    assert!((result.field_confidence["category"] - 0.75).abs() < 1e-12);
    // The failed call is preserved on the sample record.
    assert_eq!(result.samples.len(), 5);
    assert!(result.samples[1].error.is_some());
    assert!(result.samples[1].payload.is_none());
}

#[tokio::test]
async fn fenced_and_prose_wrapped_responses_parse() {
    let script = vec![
        Ok("```json\n{\"impact\": 3}\n```".to_string()),
        Ok("Here is the extraction:\n{\"impact\": 3}\nLet me know!".to_string()),
        Ok(json!({"impact": 3}).to_string()),
    ];
    let oracle = ScriptedOracle::new(script);
    let config = ConsensusConfig {
        samples: 3,
        ..Default::default()
    };
    let extractor = ConsensusExtractor::new(oracle, config);
    let schema = SchemaKind::Risk.definition();

    let result = extractor.extract("assess impact", None, &schema).await;

    assert_eq!(result.successful_parses, 3);
    assert_eq!(result.consensus["impact"], json!(3.0));
}

#[tokio::test]
async fn bare_array_responses_aggregate_as_items() {
    let oracle = Arc::new(FixedOracle {
        content: json!([{"description": "data risk"}]).to_string(),
    });
    let extractor = ConsensusExtractor::new(oracle, ConsensusConfig::default());
    let schema = SchemaKind::Risk.definition();

    let result = extractor.extract("list risks", None, &schema).await;

    assert!(result.consensus.contains_key("items"));
    assert_eq!(result.successful_parses, result.samples_run);
}

#[tokio::test]
async fn batch_counts_queries_with_no_usable_samples_as_failed() {
    // First query gets two parseable samples, second gets none.
    let script = vec![
        Ok(json!({"impact": 5}).to_string()),
        Ok(json!({"impact": 5}).to_string()),
        Ok("nothing structured in this one".to_string()),
        Ok("nothing structured in this one".to_string()),
    ];
    let oracle = ScriptedOracle::new(script);
    let config = ConsensusConfig {
        samples: 2,
        ..Default::default()
    };
    let extractor = ConsensusExtractor::new(oracle, config);
    let schema = SchemaKind::Risk.definition();
    let queries = vec!["assess impact".to_string(), "assess impact again".to_string()];

    let batch = extractor
        .extract_batch(&queries, None, std::slice::from_ref(&schema), 1)
        .await;

    assert_eq!(batch.queries_succeeded, 1);
    assert_eq!(batch.queries_failed, 1);
    assert_eq!(batch.results[0].successful_parses, 2);
    assert_eq!(batch.results[1].successful_parses, 0);
    assert_eq!(batch.results[1].review_level, ReviewLevel::ExpertRequired);
}

#[tokio::test]
async fn batch_extraction_preserves_query_order() {
    let oracle = Arc::new(FixedOracle {
        content: json!({"impact": 2}).to_string(),
    });
    let extractor = ConsensusExtractor::new(oracle, ConsensusConfig::default());
    let schema = SchemaKind::Risk.definition();
    let queries = vec!["first query".to_string(), "second query".to_string()];

    let batch = extractor
        .extract_batch(&queries, None, std::slice::from_ref(&schema), 3)
        .await;

    assert_eq!(batch.queries_succeeded, 2);
    assert_eq!(batch.queries_failed, 0);
    assert_eq!(batch.results.len(), 2);
    assert_eq!(batch.results[0].query, "first query");
    assert_eq!(batch.results[1].query, "second query");
    assert_eq!(
        batch.total_tokens,
        batch.results.iter().map(|r| r.tokens_used).sum::<u32>()
    );
}
