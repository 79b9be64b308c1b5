#![forbid(unsafe_code)]

//! # accord-harness
//!
//! Defensible answers from an unreliable oracle, via self-consistency.
//!
//! A single LLM response is an anecdote. accord-harness queries the oracle
//! repeatedly for the same question and turns cross-sample agreement into a
//! confidence signal, two ways:
//!
//! - **Consensus extraction** ([`ConsensusExtractor`]): aggregate repeated
//!   samples into one best answer with per-field confidence, numeric outlier
//!   flags, and a recommended human-review level.
//! - **Diversity mining** ([`DiversityMiner`]): deliberately maximise
//!   disagreement with temperature scheduling and prompt perturbation, then
//!   cluster the responses and surface one representative per genuinely
//!   distinct approach.
//!
//! The oracle itself is a black box behind the [`Oracle`] trait.

pub mod aggregation;
pub mod clustering;
pub mod consensus;
pub mod mining;
pub mod oracle;
pub mod parser;
pub mod quality;
pub mod schema;

pub use aggregation::{NumericSummary, OutlierReport, ReviewLevel};
pub use consensus::{
    BatchConsensusResult, ConsensusConfig, ConsensusExtractor, ConsensusResult, Sample,
};
pub use mining::{
    BatchMiningResult, DiversityMiner, MiningCandidate, MiningConfig, MiningResult,
    PromptVariation, TemperatureSchedule,
};
pub use oracle::{CompletionRequest, CompletionResponse, Message, Oracle, OracleError, Role};
pub use quality::QualityScore;
pub use schema::{FieldSpec, FieldType, SchemaDefinition, SchemaKind};
