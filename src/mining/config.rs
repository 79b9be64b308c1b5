//! Mining configuration and temperature scheduling.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How sampling temperature evolves across a mining run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureSchedule {
    /// Constant at `temperature_start`.
    Fixed,
    /// Linear ramp from start to end.
    LinearIncrease,
    /// Slow start, fast end: progress warped by (e^(2p) - 1) / (e^2 - 1).
    Exponential,
    /// Uniform draw from [start, end] per sample.
    Random,
    /// High temperature for the first half (explore), low for the second
    /// (exploit).
    ExploreExploit,
}

/// How the base prompt is perturbed across samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptVariation {
    None,
    /// Prefix a rotating analyst persona.
    RoleInjection,
    /// Prefix a rotating framing instruction.
    InstructionVariation,
    /// Both prefixes.
    All,
}

/// Tunables for a diversity mining run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Samples to generate per query. Sweet spot is 20-50.
    pub samples: usize,
    /// Ceiling for adaptive sampling. Reserved: saturation-driven extension
    /// is not implemented yet, so runs never exceed `samples`.
    pub max_samples: usize,
    /// Temperature at the start of the schedule.
    pub temperature_start: f64,
    /// Temperature at the end of the schedule.
    pub temperature_end: f64,
    pub schedule: TemperatureSchedule,
    pub variation: PromptVariation,
    /// Minimum composite quality for a sample to reach clustering.
    pub quality_threshold: f64,
    /// Semantic entropy above this marks a candidate as a potential
    /// hallucination.
    pub entropy_threshold: f64,
    pub novelty_weight: f64,
    pub coherence_weight: f64,
    pub coverage_weight: f64,
    /// Top candidates returned after ranking.
    pub max_candidates: usize,
    /// Token cap per oracle call.
    pub max_tokens: u32,
    /// Seed for the random temperature schedule.
    pub rng_seed: u64,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            samples: 32,
            max_samples: 64,
            temperature_start: 0.7,
            temperature_end: 1.0,
            schedule: TemperatureSchedule::LinearIncrease,
            variation: PromptVariation::RoleInjection,
            quality_threshold: 0.6,
            entropy_threshold: 0.7,
            novelty_weight: 0.4,
            coherence_weight: 0.3,
            coverage_weight: 0.3,
            max_candidates: 5,
            max_tokens: 2000,
            rng_seed: 0,
        }
    }
}

impl MiningConfig {
    /// Temperature for sample `index` of `total` under the configured
    /// schedule.
    pub fn temperature_for(&self, index: usize, total: usize, rng: &mut impl Rng) -> f64 {
        let span = self.temperature_end - self.temperature_start;
        match self.schedule {
            TemperatureSchedule::Fixed => self.temperature_start,
            TemperatureSchedule::LinearIncrease => {
                self.temperature_start + self.progress(index, total) * span
            }
            TemperatureSchedule::Exponential => {
                let p = self.progress(index, total);
                let warped = ((2.0 * p).exp() - 1.0) / (2.0f64.exp() - 1.0);
                self.temperature_start + warped * span
            }
            TemperatureSchedule::Random => {
                rng.gen_range(self.temperature_start..=self.temperature_end)
            }
            TemperatureSchedule::ExploreExploit => {
                if self.progress(index, total) < 0.5 {
                    self.temperature_end
                } else {
                    self.temperature_start
                }
            }
        }
    }

    fn progress(&self, index: usize, total: usize) -> f64 {
        index as f64 / (total.saturating_sub(1)).max(1) as f64
    }
}
