//! Deterministic prompt perturbation for diverse generation.
//!
//! Each sample index maps to a persona and/or framing instruction by cycling
//! through fixed template tables, so the same index always yields the same
//! perturbation.

use super::config::PromptVariation;

/// Analyst personas injected ahead of the base prompt.
pub const ROLE_TEMPLATES: [&str; 10] = [
    "You are a cautious analyst who identifies potential problems.",
    "You are an optimistic strategist who sees opportunities.",
    "You are a pragmatic project manager focused on delivery.",
    "You are a critical reviewer looking for gaps and weaknesses.",
    "You are a creative problem-solver who thinks unconventionally.",
    "You are a risk-averse auditor who prioritises safety.",
    "You are an experienced practitioner who has seen similar situations.",
    "You are a fresh perspective from outside the domain.",
    "You are a detail-oriented specialist who examines specifics.",
    "You are a big-picture thinker who considers systemic effects.",
];

/// Framing instructions injected ahead of the base prompt.
pub const INSTRUCTION_VARIATIONS: [&str; 10] = [
    "Analyse this and provide your assessment:",
    "Consider this carefully and share your findings:",
    "Review the following and identify key points:",
    "Examine this situation and provide insights:",
    "Evaluate this and give your professional opinion:",
    "Study this and highlight what stands out:",
    "Assess this from multiple angles:",
    "Look at this critically and share observations:",
    "Consider what others might miss in this:",
    "Think through this systematically:",
];

/// Perturb the base prompt for the given sample index.
pub fn diversify_prompt(base_prompt: &str, sample_index: usize, variation: PromptVariation) -> String {
    let mut parts: Vec<&str> = Vec::new();

    if matches!(
        variation,
        PromptVariation::RoleInjection | PromptVariation::All
    ) {
        parts.push(ROLE_TEMPLATES[sample_index % ROLE_TEMPLATES.len()]);
    }
    if matches!(
        variation,
        PromptVariation::InstructionVariation | PromptVariation::All
    ) {
        parts.push(INSTRUCTION_VARIATIONS[sample_index % INSTRUCTION_VARIATIONS.len()]);
    }

    if parts.is_empty() {
        return base_prompt.to_string();
    }
    format!("{}\n\n{}", parts.join(" "), base_prompt)
}
