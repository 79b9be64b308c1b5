//! Extraction schemas: which fields the oracle is asked for and how each
//! field aggregates across samples.
//!
//! A schema is the pairing of an extraction prompt (shown to the oracle) with
//! per-field aggregation types. Built-in schemas cover the common project
//! analysis shapes; callers with bespoke needs construct a
//! [`SchemaDefinition`] directly.

use serde::{Deserialize, Serialize};

/// How a field's values aggregate across samples.
///
/// Closed set: a field whose declared type is missing from the schema falls
/// into an explicit unknown-type default at aggregation time (categorical
/// consensus, fixed 0.5 confidence), not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Numeric,
    Categorical,
    Text,
    List,
}

/// One field declaration within a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// A complete extraction schema: prompt plus field typing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub name: String,
    pub extraction_prompt: String,
    pub fields: Vec<FieldSpec>,
}

impl SchemaDefinition {
    pub fn new(name: impl Into<String>, extraction_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extraction_prompt: extraction_prompt.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec::new(name, field_type));
        self
    }

    /// Declared type for a field, if any.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.field_type)
    }
}

/// Built-in schema catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    Risk,
    Estimate,
    Recommendation,
    Milestone,
    Barrier,
    OutcomeMeasure,
    StakeholderImpact,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Risk => "risk",
            SchemaKind::Estimate => "estimate",
            SchemaKind::Recommendation => "recommendation",
            SchemaKind::Milestone => "milestone",
            SchemaKind::Barrier => "barrier",
            SchemaKind::OutcomeMeasure => "outcome_measure",
            SchemaKind::StakeholderImpact => "stakeholder_impact",
        }
    }

    /// Materialise the full definition for this schema.
    pub fn definition(&self) -> SchemaDefinition {
        use FieldType::*;
        match self {
            SchemaKind::Risk => SchemaDefinition::new("Risk Analysis", RISK_PROMPT)
                .field("probability", Numeric)
                .field("impact", Numeric)
                .field("category", Categorical)
                .field("status", Categorical)
                .field("description", Text)
                .field("mitigation", Text)
                .field("owner", Text),
            SchemaKind::Estimate => SchemaDefinition::new("Effort/Cost Estimate", ESTIMATE_PROMPT)
                .field("value", Numeric)
                .field("range_low", Numeric)
                .field("range_high", Numeric)
                .field("description", Text)
                .field("unit", Text)
                .field("confidence_notes", Text)
                .field("assumptions", List),
            SchemaKind::Recommendation => {
                SchemaDefinition::new("Recommendations", RECOMMENDATION_PROMPT)
                    .field("priority", Categorical)
                    .field("action", Text)
                    .field("rationale", Text)
                    .field("owner", Text)
                    .field("timeframe", Text)
                    .field("dependencies", List)
            }
            SchemaKind::Milestone => SchemaDefinition::new("Milestones", MILESTONE_PROMPT)
                .field("name", Text)
                .field("description", Text)
                .field("target_date", Text)
                .field("dependencies", List)
                .field("deliverables", List),
            SchemaKind::Barrier => SchemaDefinition::new("Barriers and Blockers", BARRIER_PROMPT)
                .field("barrier_theme", Categorical)
                .field("severity", Categorical)
                .field("description", Text)
                .field("affected_personas", List)
                .field("recommended_actions", List)
                .field("success_metrics", List),
            SchemaKind::OutcomeMeasure => {
                SchemaDefinition::new("Outcome Measures", OUTCOME_MEASURE_PROMPT)
                    .field("measure", Text)
                    .field("description", Text)
                    .field("target", Text)
                    .field("baseline", Text)
                    .field("measurement_method", Text)
                    .field("frequency", Text)
            }
            SchemaKind::StakeholderImpact => {
                SchemaDefinition::new("Stakeholder Impacts", STAKEHOLDER_IMPACT_PROMPT)
                    .field("sentiment", Categorical)
                    .field("stakeholder", Text)
                    .field("impact_description", Text)
                    .field("communication_needs", Text)
                    .field("actions_required", List)
            }
        }
    }
}

const RISK_PROMPT: &str = "Extract risk items with these fields:
- description: Clear description of the risk
- category: One of Technical, Commercial, Schedule, Resource, External
- probability: 1-5 scale (1=Very Low, 5=Very High)
- impact: 1-5 scale (1=Very Low, 5=Very High)
- mitigation: Recommended mitigation action
- owner: Who should own this risk (if identifiable)
- status: Current status (default to Open)

Return as a JSON array of risk objects.";

const ESTIMATE_PROMPT: &str = "Extract estimates with these fields:
- description: What is being estimated
- value: Point estimate (numeric)
- unit: Unit of measurement (days, hours, GBP, USD, etc.)
- range_low: Lower bound of reasonable range
- range_high: Upper bound of reasonable range
- assumptions: List of key assumptions
- confidence_notes: Any notes about estimate confidence

Return as a JSON array of estimate objects.";

const RECOMMENDATION_PROMPT: &str = "Extract recommendations with these fields:
- action: The recommended action (clear, actionable)
- rationale: Why this is recommended
- priority: High, Medium, or Low
- owner: Suggested owner or responsible party
- timeframe: When this should be completed
- dependencies: What this depends on

Return as a JSON array of recommendation objects.";

const MILESTONE_PROMPT: &str = "Extract milestones with these fields:
- name: Short milestone name
- description: What this milestone represents
- target_date: Target completion date
- dependencies: What must complete before this
- deliverables: What is delivered at this milestone

Return as a JSON array of milestone objects.";

const BARRIER_PROMPT: &str = "Extract barriers/blockers with these fields:
- description: Clear description of the barrier
- barrier_theme: One of Leadership, Data, Digital, Skills, Procurement, Risk
- severity: High, Medium, or Low
- affected_personas: Who is affected (Project Lead, Programme Lead, Business Lead)
- recommended_actions: Actions to overcome this barrier
- success_metrics: How to measure if barrier is overcome

Return as a JSON array of barrier objects.";

const OUTCOME_MEASURE_PROMPT: &str = "Extract outcome measures/KPIs with these fields:
- measure: Name of the measure
- description: What it measures and why it matters
- target: Target value or state
- baseline: Current baseline if known
- measurement_method: How it will be measured
- frequency: How often it will be measured

Return as a JSON array of outcome measure objects.";

const STAKEHOLDER_IMPACT_PROMPT: &str = "Extract stakeholder impacts with these fields:
- stakeholder: The stakeholder group or individual
- impact_description: How they are impacted
- sentiment: Positive, Negative, Neutral, or Mixed
- actions_required: Actions needed to address this stakeholder
- communication_needs: What communication is needed

Return as a JSON array of stakeholder impact objects.";

/// Build the full extraction prompt shown to the oracle.
pub fn build_extraction_prompt(query: &str, context: Option<&str>, schema_prompt: &str) -> String {
    let mut parts = vec![
        "You are a precise extraction assistant. Extract structured information exactly as specified.".to_string(),
        String::new(),
        "EXTRACTION SCHEMA:".to_string(),
        schema_prompt.to_string(),
        String::new(),
        "IMPORTANT:".to_string(),
        "- Extract only what is explicitly stated or can be directly inferred".to_string(),
        "- Use null for fields that cannot be determined".to_string(),
        "- Be consistent in formatting".to_string(),
        "- Return valid JSON only, no markdown formatting".to_string(),
        String::new(),
    ];

    if let Some(ctx) = context {
        parts.push("CONTEXT DOCUMENT:".to_string());
        parts.push(ctx.to_string());
        parts.push(String::new());
    }

    parts.push("QUERY:".to_string());
    parts.push(query.to_string());
    parts.push(String::new());
    parts.push("OUTPUT (valid JSON array):".to_string());

    parts.join("\n")
}
