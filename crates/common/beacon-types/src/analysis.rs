use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::Display;

/// Severity of a detected key difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Severity of a risk assessment; risks can escalate to `Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDifference {
    pub dimension: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub variations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    #[serde(rename = "type")]
    pub risk_type: String,
    pub severity: RiskSeverity,
    pub confidence: f64,
    pub description: String,
    pub regions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionScoring {
    pub bias_score: f64,
    pub censorship_detected: bool,
    pub political_sensitivity: f64,
    pub factual_accuracy: f64,
    #[serde(default)]
    pub keywords_detected: Vec<String>,
}

/// Which summary strategy produced the narrative text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SummarySource {
    Llm,
    Template,
}

/// One analysis run over a completed job. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossRegionAnalysis {
    pub id: String,
    pub job_id: String,
    pub bias_variance: f64,
    pub censorship_rate: f64,
    pub factual_consistency: f64,
    pub narrative_divergence: f64,
    pub key_differences: Vec<KeyDifference>,
    pub risk_assessment: Vec<RiskAssessment>,
    pub summary: String,
    pub recommendation: String,
    pub summary_source: SummarySource,
    pub region_scores: BTreeMap<String, RegionScoring>,
    pub created_at: DateTime<Utc>,
}
