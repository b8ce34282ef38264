//! Read-time adapter for the per-region execution layout that predates
//! per-unit records. Legacy rows are never written, only mapped into
//! [`ExecutionUnit`] shape and merged behind the canonical units.

use beacon_types::{ExecutionUnit, FailureReason, UnitStatus, DEFAULT_MODEL_ID};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::planner::BENCHMARK_QUESTION_ID;

/// A job-level cross-region run as the previous schema stored it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyCrossRegionExecution {
    pub id: String,
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub total_regions: usize,
    #[serde(default)]
    pub success_count: usize,
    #[serde(default)]
    pub failure_count: usize,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub region_results: Vec<LegacyRegionResult>,
}

/// One region's outcome inside a [`LegacyCrossRegionExecution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyRegionResult {
    pub id: String,
    pub region: String,
    #[serde(default)]
    pub provider_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub question_id: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

fn legacy_status(raw: &str) -> UnitStatus {
    match raw.to_ascii_lowercase().as_str() {
        "success" | "completed" => UnitStatus::Completed,
        "failed" | "error" | "timeout" => UnitStatus::Failed,
        "cancelled" | "canceled" => UnitStatus::Cancelled,
        "running" => UnitStatus::Running,
        _ => UnitStatus::Pending,
    }
}

fn question_index(question_id: &str) -> usize {
    question_id
        .strip_prefix('q')
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

impl LegacyRegionResult {
    pub fn to_unit(&self, job_id: &str) -> ExecutionUnit {
        let status = legacy_status(&self.status);
        let question_id = self
            .question_id
            .clone()
            .unwrap_or_else(|| BENCHMARK_QUESTION_ID.to_string());
        let failure = match (status, &self.error) {
            (UnitStatus::Failed, Some(msg)) => Some(FailureReason::new("legacy_error", "legacy", msg.clone())),
            (UnitStatus::Failed, None) => Some(FailureReason::new("legacy_error", "legacy", self.status.clone())),
            _ => None,
        };
        // legacy rows could carry a completion time before the start
        let completed_at = self.completed_at.map(|c| c.max(self.started_at));

        ExecutionUnit {
            id: self.id.clone(),
            job_id: job_id.to_string(),
            region: self.region.clone(),
            model_id: self.model_id.clone().unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            question_index: question_index(&question_id),
            question_id,
            question: String::new(),
            provider_id: self.provider_id.clone(),
            status,
            started_at: Some(self.started_at),
            completed_at,
            retry_count: 0,
            output: self.output.clone(),
            receipt: None,
            failure,
            created_at: self.started_at,
        }
    }
}

/// Canonical units first, then any legacy unit whose (region, model, question)
/// has no canonical counterpart.
pub fn merge_units(
    canonical: Vec<ExecutionUnit>,
    legacy: &[LegacyCrossRegionExecution],
) -> Vec<ExecutionUnit> {
    let mut seen: HashSet<(String, String, String)> = canonical
        .iter()
        .map(|u| (u.region.clone(), u.model_id.clone(), u.question_id.clone()))
        .collect();
    let mut merged = canonical;
    for execution in legacy {
        for row in &execution.region_results {
            let unit = row.to_unit(&execution.job_id);
            let key = (unit.region.clone(), unit.model_id.clone(), unit.question_id.clone());
            if seen.insert(key) {
                merged.push(unit);
            }
        }
    }
    merged
}
