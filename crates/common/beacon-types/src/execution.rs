use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};

use crate::analysis::RegionScoring;
use crate::jobs::JobSpec;
use crate::receipt::Receipt;

/// Aggregate job status. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a forward transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Running) => true,
            (JobStatus::Queued | JobStatus::Running, JobStatus::Completed | JobStatus::Failed) => {
                true
            }
            // explicit single-unit retry re-aggregates an already terminal job
            (a, b) if a.is_terminal() && b.is_terminal() => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl UnitStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UnitStatus::Completed | UnitStatus::Failed | UnitStatus::Cancelled
        )
    }
}

/// Structured reason attached to a failed or cancelled unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub code: String,
    pub stage: String,
    pub message: String,
}

impl FailureReason {
    pub fn new(code: impl Into<String>, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// One (question, model, region) work item and its durable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionUnit {
    pub id: String,
    pub job_id: String,
    pub region: String,
    pub model_id: String,
    pub question_id: String,
    pub question_index: usize,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    pub status: UnitStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub receipt: Option<Receipt>,
    #[serde(default)]
    pub failure: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
}

impl ExecutionUnit {
    /// A fresh pending unit with a new id.
    pub fn pending(
        job_id: &str,
        region: &str,
        model_id: &str,
        question_index: usize,
        question_id: &str,
        question: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            region: region.to_string(),
            model_id: model_id.to_string(),
            question_id: question_id.to_string(),
            question_index,
            question: question.to_string(),
            provider_id: None,
            status: UnitStatus::Pending,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            output: None,
            receipt: None,
            failure: None,
            created_at: Utc::now(),
        }
    }

    /// Duration in milliseconds; `None` until the unit has both timestamps.
    pub fn duration_ms(&self) -> Option<u64> {
        let (start, end) = (self.started_at?, self.completed_at?);
        Some((end - start).num_milliseconds().max(0) as u64)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.status, UnitStatus::Failed | UnitStatus::Cancelled)
    }
}

/// Persisted job: the validated spec plus its aggregate status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub spec: JobSpec,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RegionStatus {
    Completed,
    Failed,
}

/// Aggregation of every unit a job ran in one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionResult {
    pub region: String,
    pub status: RegionStatus,
    pub total_units: usize,
    pub completed_units: usize,
    pub failed_units: usize,
    pub receipts: Vec<Receipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<RegionScoring>,
}

impl RegionResult {
    /// Groups units by region, keeping the first-seen region order.
    pub fn aggregate(units: &[ExecutionUnit]) -> Vec<RegionResult> {
        let mut results: Vec<RegionResult> = Vec::new();
        for unit in units {
            let idx = match results.iter().position(|r| r.region == unit.region) {
                Some(idx) => idx,
                None => {
                    results.push(RegionResult {
                        region: unit.region.clone(),
                        status: RegionStatus::Failed,
                        total_units: 0,
                        completed_units: 0,
                        failed_units: 0,
                        receipts: Vec::new(),
                        scoring: None,
                    });
                    results.len() - 1
                }
            };
            let entry = &mut results[idx];
            entry.total_units += 1;
            match unit.status {
                UnitStatus::Completed => {
                    entry.completed_units += 1;
                    entry.status = RegionStatus::Completed;
                    if let Some(receipt) = &unit.receipt {
                        entry.receipts.push(receipt.clone());
                    }
                }
                UnitStatus::Failed | UnitStatus::Cancelled => entry.failed_units += 1,
                UnitStatus::Pending | UnitStatus::Running => {}
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn unit(region: &str, status: UnitStatus) -> ExecutionUnit {
        ExecutionUnit {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: "job-1".into(),
            region: region.into(),
            model_id: "m".into(),
            question_id: "q0".into(),
            question_index: 0,
            question: "q".into(),
            provider_id: None,
            status,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            output: None,
            receipt: None,
            failure: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn duration_is_never_negative() {
        let mut u = unit("US", UnitStatus::Completed);
        let now = Utc::now();
        u.started_at = Some(now);
        u.completed_at = Some(now - Duration::seconds(5));
        assert_eq!(u.duration_ms(), Some(0));
        u.completed_at = Some(now + Duration::milliseconds(250));
        assert_eq!(u.duration_ms(), Some(250));
    }

    #[test]
    fn status_round_trips_as_snake_case() {
        assert_eq!(UnitStatus::Cancelled.to_string(), "cancelled");
        assert_eq!("running".parse::<JobStatus>().unwrap(), JobStatus::Running);
        assert_eq!(serde_json::to_value(JobStatus::Queued).unwrap(), "queued");
    }

    #[test]
    fn job_status_never_rolls_back() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn aggregate_groups_by_region() {
        let units = vec![
            unit("US", UnitStatus::Completed),
            unit("EU", UnitStatus::Failed),
            unit("US", UnitStatus::Failed),
            unit("EU", UnitStatus::Cancelled),
        ];
        let results = RegionResult::aggregate(&units);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].region, "US");
        assert_eq!(results[0].status, RegionStatus::Completed);
        assert_eq!(results[0].completed_units, 1);
        assert_eq!(results[1].status, RegionStatus::Failed);
        assert_eq!(results[1].failed_units, 2);
    }
}
