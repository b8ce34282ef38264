use async_trait::async_trait;
use beacon_types::{CrossRegionAnalysis, ExecutionUnit, JobRecord, JobSpec, JobStatus, UnitStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::legacy::LegacyCrossRegionExecution;

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("illegal transition for {id}: {from} -> {to}")]
    IllegalTransition { id: String, from: String, to: String },

    #[error("unit {id} is {status} and cannot be retried")]
    NotRetryable { id: String, status: UnitStatus },

    #[error("unit {id} already retried {retry_count} times (limit {max_retries})")]
    RetryLimitExceeded { id: String, retry_count: u32, max_retries: u32 },

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("storage failure: {0}")]
    Internal(String),
}

/// Persistence for jobs, units and analyses.
///
/// Every method is atomic with respect to the record it touches; callers
/// never need an outer lock.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Persist a validated job in the `queued` state.
    async fn insert_job(&self, spec: JobSpec) -> Result<JobRecord, StoreError>;

    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError>;

    /// Move a job forward. Backward transitions are rejected.
    async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        failure_reason: Option<String>,
    ) -> Result<JobRecord, StoreError>;

    /// Record the planned units of a job in plan order.
    async fn insert_units(&self, units: Vec<ExecutionUnit>) -> Result<(), StoreError>;

    /// Overwrite a unit. Terminal units are immutable here; use `begin_retry`.
    async fn update_unit(&self, unit: ExecutionUnit) -> Result<(), StoreError>;

    async fn get_unit(&self, unit_id: &str) -> Result<Option<ExecutionUnit>, StoreError>;

    async fn list_units(&self, job_id: &str) -> Result<Vec<ExecutionUnit>, StoreError>;

    /// Atomically check the retry budget, bump `retry_count` and mark the unit running.
    async fn begin_retry(&self, unit_id: &str, max_retries: u32) -> Result<ExecutionUnit, StoreError>;

    async fn save_analysis(&self, analysis: CrossRegionAnalysis) -> Result<(), StoreError>;

    async fn latest_analysis(&self, job_id: &str) -> Result<Option<CrossRegionAnalysis>, StoreError>;

    /// Rows written by the previous per-region schema, read-only.
    async fn legacy_executions(&self, job_id: &str) -> Result<Vec<LegacyCrossRegionExecution>, StoreError>;
}

fn rank(status: UnitStatus) -> u8 {
    match status {
        UnitStatus::Pending => 0,
        UnitStatus::Running => 1,
        UnitStatus::Completed | UnitStatus::Failed | UnitStatus::Cancelled => 2,
    }
}

#[derive(Default)]
struct UnitTable {
    by_id: HashMap<String, ExecutionUnit>,
    by_job: HashMap<String, Vec<String>>,
}

/// In-memory store used by the service and tests.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    jobs: Arc<RwLock<HashMap<String, JobRecord>>>,
    units: Arc<RwLock<UnitTable>>,
    analyses: Arc<RwLock<HashMap<String, Vec<CrossRegionAnalysis>>>>,
    legacy: Arc<RwLock<HashMap<String, Vec<LegacyCrossRegionExecution>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row in the legacy per-region layout.
    pub async fn insert_legacy_execution(&self, execution: LegacyCrossRegionExecution) {
        let mut guard = self.legacy.write().await;
        guard.entry(execution.job_id.clone()).or_default().push(execution);
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn insert_job(&self, spec: JobSpec) -> Result<JobRecord, StoreError> {
        let id = spec.job_id().to_string();
        if id.is_empty() {
            return Err(StoreError::Internal("job has no id".to_string()));
        }
        let mut guard = self.jobs.write().await;
        if guard.contains_key(&id) {
            return Err(StoreError::Duplicate(id));
        }
        let now = Utc::now();
        let record = JobRecord {
            id: id.clone(),
            spec,
            status: JobStatus::Queued,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        guard.insert(id, record.clone());
        Ok(record)
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        failure_reason: Option<String>,
    ) -> Result<JobRecord, StoreError> {
        let mut guard = self.jobs.write().await;
        let record = guard
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job_id)))?;
        if record.status != status && !record.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition {
                id: job_id.to_string(),
                from: record.status.to_string(),
                to: status.to_string(),
            });
        }
        record.status = status;
        record.failure_reason = failure_reason;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn insert_units(&self, units: Vec<ExecutionUnit>) -> Result<(), StoreError> {
        let mut table = self.units.write().await;
        if let Some(dup) = units.iter().find(|u| table.by_id.contains_key(&u.id)) {
            return Err(StoreError::Duplicate(dup.id.clone()));
        }
        for unit in units {
            table
                .by_job
                .entry(unit.job_id.clone())
                .or_default()
                .push(unit.id.clone());
            table.by_id.insert(unit.id.clone(), unit);
        }
        Ok(())
    }

    async fn update_unit(&self, unit: ExecutionUnit) -> Result<(), StoreError> {
        let mut table = self.units.write().await;
        let current = table
            .by_id
            .get_mut(&unit.id)
            .ok_or_else(|| StoreError::NotFound(format!("unit {}", unit.id)))?;
        if current.status.is_terminal() || rank(unit.status) < rank(current.status) {
            return Err(StoreError::IllegalTransition {
                id: unit.id.clone(),
                from: current.status.to_string(),
                to: unit.status.to_string(),
            });
        }
        *current = unit;
        Ok(())
    }

    async fn get_unit(&self, unit_id: &str) -> Result<Option<ExecutionUnit>, StoreError> {
        Ok(self.units.read().await.by_id.get(unit_id).cloned())
    }

    async fn list_units(&self, job_id: &str) -> Result<Vec<ExecutionUnit>, StoreError> {
        let table = self.units.read().await;
        let Some(ids) = table.by_job.get(job_id) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| table.by_id.get(id).cloned()).collect())
    }

    async fn begin_retry(&self, unit_id: &str, max_retries: u32) -> Result<ExecutionUnit, StoreError> {
        let mut table = self.units.write().await;
        let unit = table
            .by_id
            .get_mut(unit_id)
            .ok_or_else(|| StoreError::NotFound(format!("unit {}", unit_id)))?;
        if !unit.is_retryable() {
            return Err(StoreError::NotRetryable {
                id: unit_id.to_string(),
                status: unit.status,
            });
        }
        if unit.retry_count >= max_retries {
            return Err(StoreError::RetryLimitExceeded {
                id: unit_id.to_string(),
                retry_count: unit.retry_count,
                max_retries,
            });
        }
        unit.retry_count += 1;
        unit.status = UnitStatus::Running;
        unit.started_at = Some(Utc::now());
        unit.completed_at = None;
        unit.failure = None;
        unit.output = None;
        unit.receipt = None;
        Ok(unit.clone())
    }

    async fn save_analysis(&self, analysis: CrossRegionAnalysis) -> Result<(), StoreError> {
        let mut guard = self.analyses.write().await;
        guard.entry(analysis.job_id.clone()).or_default().push(analysis);
        Ok(())
    }

    async fn latest_analysis(&self, job_id: &str) -> Result<Option<CrossRegionAnalysis>, StoreError> {
        let guard = self.analyses.read().await;
        Ok(guard
            .get(job_id)
            .and_then(|all| all.iter().max_by_key(|a| a.created_at).cloned()))
    }

    async fn legacy_executions(&self, job_id: &str) -> Result<Vec<LegacyCrossRegionExecution>, StoreError> {
        Ok(self.legacy.read().await.get(job_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_types::FailureReason;
    use serde_json::json;

    fn spec(id: &str) -> JobSpec {
        let mut spec: JobSpec = serde_json::from_value(json!({
            "benchmark": { "name": "store-test", "container": { "image": "img" } },
            "constraints": { "regions": ["US"] },
            "questions": ["q?"]
        }))
        .unwrap();
        spec.id = Some(id.to_string());
        spec
    }

    fn unit(id: &str, job_id: &str) -> ExecutionUnit {
        ExecutionUnit {
            id: id.into(),
            job_id: job_id.into(),
            region: "US".into(),
            model_id: "m".into(),
            question_id: "q0".into(),
            question_index: 0,
            question: "q?".into(),
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

    #[tokio::test]
    async fn job_status_only_moves_forward() {
        let store = InMemoryStore::new();
        store.insert_job(spec("job-1")).await.unwrap();
        store.update_job_status("job-1", JobStatus::Running, None).await.unwrap();
        let err = store
            .update_job_status("job-1", JobStatus::Queued, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
        let rec = store
            .update_job_status("job-1", JobStatus::Failed, Some("too few regions".into()))
            .await
            .unwrap();
        assert_eq!(rec.failure_reason.as_deref(), Some("too few regions"));
        assert!(store
            .update_job_status("job-1", JobStatus::Running, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn duplicate_job_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_job(spec("job-1")).await.unwrap();
        assert_eq!(
            store.insert_job(spec("job-1")).await.unwrap_err(),
            StoreError::Duplicate("job-1".into())
        );
    }

    #[tokio::test]
    async fn terminal_unit_cannot_be_reverted() {
        let store = InMemoryStore::new();
        store.insert_units(vec![unit("u1", "job-1")]).await.unwrap();

        let mut u = store.get_unit("u1").await.unwrap().unwrap();
        u.status = UnitStatus::Completed;
        store.update_unit(u.clone()).await.unwrap();

        u.status = UnitStatus::Running;
        assert!(matches!(
            store.update_unit(u).await,
            Err(StoreError::IllegalTransition { .. })
        ));
    }

    #[tokio::test]
    async fn begin_retry_enforces_budget() {
        let store = InMemoryStore::new();
        store.insert_units(vec![unit("u1", "job-1")]).await.unwrap();

        assert!(matches!(
            store.begin_retry("u1", 2).await,
            Err(StoreError::NotRetryable { status: UnitStatus::Pending, .. })
        ));

        for attempt in 1..=2 {
            let mut u = store.get_unit("u1").await.unwrap().unwrap();
            u.status = UnitStatus::Failed;
            u.failure = Some(FailureReason::new("timeout", "inference", "slow"));
            store.update_unit(u).await.unwrap();
            let retried = store.begin_retry("u1", 2).await.unwrap();
            assert_eq!(retried.retry_count, attempt);
            assert_eq!(retried.status, UnitStatus::Running);
            assert!(retried.failure.is_none());
        }

        let mut u = store.get_unit("u1").await.unwrap().unwrap();
        u.status = UnitStatus::Failed;
        store.update_unit(u).await.unwrap();
        assert!(matches!(
            store.begin_retry("u1", 2).await,
            Err(StoreError::RetryLimitExceeded { retry_count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn units_list_in_plan_order() {
        let store = InMemoryStore::new();
        store
            .insert_units(vec![unit("b", "job-1"), unit("a", "job-1"), unit("c", "job-2")])
            .await
            .unwrap();
        let ids: Vec<_> = store
            .list_units("job-1")
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
