//! Operator-initiated retry of a single failed unit.

use beacon_types::ExecutionUnit;
use thiserror::Error;
use tokio::sync::watch;

use crate::executor::{CrossRegionExecutor, ExecutorError, JobOutcome};
use crate::metrics;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("no execution matches {0}")]
    NotFound(String),

    #[error("execution {id} is {status} and cannot be retried")]
    NotRetryable { id: String, status: String },

    #[error("job {job_id} is still {status}; retry once it has finished")]
    JobInProgress { job_id: String, status: String },

    #[error("retry limit reached ({retry_count}/{max_retries})")]
    RetryLimitExceeded { retry_count: u32, max_retries: u32 },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RetryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => RetryError::NotFound(what),
            StoreError::NotRetryable { id, status } => RetryError::NotRetryable {
                id,
                status: status.to_string(),
            },
            StoreError::RetryLimitExceeded { retry_count, max_retries, .. } => {
                RetryError::RetryLimitExceeded { retry_count, max_retries }
            }
            other => RetryError::Store(other),
        }
    }
}

/// Selects the unit an operator wants to retry.
#[derive(Debug, Clone, Default)]
pub struct RetryTarget {
    /// Unit id, or the job id when combined with `region`.
    pub execution_id: String,
    pub region: Option<String>,
    pub question_index: usize,
    pub model_id: Option<String>,
}

impl CrossRegionExecutor {
    async fn resolve_unit(&self, target: &RetryTarget) -> Result<ExecutionUnit, RetryError> {
        if let Some(unit) = self.store.get_unit(&target.execution_id).await? {
            return Ok(unit);
        }

        let candidates: Vec<ExecutionUnit> = self
            .store
            .list_units(&target.execution_id)
            .await?
            .into_iter()
            .filter(|u| target.region.as_deref().map_or(true, |r| u.region == r))
            .filter(|u| u.question_index == target.question_index)
            .filter(|u| target.model_id.as_deref().map_or(true, |m| u.model_id == m))
            .collect();

        // several models may share the question; prefer one that can actually run
        candidates
            .iter()
            .find(|u| u.is_retryable())
            .or_else(|| candidates.first())
            .cloned()
            .ok_or_else(|| {
                RetryError::NotFound(format!(
                    "{} (region {}, question {})",
                    target.execution_id,
                    target.region.as_deref().unwrap_or("*"),
                    target.question_index
                ))
            })
    }

    /// Validates the retry budget and flips the unit back to running.
    ///
    /// Only units of a job that has reached a terminal status can be retried,
    /// so re-aggregation never runs while siblings are still in flight.
    /// The returned unit has its incremented `retry_count`; hand it to
    /// [`CrossRegionExecutor::complete_retry`] to actually run it.
    pub async fn begin_retry(&self, target: &RetryTarget) -> Result<ExecutionUnit, RetryError> {
        let unit = self.resolve_unit(target).await?;
        let job = self
            .store
            .get_job(&unit.job_id)
            .await?
            .ok_or_else(|| RetryError::NotFound(format!("job {}", unit.job_id)))?;
        if !job.status.is_terminal() {
            return Err(RetryError::JobInProgress {
                job_id: job.id,
                status: job.status.to_string(),
            });
        }
        let previous = unit.status;
        let unit = self.store.begin_retry(&unit.id, self.config.max_retries).await?;
        metrics::record_unit_retry("explicit");
        tracing::info!(
            "Retry requested for unit {} of job {} ({} / {} / {}): {} -> running, attempt {}/{}",
            unit.id,
            unit.job_id,
            unit.region,
            unit.model_id,
            unit.question_id,
            previous,
            unit.retry_count,
            self.config.max_retries
        );
        Ok(unit)
    }

    /// Runs a unit returned by [`begin_retry`](Self::begin_retry) once, then
    /// re-aggregates its job.
    pub async fn complete_retry(&self, unit: ExecutionUnit) -> Result<JobOutcome, ExecutorError> {
        let record = self
            .store
            .get_job(&unit.job_id)
            .await?
            .ok_or_else(|| ExecutorError::JobNotFound(unit.job_id.clone()))?;
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let finished = self.run_unit(unit, &record.spec, cancel_rx, false).await;
        tracing::info!(
            "Retry of unit {} finished as {}",
            finished.id,
            finished.status
        );
        self.finalize_job(&record.id, &record.spec.constraints, false).await
    }

    /// Convenience for callers that want to wait for the retried unit.
    pub async fn retry_question(&self, target: &RetryTarget) -> Result<JobOutcome, RetryError> {
        let unit = self.begin_retry(target).await?;
        self.complete_retry(unit).await.map_err(|e| match e {
            ExecutorError::Store(s) => RetryError::Store(s),
            ExecutorError::JobNotFound(id) => RetryError::NotFound(id),
        })
    }
}
