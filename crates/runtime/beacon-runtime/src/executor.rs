//! Cross-region job executor.
//!
//! One call to [`CrossRegionExecutor::execute_job`] coordinates a whole job:
//! it plans the matrix, persists every unit as pending, then drives the units
//! through a semaphore-bounded pool. Each unit is isolated: its errors, timeouts
//! and panics end up in its own record and never abort siblings.
#![forbid(unsafe_code)]

use beacon_identity::KeyPair;
use beacon_receipts::{build_receipt, sign_receipt, ReceiptDraft};
use beacon_types::{
    Constraints, ExecutionUnit, FailureReason, JobSpec, JobStatus, Receipt, RegionResult,
    RegionStatus, UnitStatus,
};
use chrono::Utc;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::config::ExecutorConfig;
use crate::inference::{InferenceClient, InferenceOutput, InferenceRequest};
use crate::metrics;
use crate::planner::{self, PlannedUnit};
use crate::store::{ExecutionStore, StoreError};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("job {0} not found")]
    JobNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Final state of a job after execution or re-aggregation.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: String,
    pub status: JobStatus,
    pub failure_reason: Option<String>,
    pub total_units: usize,
    pub completed_units: usize,
    pub region_results: Vec<RegionResult>,
}

impl JobOutcome {
    pub fn success_rate(&self) -> f64 {
        if self.total_units == 0 {
            0.0
        } else {
            self.completed_units as f64 / self.total_units as f64
        }
    }
}

pub(crate) enum Attempt {
    Success(InferenceOutput),
    Failed(FailureReason),
    Cancelled,
}

/// Resolves once the watch value becomes `true`. A dropped sender never cancels.
pub(crate) async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Clone)]
pub struct CrossRegionExecutor {
    pub(crate) store: Arc<dyn ExecutionStore>,
    pub(crate) inference: Arc<dyn InferenceClient>,
    pub(crate) signer: Arc<KeyPair>,
    pub(crate) config: ExecutorConfig,
}

impl CrossRegionExecutor {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        inference: Arc<dyn InferenceClient>,
        signer: Arc<KeyPair>,
        config: ExecutorConfig,
    ) -> Self {
        Self { store, inference, signer, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    /// Smaller of the configured unit budget and the job's provider timeout.
    pub fn effective_unit_timeout(&self, constraints: &Constraints) -> Duration {
        let configured = self.config.unit_timeout();
        if constraints.provider_timeout == 0 {
            configured
        } else {
            configured.min(Duration::from_secs(constraints.provider_timeout))
        }
    }

    /// Runs every unit of `job_id` and records the aggregate status.
    ///
    /// Setting `cancel` to `true` ends queued and in-flight units as `cancelled`;
    /// the job is still aggregated afterwards.
    pub async fn execute_job(
        &self,
        job_id: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<JobOutcome, ExecutorError> {
        let record = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| ExecutorError::JobNotFound(job_id.to_string()))?;
        self.store
            .update_job_status(job_id, JobStatus::Running, None)
            .await?;

        let spec = Arc::new(record.spec);
        let planned = planner::plan(&spec);
        let units: Vec<ExecutionUnit> = planned.iter().map(|p| new_unit(job_id, p)).collect();
        self.store.insert_units(units.clone()).await?;

        tracing::info!(
            "Executing job {}: {} units across {} regions (max_concurrency={})",
            job_id,
            units.len(),
            spec.constraints.regions.len(),
            self.config.max_concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for unit in units {
            let executor = self.clone();
            let spec = Arc::clone(&spec);
            let semaphore = Arc::clone(&semaphore);
            let mut cancel = cancel.clone();
            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = wait_cancelled(&mut cancel) => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                match permit {
                    Some(_permit) => executor.run_unit(unit, &spec, cancel, true).await,
                    None => executor.finish_cancelled(unit, "queue").await,
                }
            });
        }

        let mut finished = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(unit) => {
                    finished.insert(unit.id.clone(), unit);
                }
                Err(e) => tracing::error!("Unit task for job {} ended abnormally: {}", job_id, e),
            }
        }
        let cancelled = *cancel.borrow();
        self.sweep_unfinished(job_id, cancelled, &finished).await?;

        let outcome = self.finalize_job(job_id, &spec.constraints, cancelled).await?;
        metrics::record_job_finished(&outcome.status.to_string());
        Ok(outcome)
    }

    /// Drives one unit to a terminal status, retrying inline when allowed.
    pub(crate) async fn run_unit(
        &self,
        mut unit: ExecutionUnit,
        spec: &JobSpec,
        mut cancel: watch::Receiver<bool>,
        inline_retries: bool,
    ) -> ExecutionUnit {
        loop {
            unit.status = UnitStatus::Running;
            unit.started_at = Some(Utc::now());
            unit.completed_at = None;
            unit.failure = None;
            self.persist(&unit).await;

            match self.attempt(&unit, spec, &mut cancel).await {
                Attempt::Success(output) => return self.finish_completed(unit, spec, output).await,
                Attempt::Cancelled => return self.finish_cancelled(unit, "inference").await,
                Attempt::Failed(reason) => {
                    let can_retry = inline_retries
                        && unit.retry_count < self.config.inline_retry_limit()
                        && reason.code != "panic"
                        && !*cancel.borrow();
                    if !can_retry {
                        return self.finish_failed(unit, reason).await;
                    }
                    unit.retry_count += 1;
                    metrics::record_unit_retry("inline");
                    tracing::warn!(
                        "Unit {} ({} / {} / {}) failed with {}; retry {}/{}",
                        unit.id,
                        unit.region,
                        unit.model_id,
                        unit.question_id,
                        reason.code,
                        unit.retry_count,
                        self.config.max_retries
                    );
                    let backoff = self.config.retry_backoff(unit.retry_count);
                    tokio::select! {
                        biased;
                        _ = wait_cancelled(&mut cancel) => {
                            return self.finish_cancelled(unit, "retry_backoff").await;
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    async fn attempt(
        &self,
        unit: &ExecutionUnit,
        spec: &JobSpec,
        cancel: &mut watch::Receiver<bool>,
    ) -> Attempt {
        // each unit mutates its own copy of the job metadata
        let mut metadata: Map<String, Value> = spec.metadata.clone();
        metadata.insert("unit_id".into(), Value::String(unit.id.clone()));
        metadata.insert("region".into(), Value::String(unit.region.clone()));
        metadata.insert("model_id".into(), Value::String(unit.model_id.clone()));
        metadata.insert("question_id".into(), Value::String(unit.question_id.clone()));
        metadata.insert("attempt".into(), Value::from(unit.retry_count + 1));

        let request = InferenceRequest {
            job_id: unit.job_id.clone(),
            unit_id: unit.id.clone(),
            region: unit.region.clone(),
            model_id: unit.model_id.clone(),
            prompt: unit.question.clone(),
            metadata,
        };
        let budget = self.effective_unit_timeout(&spec.constraints);
        let call = AssertUnwindSafe(self.inference.infer(request)).catch_unwind();

        tokio::select! {
            biased;
            _ = wait_cancelled(cancel) => Attempt::Cancelled,
            result = tokio::time::timeout(budget, call) => match result {
                Err(_) => Attempt::Failed(FailureReason::new(
                    "timeout",
                    "inference",
                    format!("inference exceeded {}s", budget.as_secs()),
                )),
                Ok(Err(panic)) => {
                    metrics::record_unit_panic();
                    Attempt::Failed(FailureReason::new("panic", "inference", panic_message(&*panic)))
                }
                Ok(Ok(Err(e))) => Attempt::Failed(FailureReason::new("inference_error", "inference", e.to_string())),
                Ok(Ok(Ok(output))) => Attempt::Success(output),
            },
        }
    }

    async fn finish_completed(
        &self,
        mut unit: ExecutionUnit,
        spec: &JobSpec,
        output: InferenceOutput,
    ) -> ExecutionUnit {
        let started_at = unit.started_at.unwrap_or_else(Utc::now);
        let completed_at = Utc::now().max(started_at);
        match self.sign_unit_receipt(&unit, spec, &output, completed_at) {
            Ok(receipt) => {
                unit.status = UnitStatus::Completed;
                unit.provider_id = Some(output.provider_id);
                unit.output = Some(output.data);
                unit.receipt = Some(receipt);
                unit.completed_at = Some(completed_at);
                self.persist(&unit).await;
                metrics::record_unit_finished("completed", unit.duration_ms().map(|ms| ms as f64 / 1000.0));
                tracing::debug!("Unit {} completed in region {}", unit.id, unit.region);
                unit
            }
            Err(e) => {
                unit.provider_id = Some(output.provider_id);
                self.finish_failed(unit, FailureReason::new("receipt_error", "receipt", e.to_string()))
                    .await
            }
        }
    }

    fn sign_unit_receipt(
        &self,
        unit: &ExecutionUnit,
        spec: &JobSpec,
        output: &InferenceOutput,
        completed_at: chrono::DateTime<Utc>,
    ) -> Result<Receipt, beacon_receipts::SignError> {
        let mut execution_env = Map::new();
        execution_env.insert("runner_version".into(), Value::String(env!("CARGO_PKG_VERSION").to_string()));
        execution_env.insert("attempt".into(), Value::from(unit.retry_count + 1));
        let mut receipt = build_receipt(ReceiptDraft {
            job_id: unit.job_id.clone(),
            unit_id: unit.id.clone(),
            provider_id: output.provider_id.clone(),
            region: unit.region.clone(),
            model_id: unit.model_id.clone(),
            question_id: unit.question_id.clone(),
            started_at: unit.started_at.unwrap_or(completed_at),
            completed_at,
            output: output.data.clone(),
            benchmark_hash: spec.benchmark.input.hash.clone(),
            execution_env,
        })?;
        sign_receipt(&mut receipt, &self.signer)?;
        Ok(receipt)
    }

    pub(crate) async fn finish_failed(&self, mut unit: ExecutionUnit, reason: FailureReason) -> ExecutionUnit {
        tracing::warn!(
            "Unit {} ({} / {} / {}) failed: {} at {}: {}",
            unit.id,
            unit.region,
            unit.model_id,
            unit.question_id,
            reason.code,
            reason.stage,
            reason.message
        );
        unit.status = UnitStatus::Failed;
        unit.completed_at = Some(close_time(&unit));
        unit.failure = Some(reason);
        self.persist(&unit).await;
        metrics::record_unit_finished("failed", unit.duration_ms().map(|ms| ms as f64 / 1000.0));
        unit
    }

    async fn finish_cancelled(&self, mut unit: ExecutionUnit, stage: &str) -> ExecutionUnit {
        unit.status = UnitStatus::Cancelled;
        unit.completed_at = Some(close_time(&unit));
        unit.failure = Some(FailureReason::new("cancelled", stage, "job cancelled"));
        self.persist(&unit).await;
        metrics::record_unit_finished("cancelled", None);
        unit
    }

    async fn persist(&self, unit: &ExecutionUnit) {
        if let Err(e) = self.store.update_unit(unit.clone()).await {
            metrics::record_persist_failure();
            tracing::error!("Failed to persist unit {} as {}: {}", unit.id, unit.status, e);
        }
    }

    /// Brings stored units in line with how their tasks actually ended.
    ///
    /// A terminal unit whose final write was lost is written again and a
    /// second failure aborts the job with the store error. Units with no
    /// finished task (aborted, or never reached) are closed as cancelled or failed.
    async fn sweep_unfinished(
        &self,
        job_id: &str,
        cancelled: bool,
        finished: &HashMap<String, ExecutionUnit>,
    ) -> Result<(), ExecutorError> {
        for unit in self.store.list_units(job_id).await? {
            if unit.status.is_terminal() {
                continue;
            }
            if let Some(done) = finished.get(&unit.id).filter(|u| u.status.is_terminal()) {
                tracing::warn!("Re-persisting unit {} as {}", done.id, done.status);
                self.store.update_unit(done.clone()).await?;
                continue;
            }
            if cancelled {
                self.finish_cancelled(unit, "executor").await;
            } else {
                self.finish_failed(unit, FailureReason::new("panic", "executor", "unit task aborted"))
                    .await;
            }
        }
        Ok(())
    }

    /// Recomputes region results and the job status from persisted units.
    pub async fn finalize_job(
        &self,
        job_id: &str,
        constraints: &Constraints,
        cancelled: bool,
    ) -> Result<JobOutcome, ExecutorError> {
        let units = self.store.list_units(job_id).await?;
        let region_results = RegionResult::aggregate(&units);
        let completed_units = units.iter().filter(|u| u.status == UnitStatus::Completed).count();
        let (status, mut failure_reason) = decide_job_status(&units, &region_results, constraints);
        if cancelled && status == JobStatus::Failed {
            failure_reason = failure_reason.map(|r| format!("job cancelled; {}", r));
        }

        self.store
            .update_job_status(job_id, status, failure_reason.clone())
            .await?;
        match &failure_reason {
            Some(reason) => tracing::warn!("Job {} failed: {}", job_id, reason),
            None => tracing::info!(
                "Job {} completed: {}/{} units across {} regions",
                job_id,
                completed_units,
                units.len(),
                region_results.len()
            ),
        }

        Ok(JobOutcome {
            job_id: job_id.to_string(),
            status,
            failure_reason,
            total_units: units.len(),
            completed_units,
            region_results,
        })
    }
}

/// `completed` iff the success rate and the number of regions with at least one
/// completed unit both meet the job's constraints.
pub fn decide_job_status(
    units: &[ExecutionUnit],
    regions: &[RegionResult],
    constraints: &Constraints,
) -> (JobStatus, Option<String>) {
    let total = units.len();
    let completed = units.iter().filter(|u| u.status == UnitStatus::Completed).count();
    let rate = if total == 0 { 0.0 } else { completed as f64 / total as f64 };
    let ok_regions = regions.iter().filter(|r| r.status == RegionStatus::Completed).count();

    let mut reasons = Vec::new();
    if rate < constraints.min_success_rate {
        reasons.push(format!(
            "success rate {:.2} ({}/{}) below required {:.2}",
            rate, completed, total, constraints.min_success_rate
        ));
    }
    if ok_regions < constraints.min_regions {
        reasons.push(format!(
            "{} of {} required regions completed",
            ok_regions, constraints.min_regions
        ));
    }
    if reasons.is_empty() {
        (JobStatus::Completed, None)
    } else {
        (JobStatus::Failed, Some(reasons.join("; ")))
    }
}

fn new_unit(job_id: &str, planned: &PlannedUnit) -> ExecutionUnit {
    ExecutionUnit::pending(
        job_id,
        &planned.region,
        &planned.model.id,
        planned.question_index,
        &planned.question_id,
        &planned.question,
    )
}

fn close_time(unit: &ExecutionUnit) -> chrono::DateTime<Utc> {
    let now = Utc::now();
    match unit.started_at {
        Some(start) => now.max(start),
        None => now,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("inference panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("inference panicked: {}", s)
    } else {
        "inference panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn constraints(min_regions: usize, min_success_rate: f64) -> Constraints {
        Constraints {
            regions: vec!["US".into(), "EU".into()],
            min_regions,
            min_success_rate,
            timeout: 600,
            provider_timeout: 300,
        }
    }

    fn unit(region: &str, status: UnitStatus) -> ExecutionUnit {
        let mut u = new_unit(
            "job-1",
            &PlannedUnit {
                region: region.into(),
                model: beacon_types::ModelSpec { id: "m".into(), name: "m".into() },
                question_index: 0,
                question_id: "q0".into(),
                question: "q?".into(),
            },
        );
        u.status = status;
        u.started_at = Some(Utc::now());
        u
    }

    #[test]
    fn job_completes_when_both_thresholds_met() {
        let units = vec![
            unit("US", UnitStatus::Completed),
            unit("US", UnitStatus::Completed),
            unit("EU", UnitStatus::Completed),
            unit("EU", UnitStatus::Failed),
        ];
        let regions = RegionResult::aggregate(&units);
        let (status, reason) = decide_job_status(&units, &regions, &constraints(2, 0.67));
        assert_eq!(status, JobStatus::Completed);
        assert!(reason.is_none());
    }

    #[test]
    fn low_success_rate_fails_with_reason() {
        let units = vec![
            unit("US", UnitStatus::Completed),
            unit("EU", UnitStatus::Failed),
            unit("EU", UnitStatus::Cancelled),
        ];
        let regions = RegionResult::aggregate(&units);
        let (status, reason) = decide_job_status(&units, &regions, &constraints(1, 0.67));
        assert_eq!(status, JobStatus::Failed);
        assert!(reason.unwrap().contains("success rate 0.33"));
    }

    #[test]
    fn too_few_regions_fails_even_with_high_rate() {
        let units = vec![
            unit("US", UnitStatus::Completed),
            unit("US", UnitStatus::Completed),
            unit("US", UnitStatus::Completed),
            unit("EU", UnitStatus::Failed),
        ];
        let regions = RegionResult::aggregate(&units);
        let (status, reason) = decide_job_status(&units, &regions, &constraints(2, 0.5));
        assert_eq!(status, JobStatus::Failed);
        assert_eq!(reason.as_deref(), Some("1 of 2 required regions completed"));
    }

    #[tokio::test]
    async fn dropped_cancel_sender_never_cancels() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_millis(50), wait_cancelled(&mut rx)).await;
        assert!(waited.is_err());
    }
}
