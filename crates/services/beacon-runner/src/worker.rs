//! Job workers: execute a job, then analyse and summarise it.

use beacon_analysis::{AnalysisError, DiffAnalysisEngine, FallbackChain, SummaryContext};
use beacon_runtime::{merge_units, CrossRegionExecutor, ExecutionStore, ExecutorError, StoreError};
use beacon_types::CrossRegionAnalysis;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::queue::JobQueue;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("job {0} not found")]
    JobNotFound(String),
}

pub struct JobWorker {
    executor: CrossRegionExecutor,
    engine: DiffAnalysisEngine,
    summaries: FallbackChain,
}

impl JobWorker {
    pub fn new(executor: CrossRegionExecutor, summaries: FallbackChain) -> Self {
        Self {
            executor,
            engine: DiffAnalysisEngine::new(),
            summaries,
        }
    }

    pub fn executor(&self) -> &CrossRegionExecutor {
        &self.executor
    }

    fn store(&self) -> &Arc<dyn ExecutionStore> {
        self.executor.store()
    }

    /// Runs the job to a terminal status and records an analysis when enough
    /// regions produced output.
    pub async fn process(
        &self,
        job_id: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<Option<CrossRegionAnalysis>, WorkerError> {
        let outcome = self.executor.execute_job(job_id, cancel).await?;
        tracing::info!(
            "Job {} finished as {} ({}/{} units completed)",
            job_id,
            outcome.status,
            outcome.completed_units,
            outcome.total_units
        );
        self.analyze_job(job_id).await
    }

    /// Analyses every unit currently recorded for the job, legacy rows included.
    /// Returns `None` when too few regions have output.
    pub async fn analyze_job(&self, job_id: &str) -> Result<Option<CrossRegionAnalysis>, WorkerError> {
        let record = self
            .store()
            .get_job(job_id)
            .await?
            .ok_or_else(|| WorkerError::JobNotFound(job_id.to_string()))?;
        let canonical = self.store().list_units(job_id).await?;
        let legacy = self.store().legacy_executions(job_id).await?;
        let units = merge_units(canonical, &legacy);

        let report = match self
            .engine
            .analyze(&units, record.spec.constraints.min_regions)
        {
            Ok(report) => report,
            Err(AnalysisError::InsufficientRegions { required, actual }) => {
                tracing::warn!(
                    "Skipping analysis for job {}: {} of {} required regions have output",
                    job_id,
                    actual,
                    required
                );
                return Ok(None);
            }
        };

        let ctx = SummaryContext {
            job_id,
            benchmark_name: &record.spec.benchmark.name,
            benchmark_description: &record.spec.benchmark.description,
            report: &report,
        };
        let rendered = self.summaries.render(&ctx).await;
        let analysis = report.into_record(job_id, rendered);
        self.store().save_analysis(analysis.clone()).await?;
        tracing::info!(
            "Stored analysis {} for job {} (summary from {})",
            analysis.id,
            job_id,
            analysis.summary_source
        );
        Ok(Some(analysis))
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Starts `count` workers pulling from `queue` until `shutdown` turns `true`.
/// Shutdown also cancels the job a worker is running.
pub fn spawn_workers(
    count: usize,
    queue: Arc<dyn JobQueue>,
    worker: Arc<JobWorker>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|n| {
            let queue = queue.clone();
            let worker = worker.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                tracing::debug!("Job worker {} started", n);
                loop {
                    let job_id = tokio::select! {
                        biased;
                        _ = shutdown_requested(&mut shutdown) => break,
                        next = queue.dequeue() => match next {
                            Some(id) => id,
                            None => break,
                        },
                    };
                    if let Err(e) = worker.process(&job_id, shutdown.clone()).await {
                        tracing::error!("Worker {} failed to process job {}: {}", n, job_id, e);
                    }
                }
                tracing::debug!("Job worker {} stopped", n);
            })
        })
        .collect()
}
