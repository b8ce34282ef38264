use anyhow::Context;
use beacon_analysis::summary::{FallbackChain, LlmSummaryStrategy, SummaryStrategy};
use beacon_identity::{KeyPair, NonceStore, RequestAuthenticator, TrustedKeyRegistry};
use beacon_runtime::{CrossRegionExecutor, ExecutionStore, InferenceClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::RunnerConfig;
use crate::metrics;
use crate::queue::{ChannelQueue, JobQueue};
use crate::worker::JobWorker;

/// Shared handles given to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ExecutionStore>,
    pub authenticator: Arc<RequestAuthenticator>,
    pub queue: Arc<dyn JobQueue>,
    pub worker: Arc<JobWorker>,
    pub nonces: Arc<NonceStore>,
}

impl AppState {
    /// Wires the service from its collaborators. `trust` is the loaded allowlist.
    pub fn build(
        config: &RunnerConfig,
        store: Arc<dyn ExecutionStore>,
        inference: Arc<dyn InferenceClient>,
        trust: Arc<TrustedKeyRegistry>,
        signer: KeyPair,
    ) -> anyhow::Result<Self> {
        let nonces = Arc::new(NonceStore::new(config.nonce_retention()));
        let authenticator = Arc::new(RequestAuthenticator::new(
            config.auth_config(),
            trust,
            nonces.clone(),
        ));

        let executor = CrossRegionExecutor::new(
            store.clone(),
            inference,
            Arc::new(signer),
            config.executor_config(),
        );
        let llm = LlmSummaryStrategy::new(config.llm_config())
            .context("Failed to build LLM summary client")?;
        let primary: Box<dyn SummaryStrategy> = Box::new(llm);
        let worker = Arc::new(JobWorker::new(executor, FallbackChain::new(Some(primary))));

        Ok(Self {
            store,
            authenticator,
            queue: Arc::new(ChannelQueue::new(config.queue_capacity)),
            worker,
            nonces,
        })
    }

    /// Background upkeep: trusted-key reloads and nonce expiry, both stopped by `shutdown`.
    pub fn spawn_maintenance(
        &self,
        config: &RunnerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let reloader = self.authenticator.trust().clone().spawn_reloader(
            config.trusted_keys_reload_interval(),
            shutdown.clone(),
            |result| metrics::record_trust_reload(result.is_ok()),
        );

        let nonces = self.nonces.clone();
        let mut shutdown = shutdown;
        let period = (config.nonce_retention() / 4).max(Duration::from_secs(1));
        let purger = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = nonces.purge_expired(chrono::Utc::now());
                        if purged > 0 {
                            tracing::debug!("Purged {} expired nonces", purged);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        vec![reloader, purger]
    }
}
