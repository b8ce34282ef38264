use serde::Deserialize;
use std::time::Duration;

/// Tuning knobs for the cross-region executor.
#[derive(Debug, Deserialize, Clone)]
pub struct ExecutorConfig {
    /// Budget for one inference call. Queue wait before a unit starts does not count.
    pub unit_timeout_secs: u64,

    /// Maximum number of units in flight for one job, regardless of matrix size.
    pub max_concurrency: usize,

    /// Maximum number of retries per unit, shared by inline and operator retries.
    pub max_retries: u32,

    /// How much of `max_retries` the executor may spend on its own before
    /// leaving the unit failed for an explicit retry.
    pub inline_retries: u32,

    /// Base delay between inline retries; multiplied by the attempt number.
    pub retry_backoff_ms: u64,
}

impl ExecutorConfig {
    pub fn unit_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_timeout_secs.max(1))
    }

    pub fn inline_retry_limit(&self) -> u32 {
        self.inline_retries.min(self.max_retries)
    }

    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            unit_timeout_secs: 300,
            max_concurrency: 10,
            max_retries: 3,
            inline_retries: 1,
            retry_backoff_ms: 500,
        }
    }
}
