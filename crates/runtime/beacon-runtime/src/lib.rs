//! Execution runtime for cross-region benchmark jobs.

pub mod config;
pub mod executor;
pub mod inference;
pub mod legacy;
pub mod metrics;
pub mod planner;
pub mod retry;
pub mod store;

pub use config::ExecutorConfig;
pub use executor::{decide_job_status, CrossRegionExecutor, ExecutorError, JobOutcome};
pub use inference::{
    HttpInferenceClient, InferenceClient, InferenceError, InferenceOutput, InferenceRequest,
};
pub use legacy::{merge_units, LegacyCrossRegionExecution, LegacyRegionResult};
pub use planner::{plan, PlannedUnit};
pub use retry::{RetryError, RetryTarget};
pub use store::{ExecutionStore, InMemoryStore, StoreError};
