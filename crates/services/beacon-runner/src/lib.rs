//! Beacon runner service: job intake, execution workers and the read API.

pub mod app;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod queue;
pub mod state;
pub mod worker;

pub use app::create_app;
pub use config::RunnerConfig;
pub use error::ApiError;
pub use queue::{ChannelQueue, JobQueue, QueueError};
pub use state::AppState;
pub use worker::{spawn_workers, JobWorker, WorkerError};
