use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{analysis, executions, health_handler, jobs};
use crate::metrics::metrics_handler;
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/jobs", post(jobs::submit_job))
        .route("/api/v1/jobs", post(jobs::submit_job))
        .route("/api/v1/jobs/:id", get(jobs::get_job))
        .route("/api/v1/jobs/:id/executions", get(jobs::list_executions))
        .route("/api/v1/jobs/:id/executions/all", get(jobs::list_all_executions))
        .route("/api/v1/jobs/:id/bias-analysis", get(analysis::get_bias_analysis))
        .route(
            "/api/v1/executions/:id/retry-question",
            post(executions::retry_question),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
