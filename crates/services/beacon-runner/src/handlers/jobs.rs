use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use beacon_types::{ExecutionUnit, JobSpec, JobStatus, ValidationError};
use beacon_runtime::merge_units;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::metrics;
use crate::queue::QueueError;
use crate::state::AppState;

fn rejected(err: ApiError) -> ApiError {
    metrics::record_job_rejected(err.code());
    err
}

/// `POST /api/v1/jobs`: verify, validate, persist, enqueue.
///
/// The signature is checked against the body exactly as received; defaults
/// are only applied afterwards.
pub async fn submit_job(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let raw: Value = serde_json::from_slice(&body).map_err(|e| {
        rejected(ApiError::BadRequest {
            code: "invalid_json".to_string(),
            message: format!("request body is not valid JSON: {}", e),
        })
    })?;

    let verified = state
        .authenticator
        .verify(&raw)
        .map_err(|e| rejected(e.into()))?;

    let mut spec: JobSpec = serde_json::from_value(raw)
        .map_err(|e| rejected(ValidationError::Malformed(e.to_string()).into()))?;
    spec.validate().map_err(|e| rejected(e.into()))?;

    let record = state.store.insert_job(spec).await.map_err(|e| rejected(e.into()))?;
    if let Err(e) = state.queue.enqueue(record.id.clone()).await {
        let reason = format!("job queue unavailable: {}", e);
        if let Err(store_err) = state
            .store
            .update_job_status(&record.id, JobStatus::Failed, Some(reason.clone()))
            .await
        {
            tracing::error!("Failed to mark job {} failed: {}", record.id, store_err);
        }
        let code = match e {
            QueueError::Full => "queue_full",
            QueueError::Closed => "queue_closed",
        };
        metrics::record_job_rejected(code);
        return Err(ApiError::Unavailable(reason));
    }

    metrics::record_job_submitted();
    tracing::info!(
        "Accepted job {} from key {}{} ({} regions, {} questions)",
        record.id,
        verified.public_key,
        if verified.bypassed { " (auth bypassed)" } else { "" },
        record.spec.constraints.regions.len(),
        record.spec.questions.len()
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "id": record.id, "status": "enqueued" })),
    ))
}

async fn require_job(state: &AppState, job_id: &str) -> Result<beacon_types::JobRecord, ApiError> {
    state
        .store
        .get_job(job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            code: "job_not_found",
            message: format!("job {} not found", job_id),
        })
}

/// `GET /api/v1/jobs/:id`
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = require_job(&state, &job_id).await?;
    let executions = state.store.list_units(&job_id).await?;
    Ok(Json(json!({
        "job": record.spec,
        "status": record.status,
        "failure_reason": record.failure_reason,
        "created_at": record.created_at,
        "updated_at": record.updated_at,
        "executions": executions,
    })))
}

/// `GET /api/v1/jobs/:id/executions`
pub async fn list_executions(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Vec<ExecutionUnit>>, ApiError> {
    require_job(&state, &job_id).await?;
    Ok(Json(state.store.list_units(&job_id).await?))
}

/// `GET /api/v1/jobs/:id/executions/all`: canonical units plus legacy rows
/// that have no canonical counterpart.
pub async fn list_all_executions(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let canonical = state.store.list_units(&job_id).await?;
    let legacy = state.store.legacy_executions(&job_id).await?;
    if canonical.is_empty() && legacy.is_empty() {
        require_job(&state, &job_id).await?;
    }
    let merged = merge_units(canonical, &legacy);
    Ok(Json(json!({
        "job_id": job_id,
        "total": merged.len(),
        "executions": merged,
    })))
}
