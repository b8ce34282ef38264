use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use beacon_runtime::RetryTarget;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

/// Reads `question_index` leniently: absent, negative or unparsable means 0.
fn question_index(body: &Value) -> usize {
    match body.get("question_index") {
        Some(Value::Number(n)) => n.as_u64().map(|i| i as usize).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn retry_target(execution_id: String, body: &Value) -> RetryTarget {
    let text = |key: &str| {
        body.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    RetryTarget {
        execution_id,
        region: text("region"),
        question_index: question_index(body),
        model_id: text("model_id"),
    }
}

/// `POST /api/v1/executions/:id/retry-question`
///
/// Resets the unit synchronously so the response carries the new retry count;
/// the inference call and re-analysis run in the background.
pub async fn retry_question(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    let target = retry_target(execution_id, &body);
    let unit = state.worker.executor().begin_retry(&target).await?;

    let response = json!({
        "execution_id": unit.id,
        "job_id": unit.job_id,
        "region": unit.region,
        "model_id": unit.model_id,
        "question_index": unit.question_index,
        "status": "retrying",
        "retry_count": unit.retry_count,
        "updated_at": chrono::Utc::now(),
    });

    let worker = state.worker.clone();
    tokio::spawn(async move {
        let job_id = unit.job_id.clone();
        match worker.executor().complete_retry(unit).await {
            Ok(outcome) => {
                tracing::info!("Job {} re-aggregated after retry: {}", job_id, outcome.status);
                if let Err(e) = worker.analyze_job(&job_id).await {
                    tracing::error!("Re-analysis of job {} failed: {}", job_id, e);
                }
            }
            Err(e) => tracing::error!("Retry for job {} failed: {}", job_id, e),
        }
    });

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_index_defaults_to_zero() {
        assert_eq!(question_index(&json!({})), 0);
        assert_eq!(question_index(&json!({ "question_index": -3 })), 0);
        assert_eq!(question_index(&json!({ "question_index": "abc" })), 0);
        assert_eq!(question_index(&json!({ "question_index": null })), 0);
        assert_eq!(question_index(&Value::Null), 0);
        assert_eq!(question_index(&json!({ "question_index": 2 })), 2);
        assert_eq!(question_index(&json!({ "question_index": "1" })), 1);
    }

    #[test]
    fn blank_region_is_ignored() {
        let t = retry_target("job-1".into(), &json!({ "region": "  ", "question_index": 1 }));
        assert_eq!(t.region, None);
        assert_eq!(t.question_index, 1);
    }
}
