use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Map, Value};

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/v1/jobs/:id/bias-analysis`: the newest analysis of the job.
pub async fn get_bias_analysis(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if state.store.get_job(&job_id).await?.is_none() {
        return Err(ApiError::NotFound {
            code: "job_not_found",
            message: format!("job {} not found", job_id),
        });
    }
    let analysis = state
        .store
        .latest_analysis(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            code: "analysis_not_found",
            message: format!("no bias analysis recorded for job {}", job_id),
        })?;

    let region_scores: Map<String, Value> = analysis
        .region_scores
        .iter()
        .map(|(region, s)| {
            (
                region.clone(),
                json!({
                    "bias_score": s.bias_score,
                    "censorship_detected": s.censorship_detected,
                    "political_sensitivity": s.political_sensitivity,
                    "factual_accuracy": s.factual_accuracy,
                }),
            )
        })
        .collect();

    Ok(Json(json!({
        "job_id": job_id,
        "cross_region_execution_id": analysis.id,
        "analysis": {
            "bias_variance": analysis.bias_variance,
            "censorship_rate": analysis.censorship_rate,
            "factual_consistency": analysis.factual_consistency,
            "narrative_divergence": analysis.narrative_divergence,
            "summary": analysis.summary,
            "recommendation": analysis.recommendation,
            "summary_source": analysis.summary_source,
            "key_differences": analysis.key_differences,
            "risk_assessment": analysis.risk_assessment,
        },
        "region_scores": region_scores,
        "created_at": analysis.created_at,
    })))
}
