use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use lazy_static::lazy_static;
use prometheus::{opts, register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, TextEncoder};

lazy_static! {
    pub static ref JOBS_SUBMITTED_TOTAL: IntCounter =
        register_int_counter!(opts!("beacon_jobs_submitted_total", "Jobs accepted and enqueued")).unwrap();

    pub static ref JOBS_REJECTED_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("beacon_jobs_rejected_total", "Job submissions rejected, by error code"),
            &["code"]
        ).unwrap();

    pub static ref TRUSTED_KEY_RELOADS_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("beacon_trusted_key_reloads_total", "Trusted key allowlist reloads by outcome"),
            &["outcome"]
        ).unwrap();
}

pub fn record_job_submitted() {
    JOBS_SUBMITTED_TOTAL.inc();
}

pub fn record_job_rejected(code: &str) {
    JOBS_REJECTED_TOTAL.with_label_values(&[code]).inc();
}

pub fn record_trust_reload(ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    TRUSTED_KEY_RELOADS_TOTAL.with_label_values(&[outcome]).inc();
}

/// `GET /metrics`: every registered collector in the Prometheus text format.
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode Prometheus metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "# failed to encode metrics\n").into_response();
    }
    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response()
}
