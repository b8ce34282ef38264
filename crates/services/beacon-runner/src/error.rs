use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use beacon_identity::AuthError;
use beacon_runtime::{RetryError, StoreError};
use beacon_types::ValidationError;
use serde_json::json;

/// Error surfaced to API callers as `{"error": ..., "error_code": ...}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    NotFound { code: &'static str, message: String },
    Conflict { code: &'static str, message: String },
    TooManyRequests(String),
    Unavailable(String),
    /// Logged in full; callers only see a generic message.
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &str {
        match self {
            ApiError::BadRequest { code, .. } => code.as_str(),
            ApiError::NotFound { code, .. } | ApiError::Conflict { code, .. } => *code,
            ApiError::TooManyRequests(_) => "retry_limit_exceeded",
            ApiError::Unavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code().to_string();
        let (status, message) = match self {
            ApiError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound { message, .. } => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict { message, .. } => (StatusCode::CONFLICT, message),
            ApiError::TooManyRequests(message) => (StatusCode::TOO_MANY_REQUESTS, message),
            ApiError::Unavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
            ApiError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message, "error_code": code }))).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::BadRequest {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound {
                code: "not_found",
                message: format!("{} not found", what),
            },
            StoreError::Duplicate(id) => ApiError::Conflict {
                code: "duplicate_job",
                message: format!("job {} already exists", id),
            },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<RetryError> for ApiError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::NotFound(_) => ApiError::NotFound {
                code: "execution_not_found",
                message: err.to_string(),
            },
            RetryError::NotRetryable { .. } => ApiError::Conflict {
                code: "not_retryable",
                message: err.to_string(),
            },
            RetryError::JobInProgress { .. } => ApiError::Conflict {
                code: "job_in_progress",
                message: err.to_string(),
            },
            RetryError::RetryLimitExceeded { .. } => ApiError::TooManyRequests(err.to_string()),
            RetryError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}
