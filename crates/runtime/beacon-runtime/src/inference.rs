//! Inference provider seam.
//!
//! The executor only sees [`InferenceClient`]; production wiring uses
//! [`HttpInferenceClient`], which posts to one HTTP endpoint per region.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("no inference endpoint configured for region {0}")]
    UnknownRegion(String),

    #[error("inference transport error: {0}")]
    Transport(String),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider reported failure: {0}")]
    Provider(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Everything a provider needs to answer one unit.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest {
    pub job_id: String,
    pub unit_id: String,
    pub region: String,
    pub model_id: String,
    pub prompt: String,
    /// Per-unit copy of the job metadata with unit-specific keys added.
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutput {
    pub provider_id: String,
    pub data: Value,
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn infer(&self, request: InferenceRequest) -> Result<InferenceOutput, InferenceError>;
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    provider_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Posts `{model, prompt, ...}` to `<endpoint>/inference` for the unit's region.
pub struct HttpInferenceClient {
    client: Client,
    endpoints: HashMap<String, String>,
}

impl HttpInferenceClient {
    pub fn new(endpoints: HashMap<String, String>, timeout: Duration) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Transport(e.to_string()))?;
        Ok(Self { client, endpoints })
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn infer(&self, request: InferenceRequest) -> Result<InferenceOutput, InferenceError> {
        let base = self
            .endpoints
            .get(&request.region)
            .ok_or_else(|| InferenceError::UnknownRegion(request.region.clone()))?;
        let url = format!("{}/inference", base.trim_end_matches('/'));

        tracing::debug!(unit_id = %request.unit_id, %url, model = %request.model_id, "Dispatching inference");

        let body = json!({
            "model": request.model_id,
            "prompt": request.prompt,
            "region": request.region,
            "job_id": request.job_id,
            "metadata": request.metadata,
        });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Status { status: status.as_u16(), body });
        }

        let parsed: ProviderResponse = resp
            .json()
            .await
            .map_err(|e| InferenceError::Malformed(e.to_string()))?;
        if !parsed.success {
            return Err(InferenceError::Provider(
                parsed.error.unwrap_or_else(|| "unspecified provider error".to_string()),
            ));
        }
        let text = parsed
            .response
            .ok_or_else(|| InferenceError::Malformed("missing response field".to_string()))?;
        let provider_id = parsed
            .provider_id
            .unwrap_or_else(|| format!("http-{}", request.region.to_lowercase()));

        Ok(InferenceOutput {
            provider_id,
            data: json!({
                "response": text,
                "model_id": request.model_id,
                "region": request.region,
            }),
        })
    }
}
