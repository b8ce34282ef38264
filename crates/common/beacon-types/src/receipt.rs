use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const RECEIPT_SCHEMA_VERSION: &str = "v0.1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDetails {
    pub unit_id: String,
    pub provider_id: String,
    pub region: String,
    pub model_id: String,
    pub question_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptOutput {
    pub data: Value,
    /// Hex SHA-256 of the canonical form of `data`.
    pub hash: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub benchmark_hash: String,
    #[serde(default)]
    pub provider_info: Map<String, Value>,
    #[serde(default)]
    pub execution_env: Map<String, Value>,
}

/// Proof artifact for one inference call, signed by the runner key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub schema_version: String,
    pub id: String,
    pub job_id: String,
    pub execution_details: ExecutionDetails,
    pub output: ReceiptOutput,
    pub provenance: Provenance,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub public_key: String,
}
