pub mod sign;

use beacon_crypto::{canonical_json, sha256_hex};
use beacon_types::receipt::{ExecutionDetails, Provenance, Receipt, ReceiptOutput, RECEIPT_SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub use sign::{sign_receipt, verify_receipt, SignError};

/// Inputs describing one finished inference call.
#[derive(Debug, Clone)]
pub struct ReceiptDraft {
    pub job_id: String,
    pub unit_id: String,
    pub provider_id: String,
    pub region: String,
    pub model_id: String,
    pub question_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub output: Value,
    pub benchmark_hash: String,
    pub execution_env: Map<String, Value>,
}

/// Builds an unsigned receipt, hashing the output canonically.
pub fn build_receipt(draft: ReceiptDraft) -> Result<Receipt, SignError> {
    let hash = sha256_hex(&canonical_json(&draft.output, &[])?);
    let duration_ms = (draft.completed_at - draft.started_at).num_milliseconds().max(0) as u64;

    let mut provider_info = Map::new();
    provider_info.insert("provider_id".into(), Value::String(draft.provider_id.clone()));
    provider_info.insert("region".into(), Value::String(draft.region.clone()));

    Ok(Receipt {
        schema_version: RECEIPT_SCHEMA_VERSION.to_string(),
        id: uuid::Uuid::new_v4().to_string(),
        job_id: draft.job_id,
        execution_details: ExecutionDetails {
            unit_id: draft.unit_id,
            provider_id: draft.provider_id,
            region: draft.region,
            model_id: draft.model_id,
            question_id: draft.question_id,
            started_at: draft.started_at,
            completed_at: draft.completed_at,
            duration_ms,
            status: "completed".to_string(),
        },
        output: ReceiptOutput {
            data: draft.output,
            hash,
            metadata: Map::new(),
        },
        provenance: Provenance {
            benchmark_hash: draft.benchmark_hash,
            provider_info,
            execution_env: draft.execution_env,
        },
        signature: String::new(),
        public_key: String::new(),
    })
}
