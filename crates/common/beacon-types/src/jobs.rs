use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::ValidationError;

/// Model used when a job does not name any.
pub const DEFAULT_MODEL_ID: &str = "llama3.2-1b";

pub const DEFAULT_MIN_SUCCESS_RATE: f64 = 0.67;
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkInput {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scoring {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub description: String,
    pub container: Container,
    #[serde(default)]
    pub input: BenchmarkInput,
    #[serde(default)]
    pub scoring: Scoring,
}

/// Execution constraints. Durations are expressed in whole seconds on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    pub regions: Vec<String>,
    #[serde(default)]
    pub min_regions: usize,
    #[serde(default)]
    pub min_success_rate: f64,
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub provider_timeout: u64,
}

/// Optional wallet-style proof carried alongside the Ed25519 envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletAuth {
    pub address: String,
    pub signature: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    pub name: String,
}

/// The signed unit of work submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub version: String,
    pub benchmark: Benchmark,
    pub constraints: Constraints,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_auth: Option<WalletAuth>,
}

impl JobSpec {
    /// Applies defaults and rejects malformed jobs. Must run after signature
    /// verification, since defaults alter the signed shape.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        if self.version.trim().is_empty() {
            self.version = self
                .benchmark
                .version
                .clone()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "1.0".to_string());
        }
        if self.benchmark.name.trim().is_empty() {
            return Err(ValidationError::MissingBenchmarkName);
        }
        if self.benchmark.container.image.trim().is_empty() {
            return Err(ValidationError::MissingContainerImage);
        }
        if self.benchmark.description.is_empty() {
            self.benchmark.description = format!("Benchmark: {}", self.benchmark.name);
        }
        if self.benchmark.scoring.method.is_empty() {
            self.benchmark.scoring.method = "default".to_string();
        }

        let constraints = &mut self.constraints;
        if constraints.regions.is_empty() {
            return Err(ValidationError::NoRegions);
        }
        let mut seen = HashSet::new();
        for region in &constraints.regions {
            if !seen.insert(region.as_str()) {
                return Err(ValidationError::DuplicateRegion(region.clone()));
            }
        }
        if constraints.min_regions < 1 {
            constraints.min_regions = 1;
        }
        if constraints.min_regions > constraints.regions.len() {
            return Err(ValidationError::MinRegionsExceedsRegions {
                min_regions: constraints.min_regions,
                available: constraints.regions.len(),
            });
        }
        if constraints.min_success_rate == 0.0 {
            constraints.min_success_rate = DEFAULT_MIN_SUCCESS_RATE;
        }
        if !(constraints.min_success_rate > 0.0 && constraints.min_success_rate <= 1.0) {
            return Err(ValidationError::InvalidSuccessRate(
                constraints.min_success_rate,
            ));
        }
        if constraints.timeout == 0 {
            constraints.timeout = DEFAULT_TIMEOUT_SECS;
        }
        if constraints.provider_timeout == 0 {
            constraints.provider_timeout = DEFAULT_PROVIDER_TIMEOUT_SECS;
        }

        for (index, question) in self.questions.iter().enumerate() {
            if question.trim().is_empty() {
                return Err(ValidationError::EmptyQuestion { index });
            }
        }
        if self.questions.is_empty() && self.benchmark.name.to_lowercase().contains("bias") {
            return Err(ValidationError::MissingQuestions);
        }

        if self.id.as_deref().map_or(true, |id| id.trim().is_empty()) {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            self.id = Some(format!(
                "{}-{}-{}",
                self.benchmark.name,
                Utc::now().timestamp(),
                &suffix[..8]
            ));
        }
        Ok(())
    }

    pub fn job_id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Models named in `metadata.models`, accepting plain strings or `{id, name}`
    /// objects. Ids are unique: the first entry for an id wins. Falls back to
    /// [`DEFAULT_MODEL_ID`].
    pub fn models(&self) -> Vec<ModelSpec> {
        let mut models: Vec<ModelSpec> = Vec::new();
        if let Some(Value::Array(raw)) = self.metadata.get("models") {
            for entry in raw {
                match entry {
                    Value::String(id) if !id.is_empty() => models.push(ModelSpec {
                        id: id.clone(),
                        name: id.clone(),
                    }),
                    Value::Object(obj) => {
                        let Some(id) = obj.get("id").and_then(Value::as_str) else {
                            continue;
                        };
                        if id.is_empty() {
                            continue;
                        }
                        let name = obj
                            .get("name")
                            .and_then(Value::as_str)
                            .filter(|n| !n.is_empty())
                            .unwrap_or(id);
                        models.push(ModelSpec {
                            id: id.to_string(),
                            name: name.to_string(),
                        });
                    }
                    _ => {}
                }
            }
        }
        let mut seen = HashSet::new();
        models.retain(|m| seen.insert(m.id.clone()));
        if models.is_empty() {
            models.push(ModelSpec {
                id: DEFAULT_MODEL_ID.to_string(),
                name: DEFAULT_MODEL_ID.to_string(),
            });
        }
        models
    }

    pub fn nonce(&self) -> Option<&str> {
        self.metadata.get("nonce").and_then(Value::as_str)
    }
}
