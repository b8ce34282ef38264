use beacon_analysis::summary::{LlmConfig, DEFAULT_LLM_MODEL, DEFAULT_MIN_SUMMARY_LENGTH};
use beacon_identity::AuthConfig;
use beacon_runtime::ExecutorConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "BEACON";

/// Service configuration.
///
/// Layered as: built-in defaults, then the optional TOML file, then
/// `BEACON_*` environment variables (`BEACON_MAX_CONCURRENCY=4`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub listen_addr: String,

    /// JSON allowlist of signing keys. Absent means an empty allowlist.
    pub trusted_keys_file: Option<PathBuf>,
    pub trusted_keys_reload_secs: u64,
    pub trust_enforce: bool,
    pub timestamp_max_skew_secs: u64,
    pub timestamp_max_age_secs: u64,
    pub replay_protection_enabled: bool,
    pub nonce_retention_secs: u64,
    /// Development only.
    pub auth_bypass: bool,

    pub unit_timeout_secs: u64,
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub inline_retries: u32,
    pub retry_backoff_ms: u64,
    pub job_workers: usize,
    pub queue_capacity: usize,

    pub llm_summaries_enabled: bool,
    pub llm_min_summary_length: usize,
    pub llm_model: String,

    pub log_level: String,
    /// Raw 32-byte Ed25519 secret used to sign receipts; generated when missing.
    pub runner_key_path: Option<PathBuf>,

    /// Region name to inference base URL. `BEACON_REGION_ENDPOINTS` takes a JSON object.
    #[serde(deserialize_with = "endpoints_from_map_or_json")]
    pub region_endpoints: HashMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let executor = ExecutorConfig::default();
        Self {
            listen_addr: "0.0.0.0:8090".to_string(),
            trusted_keys_file: None,
            trusted_keys_reload_secs: 60,
            trust_enforce: false,
            timestamp_max_skew_secs: 300,
            timestamp_max_age_secs: 600,
            replay_protection_enabled: true,
            nonce_retention_secs: 900,
            auth_bypass: false,
            unit_timeout_secs: executor.unit_timeout_secs,
            max_concurrency: executor.max_concurrency,
            max_retries: executor.max_retries,
            inline_retries: executor.inline_retries,
            retry_backoff_ms: executor.retry_backoff_ms,
            job_workers: 2,
            queue_capacity: 256,
            llm_summaries_enabled: false,
            llm_min_summary_length: DEFAULT_MIN_SUMMARY_LENGTH,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            log_level: "info".to_string(),
            runner_key_path: None,
            region_endpoints: HashMap::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EndpointsRepr {
    Map(HashMap<String, String>),
    Json(String),
}

fn endpoints_from_map_or_json<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    match EndpointsRepr::deserialize(deserializer)? {
        EndpointsRepr::Map(map) => Ok(map),
        EndpointsRepr::Json(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
        EndpointsRepr::Json(raw) => serde_json::from_str(&raw).map_err(serde::de::Error::custom),
    }
}

impl RunnerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&RunnerConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            trust_enforce: self.trust_enforce,
            max_skew: Duration::from_secs(self.timestamp_max_skew_secs),
            max_age: Duration::from_secs(self.timestamp_max_age_secs),
            replay_protection: self.replay_protection_enabled,
            bypass: self.auth_bypass,
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            unit_timeout_secs: self.unit_timeout_secs,
            max_concurrency: self.max_concurrency.max(1),
            max_retries: self.max_retries,
            inline_retries: self.inline_retries,
            retry_backoff_ms: self.retry_backoff_ms,
        }
    }

    /// LLM settings; the API key and base URL come from `OPENAI_*` variables.
    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig::from_env(
            self.llm_summaries_enabled,
            &self.llm_model,
            self.llm_min_summary_length,
        )
    }

    pub fn nonce_retention(&self) -> Duration {
        Duration::from_secs(self.nonce_retention_secs)
    }

    pub fn trusted_keys_reload_interval(&self) -> Duration {
        Duration::from_secs(self.trusted_keys_reload_secs.max(1))
    }
}
