use async_trait::async_trait;
use beacon_types::SummarySource;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write;
use std::time::Duration;

use super::{RenderedSummary, SummaryContext, SummaryError, SummaryStrategy};

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_LLM_MODEL: &str = "gpt-5-nano";
pub const DEFAULT_MIN_SUMMARY_LENGTH: usize = 300;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);
const MAX_COMPLETION_TOKENS: u32 = 4000;

const SYSTEM_PROMPT: &str = "You are an analyst writing executive summaries about AI bias and censorship patterns observed across regions.

Write short, direct sentences with specific numbers. Start each section with a bold heading.

REQUIRED STRUCTURE:

**Risk Level: [CRITICAL RISK/HIGH RISK/MEDIUM RISK/LOW RISK]**

[2-3 sentence opening paragraph stating the main finding]

**Censorship Patterns**

**Bias and Consistency**

**Risk Assessment**

**Recommended Actions**

**Bottom Line**

Tone: professional, neutral, evidence-based.";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub min_length: usize,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            min_length: DEFAULT_MIN_SUMMARY_LENGTH,
            timeout: REQUEST_TIMEOUT,
        }
    }
}

impl LlmConfig {
    /// Reads `OPENAI_API_KEY` and `OPENAI_API_BASE_URL` from the environment.
    pub fn from_env(enabled: bool, model: &str, min_length: usize) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let base_url = std::env::var("OPENAI_API_BASE_URL")
            .ok()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string());
        Self {
            enabled,
            api_key,
            base_url,
            model: model.to_string(),
            min_length,
            timeout: REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Asks an OpenAI-compatible chat completion endpoint for the narrative.
pub struct LlmSummaryStrategy {
    client: Client,
    config: LlmConfig,
}

impl LlmSummaryStrategy {
    pub fn new(config: LlmConfig) -> Result<Self, SummaryError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SummaryError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }
}

/// User prompt carrying every metric, difference and risk of the report.
pub fn build_prompt(ctx: &SummaryContext<'_>) -> String {
    let report = ctx.report;
    let m = &report.metrics;
    let mut p = String::new();

    p.push_str("Generate a 400-500 word executive narrative analysing the cross-region audit results below.\n\n");
    p.push_str("Context:\n");
    let _ = writeln!(p, "Job identifier: {}", ctx.job_id);
    if !ctx.benchmark_name.is_empty() {
        let _ = writeln!(p, "Benchmark: {}", ctx.benchmark_name);
    }
    if !ctx.benchmark_description.is_empty() {
        let _ = writeln!(p, "Benchmark description: {}", ctx.benchmark_description);
    }
    let _ = writeln!(p, "Models evaluated: {}", report.models.join(", "));
    let _ = writeln!(p, "Regions covered: {}", report.regions.join(", "));
    if !report.questions.is_empty() {
        let _ = writeln!(p, "Primary questions: {}", report.questions.join("; "));
    }

    p.push_str("\nAudit Summary:\n");
    let _ = writeln!(p, "Bias variance: {:.2} (0 indicates uniform responses).", m.bias_variance);
    let _ = writeln!(p, "Censorship rate: {:.0}% of regions.", m.censorship_rate * 100.0);
    let _ = writeln!(p, "Factual consistency: {:.0}% alignment across regions.", m.factual_consistency * 100.0);
    let _ = writeln!(
        p,
        "Narrative divergence: {:.2} (1 indicates highly divergent narratives).",
        m.narrative_divergence
    );

    p.push_str("\nRegional Metrics:\n");
    for (region, s) in &report.region_scores {
        let _ = write!(
            p,
            "{} metrics -> bias {:.2}; censorship {}; political sensitivity {:.2}; factual accuracy {:.2}",
            region, s.bias_score, s.censorship_detected, s.political_sensitivity, s.factual_accuracy
        );
        if !s.keywords_detected.is_empty() {
            let _ = write!(p, "; keywords {}", s.keywords_detected.join(", "));
        }
        p.push_str(".\n");
    }

    p.push_str("\nObserved Differences:\n");
    if report.key_differences.is_empty() {
        p.push_str("No significant cross-region differences recorded beyond headline metrics.\n");
    }
    for diff in &report.key_differences {
        let _ = writeln!(p, "{} ({} severity): {}", diff.dimension, diff.severity, diff.description);
        if !diff.variations.is_empty() {
            let comparisons: Vec<String> = diff
                .variations
                .iter()
                .map(|(region, v)| format!("{} vs {}", region, v))
                .collect();
            let _ = writeln!(p, "Regional comparisons: {}", comparisons.join("; "));
        }
    }

    p.push_str("\nRisks Identified:\n");
    if report.risks.is_empty() {
        p.push_str("No material risks identified.\n");
    }
    for risk in &report.risks {
        let _ = writeln!(
            p,
            "{} risk ({} severity, confidence {:.0}%): {}",
            risk.risk_type, risk.severity, risk.confidence * 100.0, risk.description
        );
        if !risk.regions.is_empty() {
            let _ = writeln!(p, "Regions affected: {}", risk.regions.join(", "));
        }
    }

    let _ = write!(
        p,
        "\nTask:\nExplain what these results mean for someone relying on these models. Our assessment is: {}",
        report.conclusion.recommendation()
    );
    p
}

#[async_trait]
impl SummaryStrategy for LlmSummaryStrategy {
    fn source(&self) -> SummarySource {
        SummarySource::Llm
    }

    async fn render(&self, ctx: &SummaryContext<'_>) -> Result<RenderedSummary, SummaryError> {
        if !self.config.enabled {
            return Err(SummaryError::Disabled);
        }
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(SummaryError::MissingApiKey)?;

        let prompt = build_prompt(ctx);
        tracing::debug!("Requesting LLM summary for job {} ({} prompt chars)", ctx.job_id, prompt.len());
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "max_completion_tokens": MAX_COMPLETION_TOKENS,
        });
        let url = format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SummaryError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SummaryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| SummaryError::Malformed(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(SummaryError::EmptyChoices)?
            .message
            .content
            .unwrap_or_default();
        let summary = content.trim().to_string();
        let length = summary.chars().count();
        if length < self.config.min_length {
            return Err(SummaryError::TooShort {
                length,
                min: self.config.min_length,
            });
        }

        Ok(RenderedSummary {
            summary,
            recommendation: ctx.report.conclusion.recommendation(),
            source: SummarySource::Llm,
        })
    }
}
