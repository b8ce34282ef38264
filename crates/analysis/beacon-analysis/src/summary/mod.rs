//! Narrative summaries for a finished analysis.
//!
//! A [`FallbackChain`] tries an optional primary strategy (the hosted LLM) and
//! falls back to the deterministic template. The chain itself never fails:
//! every primary error is logged with its reason and absorbed.

mod llm;
mod template;

pub use llm::{
    build_prompt, LlmConfig, LlmSummaryStrategy, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL,
    DEFAULT_MIN_SUMMARY_LENGTH,
};
pub use template::TemplateSummaryStrategy;

use async_trait::async_trait;
use beacon_types::SummarySource;
use thiserror::Error;

use crate::engine::AnalysisReport;
use crate::metrics;

/// What a strategy gets to work with.
#[derive(Debug, Clone, Copy)]
pub struct SummaryContext<'a> {
    pub job_id: &'a str,
    pub benchmark_name: &'a str,
    pub benchmark_description: &'a str,
    pub report: &'a AnalysisReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSummary {
    pub summary: String,
    pub recommendation: String,
    pub source: SummarySource,
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("LLM summaries are disabled")]
    Disabled,
    #[error("OPENAI_API_KEY not configured")]
    MissingApiKey,
    #[error("LLM request failed: {0}")]
    Transport(String),
    #[error("LLM API error (status {status}): {body}")]
    Status { status: u16, body: String },
    #[error("LLM returned no choices")]
    EmptyChoices,
    #[error("LLM summary too short ({length} < {min} chars)")]
    TooShort { length: usize, min: usize },
    #[error("malformed LLM response: {0}")]
    Malformed(String),
}

impl SummaryError {
    /// Short label used for the fallback counter.
    pub fn reason(&self) -> &'static str {
        match self {
            SummaryError::Disabled => "disabled",
            SummaryError::MissingApiKey => "missing_api_key",
            SummaryError::Transport(_) => "transport",
            SummaryError::Status { .. } => "status",
            SummaryError::EmptyChoices => "empty_choices",
            SummaryError::TooShort { .. } => "too_short",
            SummaryError::Malformed(_) => "malformed",
        }
    }
}

#[async_trait]
pub trait SummaryStrategy: Send + Sync {
    fn source(&self) -> SummarySource;

    async fn render(&self, ctx: &SummaryContext<'_>) -> Result<RenderedSummary, SummaryError>;
}

pub struct FallbackChain {
    primary: Option<Box<dyn SummaryStrategy>>,
    fallback: TemplateSummaryStrategy,
}

impl FallbackChain {
    pub fn new(primary: Option<Box<dyn SummaryStrategy>>) -> Self {
        Self {
            primary,
            fallback: TemplateSummaryStrategy,
        }
    }

    pub fn template_only() -> Self {
        Self::new(None)
    }

    pub async fn render(&self, ctx: &SummaryContext<'_>) -> RenderedSummary {
        if let Some(primary) = &self.primary {
            match primary.render(ctx).await {
                Ok(rendered) => {
                    metrics::record_summary(&rendered.source.to_string());
                    return rendered;
                }
                Err(SummaryError::Disabled) => {
                    tracing::debug!("LLM summaries disabled for job {}, using template", ctx.job_id);
                    metrics::record_summary_fallback(SummaryError::Disabled.reason());
                }
                Err(e) => {
                    tracing::warn!(
                        "Primary summary failed for job {} ({}), falling back to template",
                        ctx.job_id,
                        e
                    );
                    metrics::record_summary_fallback(e.reason());
                }
            }
        }
        let rendered = self.fallback.render_report(ctx);
        metrics::record_summary(&rendered.source.to_string());
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DiffAnalysisEngine;
    use beacon_types::{ExecutionUnit, UnitStatus};
    use chrono::Utc;
    use serde_json::json;

    pub(crate) fn report() -> AnalysisReport {
        let unit = |region: &str, text: &str| ExecutionUnit {
            status: UnitStatus::Completed,
            output: Some(json!({ "response": text })),
            completed_at: Some(Utc::now()),
            ..ExecutionUnit::pending("job-1", region, "llama3.2-1b", 0, "q0", "What happened?")
        };
        let units = vec![
            unit("US", "Students protested for democracy and the army cleared the square."),
            unit("EU", "Students protested for democracy; the government used troops."),
            unit("ASIA", "I cannot discuss this topic."),
        ];
        DiffAnalysisEngine::new().analyze(&units, 2).unwrap()
    }

    struct Failing;

    #[async_trait]
    impl SummaryStrategy for Failing {
        fn source(&self) -> SummarySource {
            SummarySource::Llm
        }

        async fn render(&self, _ctx: &SummaryContext<'_>) -> Result<RenderedSummary, SummaryError> {
            Err(SummaryError::Status {
                status: 500,
                body: "boom".into(),
            })
        }
    }

    #[tokio::test]
    async fn failing_primary_falls_back_to_template() {
        let report = report();
        let ctx = SummaryContext {
            job_id: "job-1",
            benchmark_name: "bias-detection",
            benchmark_description: "",
            report: &report,
        };
        let rendered = FallbackChain::new(Some(Box::new(Failing))).render(&ctx).await;
        assert_eq!(rendered.source, SummarySource::Template);
        assert_eq!(rendered.recommendation, report.conclusion.recommendation());
        assert!(rendered.summary.contains("**Key Metrics:**"));
    }
}
