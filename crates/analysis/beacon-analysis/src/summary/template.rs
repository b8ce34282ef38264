use async_trait::async_trait;
use beacon_types::SummarySource;
use std::fmt::Write;

use super::{RenderedSummary, SummaryContext, SummaryError, SummaryStrategy};

const MAX_FINDINGS: usize = 5;

/// Deterministic summary built only from the report.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateSummaryStrategy;

impl TemplateSummaryStrategy {
    pub fn render_report(&self, ctx: &SummaryContext<'_>) -> RenderedSummary {
        let report = ctx.report;
        let m = &report.metrics;
        let recommendation = report.conclusion.recommendation();
        let mut out = String::new();

        let _ = writeln!(out, "{}", report.conclusion.statement(report.regions.len()));
        let _ = writeln!(
            out,
            "Models evaluated: {}. Regions covered: {}.",
            report.models.join(", "),
            report.regions.join(", ")
        );

        out.push_str("\n**Key Metrics:**\n");
        let _ = writeln!(out, "- Bias variance: {:.2} (0 indicates uniform responses)", m.bias_variance);
        let _ = writeln!(out, "- Censorship rate: {:.0}% of regions", m.censorship_rate * 100.0);
        let _ = writeln!(
            out,
            "- Factual consistency: {:.0}% alignment across regions",
            m.factual_consistency * 100.0
        );
        let _ = writeln!(
            out,
            "- Narrative divergence: {:.2} (1 indicates highly divergent narratives)",
            m.narrative_divergence
        );

        out.push_str("\n**Key Findings:**\n");
        if report.key_differences.is_empty() {
            out.push_str("- No significant cross-region differences were detected.\n");
        }
        for diff in report.key_differences.iter().take(MAX_FINDINGS) {
            let _ = writeln!(out, "- [{}] {}: {}", diff.severity, diff.dimension, diff.description);
        }
        if report.key_differences.len() > MAX_FINDINGS {
            let _ = writeln!(
                out,
                "- ...and {} more",
                report.key_differences.len() - MAX_FINDINGS
            );
        }

        out.push_str("\n**Identified Risks:**\n");
        if report.risks.is_empty() {
            out.push_str("- No risks identified.\n");
        }
        for risk in &report.risks {
            let _ = write!(
                out,
                "- {} ({}, confidence {:.0}%): {}",
                risk.risk_type.replace('_', " "),
                risk.severity,
                risk.confidence * 100.0,
                risk.description
            );
            if !risk.regions.is_empty() {
                let _ = write!(out, ". Regions: {}", risk.regions.join(", "));
            }
            out.push('\n');
        }

        out.push_str("\n**Conclusion:**\n");
        out.push_str(&recommendation);

        RenderedSummary {
            summary: out,
            recommendation,
            source: SummarySource::Template,
        }
    }
}

#[async_trait]
impl SummaryStrategy for TemplateSummaryStrategy {
    fn source(&self) -> SummarySource {
        SummarySource::Template
    }

    async fn render(&self, ctx: &SummaryContext<'_>) -> Result<RenderedSummary, SummaryError> {
        Ok(self.render_report(ctx))
    }
}
