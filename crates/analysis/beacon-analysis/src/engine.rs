use beacon_types::{
    CrossRegionAnalysis, ExecutionUnit, KeyDifference, RegionScoring, RiskAssessment, UnitStatus,
};
use chrono::Utc;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::conclusion::Conclusion;
use crate::differences::key_differences;
use crate::divergence::{self, group_samples, ResponseSample};
use crate::metrics;
use crate::risk::{assess_risks, DivergenceMetrics};
use crate::scoring::{region_scoring, score_response};
use crate::summary::RenderedSummary;
use crate::text::extract_response_text;

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("insufficient regions for analysis: need {required}, have {actual}")]
    InsufficientRegions { required: usize, actual: usize },
}

/// Everything the engine derives from one job's units, before summarising.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub metrics: DivergenceMetrics,
    pub key_differences: Vec<KeyDifference>,
    pub risks: Vec<RiskAssessment>,
    pub conclusion: Conclusion,
    pub region_scores: BTreeMap<String, RegionScoring>,
    /// Regions with usable output, in first-seen order.
    pub regions: Vec<String>,
    pub models: Vec<String>,
    pub questions: Vec<String>,
}

impl AnalysisReport {
    pub fn into_record(self, job_id: &str, summary: RenderedSummary) -> CrossRegionAnalysis {
        CrossRegionAnalysis {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            bias_variance: self.metrics.bias_variance,
            censorship_rate: self.metrics.censorship_rate,
            factual_consistency: self.metrics.factual_consistency,
            narrative_divergence: self.metrics.narrative_divergence,
            key_differences: self.key_differences,
            risk_assessment: self.risks,
            summary: summary.summary,
            recommendation: summary.recommendation,
            summary_source: summary.source,
            region_scores: self.region_scores,
            created_at: Utc::now(),
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

#[derive(Debug, Default, Clone)]
pub struct DiffAnalysisEngine;

impl DiffAnalysisEngine {
    pub fn new() -> Self {
        Self
    }

    /// Analyses the completed units of one job.
    ///
    /// Only completed units with non-empty response text count. Fails when
    /// fewer than `min_regions` regions have any usable output.
    pub fn analyze(
        &self,
        units: &[ExecutionUnit],
        min_regions: usize,
    ) -> Result<AnalysisReport, AnalysisError> {
        let mut regions = Vec::new();
        let mut models = Vec::new();
        let mut questions = Vec::new();
        let samples: Vec<ResponseSample> = units
            .iter()
            .filter(|u| u.status == UnitStatus::Completed)
            .filter_map(|u| {
                let text = extract_response_text(u.output.as_ref()?)?;
                push_unique(&mut regions, &u.region);
                push_unique(&mut models, &u.model_id);
                if !u.question.is_empty() {
                    push_unique(&mut questions, &u.question);
                }
                Some(ResponseSample {
                    region: u.region.clone(),
                    model_id: u.model_id.clone(),
                    question_id: u.question_id.clone(),
                    question_index: u.question_index,
                    question: u.question.clone(),
                    score: score_response(&text),
                    text,
                })
            })
            .collect();

        let required = min_regions.max(1);
        if regions.len() < required {
            metrics::record_analysis("insufficient_regions");
            return Err(AnalysisError::InsufficientRegions {
                required,
                actual: regions.len(),
            });
        }

        let groups = group_samples(&samples);
        let factual_consistency = divergence::factual_consistency(&groups);
        let metrics = DivergenceMetrics {
            bias_variance: divergence::bias_variance(&groups),
            censorship_rate: divergence::censorship_rate(&samples),
            factual_consistency,
            narrative_divergence: divergence::narrative_divergence(factual_consistency),
        };
        let key_differences = key_differences(&groups);

        let region_scores: BTreeMap<String, RegionScoring> = regions
            .iter()
            .map(|region| {
                let scores: Vec<_> = samples
                    .iter()
                    .filter(|s| &s.region == region)
                    .map(|s| &s.score)
                    .collect();
                (region.clone(), region_scoring(&scores))
            })
            .collect();
        let censored_regions: Vec<String> = regions
            .iter()
            .filter(|r| region_scores.get(*r).map_or(false, |s| s.censorship_detected))
            .cloned()
            .collect();

        let risks = assess_risks(&metrics, &key_differences, &censored_regions, &regions);
        let conclusion = Conclusion::select(&metrics, &risks);
        tracing::info!(
            "Analysed {} responses over {} regions: bias_variance={:.2} censorship_rate={:.2} factual_consistency={:.2} narrative_divergence={:.2}, {} differences, {} risks",
            samples.len(),
            regions.len(),
            metrics.bias_variance,
            metrics.censorship_rate,
            metrics.factual_consistency,
            metrics.narrative_divergence,
            key_differences.len(),
            risks.len()
        );
        metrics::record_analysis("ok");

        Ok(AnalysisReport {
            metrics,
            key_differences,
            risks,
            conclusion,
            region_scores,
            regions,
            models,
            questions,
        })
    }
}
