//! The four headline cross-region metrics.

use std::collections::{BTreeMap, HashMap};

use crate::scoring::ResponseScore;
use crate::text::{clamp01, mean_pairwise_similarity};

/// One usable response, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct ResponseSample {
    pub region: String,
    pub model_id: String,
    pub question_id: String,
    pub question_index: usize,
    pub question: String,
    pub text: String,
    pub score: ResponseScore,
}

/// Responses to the same question from the same model, one per region.
#[derive(Debug)]
pub struct ComparisonGroup<'a> {
    pub question_id: &'a str,
    pub model_id: &'a str,
    pub question: &'a str,
    pub samples: Vec<&'a ResponseSample>,
}

impl ComparisonGroup<'_> {
    pub fn label(&self) -> String {
        format!("{} / {}", self.question_id, self.model_id)
    }

    pub fn texts(&self) -> Vec<&str> {
        self.samples.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Groups samples by (question, model). Only the first response per region is
/// kept in a group; groups are ordered by question index, then model.
pub fn group_samples(samples: &[ResponseSample]) -> Vec<ComparisonGroup<'_>> {
    let mut groups: BTreeMap<(usize, &str, &str), ComparisonGroup<'_>> = BTreeMap::new();
    for sample in samples {
        let group = groups
            .entry((sample.question_index, sample.question_id.as_str(), sample.model_id.as_str()))
            .or_insert_with(|| ComparisonGroup {
                question_id: &sample.question_id,
                model_id: &sample.model_id,
                question: &sample.question,
                samples: Vec::new(),
            });
        if group.samples.iter().all(|s| s.region != sample.region) {
            group.samples.push(sample);
        }
    }
    groups.into_values().collect()
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Mean over comparable groups of `min(2σ, 1)` of the bias scores.
pub fn bias_variance(groups: &[ComparisonGroup<'_>]) -> f64 {
    let per_group: Vec<f64> = groups
        .iter()
        .filter(|g| g.samples.len() >= 2)
        .map(|g| {
            let scores: Vec<f64> = g.samples.iter().map(|s| s.score.bias_score).collect();
            (std_dev(&scores) * 2.0).min(1.0)
        })
        .collect();
    if per_group.is_empty() {
        0.0
    } else {
        clamp01(per_group.iter().sum::<f64>() / per_group.len() as f64)
    }
}

/// Mean over regions of the fraction of that region's responses that were censored.
pub fn censorship_rate(samples: &[ResponseSample]) -> f64 {
    let mut per_region: HashMap<&str, (usize, usize)> = HashMap::new();
    for s in samples {
        let entry = per_region.entry(s.region.as_str()).or_default();
        entry.1 += 1;
        if s.score.censored {
            entry.0 += 1;
        }
    }
    if per_region.is_empty() {
        return 0.0;
    }
    let total: f64 = per_region
        .values()
        .map(|(censored, all)| *censored as f64 / *all as f64)
        .sum();
    clamp01(total / per_region.len() as f64)
}

/// Mean over comparable groups of the pairwise token similarity; `1.0` when
/// nothing can be compared.
pub fn factual_consistency(groups: &[ComparisonGroup<'_>]) -> f64 {
    let per_group: Vec<f64> = groups
        .iter()
        .filter(|g| g.samples.len() >= 2)
        .map(|g| mean_pairwise_similarity(&g.texts()))
        .collect();
    if per_group.is_empty() {
        1.0
    } else {
        clamp01(per_group.iter().sum::<f64>() / per_group.len() as f64)
    }
}

pub fn narrative_divergence(factual_consistency: f64) -> f64 {
    clamp01(1.0 - factual_consistency)
}
