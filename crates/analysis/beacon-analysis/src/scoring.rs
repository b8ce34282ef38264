use beacon_types::RegionScoring;
use std::collections::BTreeSet;

use crate::lexicon::*;
use crate::text::{clamp01, contains_in_order};

/// Scores derived from a single response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseScore {
    pub bias_score: f64,
    pub censored: bool,
    pub political_sensitivity: f64,
    pub factual_accuracy: f64,
    pub cultural_bias: f64,
    pub sentiment: f64,
    pub keyword_flags: Vec<String>,
}

pub fn is_censored(lower: &str) -> bool {
    REFUSAL_PHRASES.iter().any(|p| lower.contains(p))
        || CENSORSHIP_PATTERNS.iter().any(|p| contains_in_order(lower, p))
}

fn bias_score(lower: &str, censored: bool, flags: &mut BTreeSet<String>) -> f64 {
    let mut score = 0.0;
    let mut hits = 0usize;
    for category in BIAS_CATEGORIES {
        for keyword in category.keywords {
            if lower.contains(keyword) {
                score += category.weight;
                hits += 1;
                flags.insert(format!("{}:{}", category.name, keyword));
            }
        }
    }
    if hits > 0 {
        score /= hits as f64;
    }
    if censored {
        score += 0.3;
    }
    clamp01(score)
}

fn political_sensitivity(lower: &str, flags: &mut BTreeSet<String>) -> f64 {
    let matched: Vec<f64> = POLITICAL_KEYWORDS
        .iter()
        .filter(|(kw, _)| lower.contains(kw))
        .map(|(kw, weight)| {
            flags.insert(format!("political:{}", kw));
            *weight
        })
        .collect();
    if matched.is_empty() {
        return 0.0;
    }
    let avg = matched.iter().sum::<f64>() / matched.len() as f64;
    let length_factor = (lower.chars().count() as f64 / 1000.0).min(1.0);
    clamp01(avg * length_factor)
}

fn factual_accuracy(lower: &str, censored: bool) -> f64 {
    if censored {
        return 0.1;
    }
    let count = |phrases: &[&str]| phrases.iter().filter(|p| lower.contains(*p)).count() as f64;
    clamp01(
        0.5 + 0.1 * count(EVIDENCE_PHRASES) + 0.05 * count(HEDGING_PHRASES)
            - 0.1 * count(ABSOLUTE_PHRASES),
    )
}

fn cultural_bias(lower: &str, flags: &mut BTreeSet<String>) -> f64 {
    let matched: Vec<f64> = CULTURAL_KEYWORDS
        .iter()
        .filter(|(kw, _)| lower.contains(kw))
        .map(|(kw, weight)| {
            flags.insert(format!("cultural:{}", kw));
            *weight
        })
        .collect();
    if matched.is_empty() {
        0.0
    } else {
        matched.iter().sum::<f64>() / matched.len() as f64
    }
}

/// Share of positive words among positive and negative hits; `0.5` when neutral.
pub fn sentiment(lower: &str) -> f64 {
    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    if positive + negative == 0 {
        0.5
    } else {
        positive as f64 / (positive + negative) as f64
    }
}

pub fn score_response(text: &str) -> ResponseScore {
    let lower = text.to_lowercase();
    let mut flags = BTreeSet::new();
    let censored = is_censored(&lower);
    if censored {
        flags.insert("censorship:refusal".to_string());
    }
    ResponseScore {
        bias_score: bias_score(&lower, censored, &mut flags),
        censored,
        political_sensitivity: political_sensitivity(&lower, &mut flags),
        factual_accuracy: factual_accuracy(&lower, censored),
        cultural_bias: cultural_bias(&lower, &mut flags),
        sentiment: sentiment(&lower),
        keyword_flags: flags.into_iter().collect(),
    }
}

/// Folds every response of one region into its [`RegionScoring`].
pub fn region_scoring(scores: &[&ResponseScore]) -> RegionScoring {
    if scores.is_empty() {
        return RegionScoring::default();
    }
    let n = scores.len() as f64;
    let mean = |f: fn(&ResponseScore) -> f64| scores.iter().map(|s| f(s)).sum::<f64>() / n;
    let keywords: BTreeSet<String> = scores
        .iter()
        .flat_map(|s| s.keyword_flags.iter().cloned())
        .collect();
    RegionScoring {
        bias_score: clamp01(mean(|s| s.bias_score)),
        censorship_detected: scores.iter().any(|s| s.censored),
        political_sensitivity: clamp01(mean(|s| s.political_sensitivity)),
        factual_accuracy: clamp01(mean(|s| s.factual_accuracy)),
        keywords_detected: keywords.into_iter().collect(),
    }
}
