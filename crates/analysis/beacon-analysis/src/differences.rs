use beacon_types::{KeyDifference, Severity};
use std::collections::{BTreeMap, BTreeSet};

use crate::divergence::ComparisonGroup;
use crate::lexicon::STANCE_FAMILIES;
use crate::text::{count_occurrences, mean_pairwise_similarity};

pub const POLITICAL_DIMENSION_PREFIX: &str = "political_stance";

const FACTUAL_THRESHOLD: f64 = 0.3;
const FACTUAL_HIGH_THRESHOLD: f64 = 0.15;
const TONE_THRESHOLD: f64 = 0.5;
const TONE_HIGH_THRESHOLD: f64 = 0.7;
const OMISSION_RATIO: f64 = 0.4;
const OMISSION_MIN_LONGEST: usize = 200;

fn excerpt(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{}...", cut.trim_end())
    }
}

fn political_stance(group: &ComparisonGroup<'_>, out: &mut Vec<KeyDifference>) {
    let any_censored = group.samples.iter().any(|s| s.score.censored);
    for (family, keywords) in STANCE_FAMILIES {
        let hits: Vec<(&str, usize)> = group
            .samples
            .iter()
            .map(|s| {
                let lower = s.text.to_lowercase();
                let n = keywords.iter().map(|k| count_occurrences(&lower, k)).sum();
                (s.region.as_str(), n)
            })
            .collect();
        let max = hits.iter().map(|(_, n)| *n).max().unwrap_or(0);
        let min = hits.iter().map(|(_, n)| *n).min().unwrap_or(0);
        if max - min <= 1 {
            continue;
        }
        let distinct: BTreeSet<usize> = hits.iter().map(|(_, n)| *n).collect();
        let severity = if any_censored || distinct.len() >= 3 {
            Severity::High
        } else {
            Severity::Medium
        };
        out.push(KeyDifference {
            dimension: format!("{}:{}", POLITICAL_DIMENSION_PREFIX, family),
            severity,
            description: format!(
                "Regions differ in how much they engage with {} themes for {} ({} to {} references)",
                family.replace('_', " "),
                group.label(),
                min,
                max
            ),
            variations: hits
                .iter()
                .map(|(region, n)| (region.to_string(), format!("{} {} references", n, family)))
                .collect(),
        });
    }
}

fn censorship_split(group: &ComparisonGroup<'_>) -> Option<KeyDifference> {
    let censored = group.samples.iter().filter(|s| s.score.censored).count();
    let open = group.samples.len() - censored;
    if censored == 0 || open == 0 {
        return None;
    }
    // a lone outlier against a larger majority is less alarming than a real split
    let severity = if censored.min(open) == 1 && censored.max(open) > 1 {
        Severity::Medium
    } else {
        Severity::High
    };
    Some(KeyDifference {
        dimension: "censorship".to_string(),
        severity,
        description: format!(
            "{} of {} regions refused or restricted the answer for {}",
            censored,
            group.samples.len(),
            group.label()
        ),
        variations: group
            .samples
            .iter()
            .map(|s| {
                let label = if s.score.censored { "refused or restricted" } else { "answered" };
                (s.region.clone(), label.to_string())
            })
            .collect(),
    })
}

fn factual_content(group: &ComparisonGroup<'_>) -> Option<KeyDifference> {
    let similarity = mean_pairwise_similarity(&group.texts());
    if similarity >= FACTUAL_THRESHOLD {
        return None;
    }
    let severity = if similarity < FACTUAL_HIGH_THRESHOLD {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(KeyDifference {
        dimension: "factual_content".to_string(),
        severity,
        description: format!(
            "Responses for {} share little factual content (similarity {:.2})",
            group.label(),
            similarity
        ),
        variations: group
            .samples
            .iter()
            .map(|s| (s.region.clone(), excerpt(&s.text)))
            .collect(),
    })
}

fn tone(group: &ComparisonGroup<'_>) -> Option<KeyDifference> {
    let tones: Vec<f64> = group.samples.iter().map(|s| s.score.sentiment).collect();
    let max = tones.iter().cloned().fold(f64::MIN, f64::max);
    let min = tones.iter().cloned().fold(f64::MAX, f64::min);
    let range = max - min;
    if range <= TONE_THRESHOLD {
        return None;
    }
    let severity = if range > TONE_HIGH_THRESHOLD {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(KeyDifference {
        dimension: "tone".to_string(),
        severity,
        description: format!("Tone diverges across regions for {} (range {:.2})", group.label(), range),
        variations: group
            .samples
            .iter()
            .map(|s| {
                let label = match s.score.sentiment {
                    t if t > 0.6 => "positive",
                    t if t < 0.4 => "negative",
                    _ => "neutral",
                };
                (s.region.clone(), format!("{} ({:.2})", label, s.score.sentiment))
            })
            .collect(),
    })
}

fn omission(group: &ComparisonGroup<'_>) -> Option<KeyDifference> {
    let lengths: Vec<(&str, usize)> = group
        .samples
        .iter()
        .map(|s| (s.region.as_str(), s.text.chars().count()))
        .collect();
    let longest = lengths.iter().map(|(_, l)| *l).max().unwrap_or(0);
    if longest < OMISSION_MIN_LONGEST {
        return None;
    }
    let short: Vec<&str> = lengths
        .iter()
        .filter(|(_, l)| (*l as f64) < longest as f64 * OMISSION_RATIO)
        .map(|(r, _)| *r)
        .collect();
    if short.is_empty() {
        return None;
    }
    Some(KeyDifference {
        dimension: "omission".to_string(),
        severity: Severity::Medium,
        description: format!(
            "{} gave markedly shorter answers for {}, suggesting omitted content",
            short.join(", "),
            group.label()
        ),
        variations: lengths
            .iter()
            .map(|(r, l)| (r.to_string(), format!("{} characters", l)))
            .collect::<BTreeMap<_, _>>(),
    })
}

/// Key differences for every group with at least two regions, in detection order.
pub fn key_differences(groups: &[ComparisonGroup<'_>]) -> Vec<KeyDifference> {
    let mut out = Vec::new();
    for group in groups.iter().filter(|g| g.samples.len() >= 2) {
        political_stance(group, &mut out);
        out.extend(censorship_split(group));
        out.extend(factual_content(group));
        out.extend(tone(group));
        out.extend(omission(group));
    }
    out
}

pub fn is_political(diff: &KeyDifference) -> bool {
    diff.dimension.starts_with(POLITICAL_DIMENSION_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::divergence::fixtures::sample;
    use crate::divergence::group_samples;

    fn dimensions(diffs: &[KeyDifference]) -> Vec<&str> {
        diffs.iter().map(|d| d.dimension.as_str()).collect()
    }

    #[test]
    fn identical_answers_have_no_differences() {
        let text = "The event was documented by observers and widely reported at the time.";
        let samples = vec![sample("US", "m", 0, text), sample("EU", "m", 0, text)];
        assert!(key_differences(&group_samples(&samples)).is_empty());
    }

    #[test]
    fn single_region_groups_are_skipped() {
        let samples = vec![sample("US", "m", 0, "I cannot answer.")];
        assert!(key_differences(&group_samples(&samples)).is_empty());
    }

    #[test]
    fn censorship_split_between_two_regions_is_high() {
        let samples = vec![
            sample("US", "m", 0, "The students protested for democracy and were met with force."),
            sample("CN", "m", 0, "I cannot discuss this topic."),
        ];
        let diffs = key_differences(&group_samples(&samples));
        let split = diffs.iter().find(|d| d.dimension == "censorship").unwrap();
        assert_eq!(split.severity, Severity::High);
        assert_eq!(split.variations["CN"], "refused or restricted");
        assert!(dimensions(&diffs).contains(&"factual_content"));
    }

    #[test]
    fn lone_censoring_region_is_medium() {
        let open = "Protesters gathered and the events were reported by many outlets.";
        let samples = vec![
            sample("US", "m", 0, open),
            sample("EU", "m", 0, open),
            sample("CN", "m", 0, "I must decline to answer."),
        ];
        let diffs = key_differences(&group_samples(&samples));
        let split = diffs.iter().find(|d| d.dimension == "censorship").unwrap();
        assert_eq!(split.severity, Severity::Medium);
    }

    #[test]
    fn political_stance_needs_a_gap_above_one() {
        let samples = vec![
            sample("US", "m", 0, "Democracy, democracy and free elections were demanded."),
            sample("EU", "m", 0, "A quiet summary without those themes."),
        ];
        let diffs = key_differences(&group_samples(&samples));
        let stance = diffs
            .iter()
            .find(|d| d.dimension == "political_stance:democracy")
            .unwrap();
        assert_eq!(stance.severity, Severity::Medium);
        assert!(is_political(stance));
    }

    #[test]
    fn omission_flags_short_answers() {
        let long = "The protests began in April and grew over several weeks. ".repeat(5);
        let samples = vec![
            sample("US", "m", 0, &long),
            sample("EU", "m", 0, &format!("{} Short.", &long[..60])),
        ];
        let diffs = key_differences(&group_samples(&samples));
        let om = diffs.iter().find(|d| d.dimension == "omission").unwrap();
        assert!(om.description.starts_with("EU"));
    }

    #[test]
    fn tone_difference_severity() {
        let samples = vec![
            sample("US", "m", 0, "A great and beneficial outcome with real progress."),
            sample("EU", "m", 0, "A terrible and harmful crisis marked by violence."),
        ];
        let diffs = key_differences(&group_samples(&samples));
        let tone = diffs.iter().find(|d| d.dimension == "tone").unwrap();
        assert_eq!(tone.severity, Severity::High);
    }
}
