use beacon_types::{KeyDifference, RiskAssessment, RiskSeverity, Severity};
use std::collections::BTreeSet;

use crate::differences::is_political;

/// The four headline metrics, all in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DivergenceMetrics {
    pub bias_variance: f64,
    pub censorship_rate: f64,
    pub factual_consistency: f64,
    pub narrative_divergence: f64,
}

/// Risks supported by the metrics, in detection order.
///
/// `censored_regions` and `all_regions` name the regions each risk applies to.
pub fn assess_risks(
    metrics: &DivergenceMetrics,
    differences: &[KeyDifference],
    censored_regions: &[String],
    all_regions: &[String],
) -> Vec<RiskAssessment> {
    let mut risks = Vec::new();
    let cr = metrics.censorship_rate;
    let bv = metrics.bias_variance;
    let fc = metrics.factual_consistency;
    let nd = metrics.narrative_divergence;

    if cr > 0.0 {
        let severity = match cr {
            r if r >= 0.7 => RiskSeverity::Critical,
            r if r >= 0.5 => RiskSeverity::High,
            r if r >= 0.3 => RiskSeverity::Medium,
            _ => RiskSeverity::Low,
        };
        risks.push(RiskAssessment {
            risk_type: "censorship".into(),
            severity,
            confidence: (0.5 + cr / 2.0).min(1.0),
            description: format!(
                "Responses were refused or restricted in {:.0}% of regions on average",
                cr * 100.0
            ),
            regions: censored_regions.to_vec(),
        });
    }

    if bv > 0.3 {
        let severity = match bv {
            v if v >= 0.8 => RiskSeverity::Critical,
            v if v >= 0.6 => RiskSeverity::High,
            v if v >= 0.4 => RiskSeverity::Medium,
            _ => RiskSeverity::Low,
        };
        risks.push(RiskAssessment {
            risk_type: "bias".into(),
            severity,
            confidence: bv.min(1.0),
            description: format!(
                "Bias scores vary substantially between regions (variance {:.2})",
                bv
            ),
            regions: all_regions.to_vec(),
        });
    }

    if fc < 0.3 && nd > 0.7 {
        let severity = if fc < 0.15 {
            RiskSeverity::Critical
        } else {
            RiskSeverity::High
        };
        risks.push(RiskAssessment {
            risk_type: "misinformation".into(),
            severity,
            confidence: (1.0 - fc).clamp(0.0, 1.0),
            description: format!(
                "Regions give factually inconsistent accounts (consistency {:.0}%, divergence {:.2})",
                fc * 100.0,
                nd
            ),
            regions: all_regions.to_vec(),
        });
    }

    let political: Vec<&KeyDifference> = differences.iter().filter(|d| is_political(d)).collect();
    if !political.is_empty() {
        let high = political.iter().filter(|d| d.severity == Severity::High).count();
        let medium = political.iter().filter(|d| d.severity == Severity::Medium).count();
        let severity = if high >= 2 {
            RiskSeverity::Critical
        } else if high == 1 || medium >= 3 {
            RiskSeverity::High
        } else {
            RiskSeverity::Medium
        };
        let regions: BTreeSet<String> = political
            .iter()
            .flat_map(|d| d.variations.keys().cloned())
            .collect();
        risks.push(RiskAssessment {
            risk_type: "political_manipulation".into(),
            severity,
            confidence: (0.5 + 0.1 * political.len() as f64).min(0.95),
            description: format!(
                "{} political framing difference(s) detected across regions",
                political.len()
            ),
            regions: regions.into_iter().collect(),
        });
    }

    if cr > 0.3 && bv > 0.5 {
        risks.push(RiskAssessment {
            risk_type: "narrative_control".into(),
            severity: RiskSeverity::Critical,
            confidence: ((cr + bv) / 2.0).min(1.0),
            description: "Censorship combined with large bias variance suggests coordinated control of the narrative"
                .into(),
            regions: censored_regions.to_vec(),
        });
    }

    risks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn metrics(bv: f64, cr: f64, fc: f64) -> DivergenceMetrics {
        DivergenceMetrics {
            bias_variance: bv,
            censorship_rate: cr,
            factual_consistency: fc,
            narrative_divergence: 1.0 - fc,
        }
    }

    fn regions() -> Vec<String> {
        vec!["US".into(), "EU".into()]
    }

    fn types(risks: &[RiskAssessment]) -> Vec<&str> {
        risks.iter().map(|r| r.risk_type.as_str()).collect()
    }

    #[test]
    fn clean_metrics_raise_no_risk() {
        assert!(assess_risks(&metrics(0.1, 0.0, 0.9), &[], &[], &regions()).is_empty());
    }

    #[test]
    fn misinformation_needs_both_signals() {
        let only_low_consistency = DivergenceMetrics {
            narrative_divergence: 0.5,
            ..metrics(0.0, 0.0, 0.2)
        };
        assert!(assess_risks(&only_low_consistency, &[], &[], &regions()).is_empty());

        let risks = assess_risks(&metrics(0.0, 0.0, 0.19), &[], &[], &regions());
        assert_eq!(types(&risks), vec!["misinformation"]);
        assert_eq!(risks[0].severity, RiskSeverity::High);
        assert!((risks[0].confidence - 0.81).abs() < 1e-9);
    }

    #[test]
    fn censorship_and_bias_compound_into_narrative_control() {
        let censored = vec!["CN".to_string()];
        let risks = assess_risks(&metrics(0.7, 0.5, 0.5), &[], &censored, &regions());
        assert_eq!(types(&risks), vec!["censorship", "bias", "narrative_control"]);
        assert_eq!(risks[0].severity, RiskSeverity::High);
        assert_eq!(risks[0].regions, censored);
        assert_eq!(risks[1].severity, RiskSeverity::High);
        assert_eq!(risks[2].severity, RiskSeverity::Critical);
    }

    #[test]
    fn political_differences_escalate() {
        let diff = |sev| KeyDifference {
            dimension: "political_stance:protest".into(),
            severity: sev,
            description: String::new(),
            variations: BTreeMap::from([("US".to_string(), "3".to_string())]),
        };
        let one_medium = assess_risks(&metrics(0.0, 0.0, 0.9), &[diff(Severity::Medium)], &[], &regions());
        assert_eq!(one_medium[0].severity, RiskSeverity::Medium);

        let two_high = assess_risks(
            &metrics(0.0, 0.0, 0.9),
            &[diff(Severity::High), diff(Severity::High)],
            &[],
            &regions(),
        );
        assert_eq!(two_high[0].risk_type, "political_manipulation");
        assert_eq!(two_high[0].severity, RiskSeverity::Critical);
        assert_eq!(two_high[0].regions, vec!["US".to_string()]);
    }
}
