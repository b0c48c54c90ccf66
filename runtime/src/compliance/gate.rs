//! CI gate: pass or fail a build on a scan report.
//!
//! The engine never enforces a minimum score itself; the CLI and REST
//! surfaces call [`check_compliance`] and turn the outcome into an exit code
//! or a response.

use super::ScanReport;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub passed: bool,
    pub compliance_score: f64,
    pub min_compliance_score: f64,
    pub message: String,
    pub high_risk_features: Vec<String>,
    pub deprecated_features: Vec<String>,
}

/// Compare a report against `min_score`; optionally fail on any deprecated
/// feature as well.
pub fn check_compliance(report: &ScanReport, min_score: f64, fail_on_deprecated: bool) -> GateOutcome {
    let mut passed = report.compliance_score >= min_score;
    let mut message = if passed {
        format!(
            "PASSED: compliance {:.2}% (threshold {:.2}%)",
            report.compliance_score, min_score
        )
    } else {
        let mut m = format!(
            "FAILED: compliance {:.2}% below threshold {:.2}%",
            report.compliance_score, min_score
        );
        if !report.high_risk_features.is_empty() {
            m.push_str(&format!(
                "\nhigh-risk features: {}",
                report.high_risk_features.join(", ")
            ));
        }
        m
    };

    if fail_on_deprecated && !report.deprecated_features.is_empty() {
        if passed {
            message = format!(
                "FAILED: compliance {:.2}% meets threshold {:.2}% but deprecated features are in use",
                report.compliance_score, min_score
            );
        }
        passed = false;
        message.push_str(&format!(
            "\ndeprecated features: {}",
            report.deprecated_features.join(", ")
        ));
    }

    GateOutcome {
        passed,
        compliance_score: report.compliance_score,
        min_compliance_score: min_score,
        message,
        high_risk_features: report.high_risk_features.clone(),
        deprecated_features: report.deprecated_features.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::tests::report;

    #[test]
    fn test_threshold_is_inclusive() {
        let r = report("app", 80.0);
        assert!(check_compliance(&r, 80.0, false).passed);
        assert!(!check_compliance(&r, 80.01, false).passed);
    }

    #[test]
    fn test_failure_lists_high_risk_features() {
        let mut r = report("app", 61.5);
        r.high_risk_features = vec!["[popover]".into()];
        let outcome = check_compliance(&r, 80.0, false);
        assert!(!outcome.passed);
        assert!(outcome.message.contains("[popover]"));
    }

    #[test]
    fn test_deprecated_features_can_fail_the_gate() {
        let mut r = report("app", 95.0);
        r.deprecated_features = vec!["document.write".into()];
        assert!(check_compliance(&r, 80.0, false).passed);
        let outcome = check_compliance(&r, 80.0, true);
        assert!(!outcome.passed);
        assert!(outcome.message.contains("document.write"));
    }
}
