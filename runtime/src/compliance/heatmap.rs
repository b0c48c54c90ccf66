//! Organization-wide heatmap over the latest report of every UI.
//!
//! Always derived on demand, never stored.

use super::ScanReport;
use crate::catalog::round2;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One UI's row in the heatmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSummary {
    pub ui_name: String,
    pub report_id: String,
    pub compliance_score: f64,
    pub total_features: usize,
    pub baseline_compliant: usize,
    pub high_risk_features: Vec<String>,
    pub deprecated_features: Vec<String>,
    pub scanned_at: DateTime<Utc>,
    pub catalog_stale: bool,
}

impl From<&ScanReport> for UiSummary {
    fn from(report: &ScanReport) -> Self {
        Self {
            ui_name: report.ui_name.clone(),
            report_id: report.id.clone(),
            compliance_score: report.compliance_score,
            total_features: report.total_features,
            baseline_compliant: report.baseline_compliant,
            high_risk_features: report.high_risk_features.clone(),
            deprecated_features: report.deprecated_features.clone(),
            scanned_at: report.scanned_at,
            catalog_stale: report.catalog_stale,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    pub total_uis: usize,
    /// Mean of the latest compliance scores; 100 when no UI was scanned.
    pub average_compliance: f64,
    pub low_compliance_threshold: f64,
    /// UIs scoring below the threshold.
    pub low_compliance_uis: usize,
    /// UIs with at least one high-risk feature.
    pub high_risk_uis: usize,
    pub worst_performer: Option<String>,
    /// Union of deprecated features across UIs.
    pub deprecated_features: Vec<String>,
    /// Rows ordered by UI name.
    pub uis: Vec<UiSummary>,
    pub generated_at: DateTime<Utc>,
}

/// Build a heatmap from the latest report of each UI.
///
/// If `latest` holds more than one report for a UI, the one scanned last
/// wins.
pub fn heatmap(latest: &[ScanReport], low_compliance_threshold: f64) -> Heatmap {
    let mut by_ui: std::collections::BTreeMap<&str, &ScanReport> = Default::default();
    for report in latest {
        match by_ui.get(report.ui_name.as_str()) {
            Some(existing) if existing.scanned_at > report.scanned_at => {}
            _ => {
                by_ui.insert(report.ui_name.as_str(), report);
            }
        }
    }
    let uis: Vec<UiSummary> = by_ui.values().map(|r| UiSummary::from(*r)).collect();

    let average_compliance = if uis.is_empty() {
        100.0
    } else {
        round2(uis.iter().map(|u| u.compliance_score).sum::<f64>() / uis.len() as f64)
    };
    let worst_performer = uis
        .iter()
        .min_by(|a, b| a.compliance_score.total_cmp(&b.compliance_score))
        .map(|u| u.ui_name.clone());
    let deprecated_features: BTreeSet<String> = uis
        .iter()
        .flat_map(|u| u.deprecated_features.iter().cloned())
        .collect();

    Heatmap {
        total_uis: uis.len(),
        average_compliance,
        low_compliance_threshold,
        low_compliance_uis: uis
            .iter()
            .filter(|u| u.compliance_score < low_compliance_threshold)
            .count(),
        high_risk_uis: uis.iter().filter(|u| !u.high_risk_features.is_empty()).count(),
        worst_performer,
        deprecated_features: deprecated_features.into_iter().collect(),
        uis,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::tests::report;

    #[test]
    fn test_average_of_latest_scores() {
        let reports = vec![
            report("checkout", 87.5),
            report("search", 72.3),
            report("account", 94.2),
            report("admin", 81.7),
        ];
        let map = heatmap(&reports, 70.0);
        assert_eq!(map.total_uis, 4);
        assert!((map.average_compliance - 83.9).abs() < 0.05);
        assert_eq!(map.low_compliance_uis, 0);
        assert_eq!(map.worst_performer.as_deref(), Some("search"));
        let names: Vec<&str> = map.uis.iter().map(|u| u.ui_name.as_str()).collect();
        assert_eq!(names, vec!["account", "admin", "checkout", "search"]);
    }

    #[test]
    fn test_empty_heatmap() {
        let map = heatmap(&[], 70.0);
        assert_eq!(map.total_uis, 0);
        assert_eq!(map.average_compliance, 100.0);
        assert!(map.worst_performer.is_none());
    }

    #[test]
    fn test_low_compliance_and_high_risk_counts() {
        let mut risky = report("legacy", 55.0);
        risky.high_risk_features = vec!["[popover]".into()];
        risky.deprecated_features = vec!["document.write".into()];
        let mut also_deprecated = report("blog", 90.0);
        also_deprecated.deprecated_features = vec!["AppCache".into(), "document.write".into()];

        let map = heatmap(&[risky, also_deprecated, report("edge", 70.0)], 70.0);
        assert_eq!(map.low_compliance_uis, 1);
        assert_eq!(map.high_risk_uis, 1);
        assert_eq!(map.deprecated_features, vec!["AppCache", "document.write"]);
    }

    #[test]
    fn test_later_report_for_same_ui_wins() {
        let old = report("docs", 40.0);
        let mut new = report("docs", 90.0);
        new.scanned_at = old.scanned_at + chrono::Duration::seconds(5);
        let map = heatmap(&[new, old], 70.0);
        assert_eq!(map.total_uis, 1);
        assert_eq!(map.average_compliance, 90.0);
    }
}
