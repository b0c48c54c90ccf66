//! Compliance aggregation: per-UI reports, the cross-UI heatmap and history.
//!
//! A UI's compliance score starts at 100 and loses `risk × weight` for every
//! distinct feature it uses, with the weight set by the feature's risk
//! category. Repeated use of a feature, on one page or many, costs nothing
//! extra.

pub mod gate;
pub mod heatmap;
pub mod history;

use crate::catalog::store::CatalogView;
use crate::catalog::{round2, BaselineStatus};
use crate::detect::UsageRecord;
use crate::error::EngineResult;
use crate::risk::{RiskAssessment, RiskCategory, RiskPolicy};
use chrono::{DateTime, Utc};
use heatmap::Heatmap;
use history::HistoryStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// Penalty weight per risk category.
pub fn category_weight(category: RiskCategory) -> f64 {
    match category {
        RiskCategory::Low => 0.1,
        RiskCategory::Medium => 1.5,
        RiskCategory::High => 3.0,
    }
}

/// One detected usage with the risk of its feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub usage: UsageRecord,
    pub risk: RiskAssessment,
}

/// Immutable result of scanning one UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub id: String,
    pub ui_name: String,
    /// Seed URL or source path that was scanned.
    pub target: String,
    pub scanned_at: DateTime<Utc>,
    pub pages_scanned: usize,
    /// One entry per (feature, page), in detection order.
    pub findings: Vec<Finding>,
    /// 0–100, rounded to hundredths.
    pub compliance_score: f64,
    pub high_risk_features: Vec<String>,
    pub deprecated_features: Vec<String>,
    pub total_features: usize,
    /// Distinct features that are `widely_available`.
    pub baseline_compliant: usize,
    pub catalog_version: u64,
    pub catalog_stale: bool,
}

impl ScanReport {
    /// Distinct features with the assessment of their first finding.
    pub fn features(&self) -> BTreeMap<&str, &RiskAssessment> {
        let mut features = BTreeMap::new();
        for finding in &self.findings {
            features
                .entry(finding.usage.feature_id.as_str())
                .or_insert(&finding.risk);
        }
        features
    }
}

/// Inputs of one report besides the usages themselves.
#[derive(Debug, Clone)]
pub struct ScanContext<'a> {
    pub ui_name: &'a str,
    pub target: &'a str,
    pub pages_scanned: usize,
}

/// Build a report from usages against one catalog view. Pure: nothing is
/// persisted.
pub fn build_report(
    ctx: &ScanContext<'_>,
    usages: impl IntoIterator<Item = UsageRecord>,
    view: &CatalogView,
    policy: &RiskPolicy,
) -> ScanReport {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut assessed: BTreeMap<String, RiskAssessment> = BTreeMap::new();
    let mut findings = Vec::new();

    for usage in usages {
        if !seen.insert((usage.feature_id.clone(), usage.page_url.clone())) {
            continue;
        }
        let risk = assessed
            .entry(usage.feature_id.clone())
            .or_insert_with(|| match view.snapshot.get(&usage.feature_id) {
                Some(record) => RiskAssessment::assess(record, policy, view.stale),
                None => RiskAssessment::unknown_feature(&usage.feature_id, view.stale),
            })
            .clone();
        findings.push(Finding { usage, risk });
    }

    let penalty: f64 = assessed
        .values()
        .map(|a| a.risk_level * category_weight(a.category))
        .sum();
    let compliance_score = round2((100.0 - penalty).clamp(0.0, 100.0));

    let high_risk_features: Vec<String> = assessed
        .values()
        .filter(|a| a.category == RiskCategory::High)
        .map(|a| a.feature_id.clone())
        .collect();
    let deprecated_features: BTreeSet<String> = assessed
        .values()
        .filter(|a| a.deprecated)
        .map(|a| a.feature_id.clone())
        .collect();
    let baseline_compliant = assessed
        .values()
        .filter(|a| a.status == BaselineStatus::WidelyAvailable)
        .count();

    ScanReport {
        id: uuid::Uuid::new_v4().to_string(),
        ui_name: ctx.ui_name.to_string(),
        target: ctx.target.to_string(),
        scanned_at: Utc::now(),
        pages_scanned: ctx.pages_scanned,
        findings,
        compliance_score,
        high_risk_features,
        deprecated_features: deprecated_features.into_iter().collect(),
        total_features: assessed.len(),
        baseline_compliant,
        catalog_version: view.snapshot.version,
        catalog_stale: view.stale,
    }
}

/// Turns usages into persisted reports and reads the history back.
#[derive(Clone)]
pub struct Aggregator {
    history: Arc<dyn HistoryStore>,
    policy: RiskPolicy,
    low_compliance_threshold: f64,
}

impl Aggregator {
    pub fn new(history: Arc<dyn HistoryStore>, policy: RiskPolicy, low_compliance_threshold: f64) -> Self {
        Self {
            history,
            policy,
            low_compliance_threshold,
        }
    }

    /// Build a report and append it to the UI's history.
    pub fn aggregate(
        &self,
        ctx: &ScanContext<'_>,
        usages: impl IntoIterator<Item = UsageRecord>,
        view: &CatalogView,
    ) -> EngineResult<ScanReport> {
        let report = build_report(ctx, usages, view, &self.policy);
        self.history.append(&report)?;
        tracing::info!(
            ui = %report.ui_name,
            report_id = %report.id,
            compliance = report.compliance_score,
            features = report.total_features,
            high_risk = report.high_risk_features.len(),
            "scan report recorded"
        );
        Ok(report)
    }

    /// Heatmap over the latest report of every UI.
    pub fn heatmap(&self) -> EngineResult<Heatmap> {
        let latest = self.history.latest_per_ui()?;
        Ok(heatmap::heatmap(&latest, self.low_compliance_threshold))
    }

    pub fn history(&self, ui_name: &str, limit: Option<usize>) -> EngineResult<Vec<ScanReport>> {
        self.history.history(ui_name, limit)
    }

    pub fn report(&self, report_id: &str) -> EngineResult<ScanReport> {
        self.history.get(report_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::{CatalogSnapshot, FeatureKind, FeatureRecord};
    use crate::detect::DetectionMethod;
    use history::MemoryHistory;

    /// Minimal report for history and heatmap tests.
    pub(crate) fn report(ui_name: &str, score: f64) -> ScanReport {
        ScanReport {
            id: uuid::Uuid::new_v4().to_string(),
            ui_name: ui_name.to_string(),
            target: format!("https://{ui_name}.test/"),
            scanned_at: Utc::now(),
            pages_scanned: 1,
            findings: Vec::new(),
            compliance_score: score,
            high_risk_features: Vec::new(),
            deprecated_features: Vec::new(),
            total_features: 0,
            baseline_compliant: 0,
            catalog_version: 1,
            catalog_stale: false,
        }
    }

    fn view() -> CatalogView {
        let snapshot = CatalogSnapshot::new(
            7,
            Utc::now(),
            vec![
                FeatureRecord::new(":has()", FeatureKind::Css, 87.3, BaselineStatus::NewlyAvailable),
                FeatureRecord::new("flexbox-gap", FeatureKind::Css, 100.0, BaselineStatus::WidelyAvailable),
                FeatureRecord::new("[popover]", FeatureKind::Html, 70.0, BaselineStatus::Limited),
                FeatureRecord::new("document.write", FeatureKind::Script, 99.0, BaselineStatus::WidelyAvailable)
                    .with_deprecated(true),
            ],
        );
        CatalogView {
            snapshot: Arc::new(snapshot),
            stale: false,
        }
    }

    fn usage(feature: &str, page: &str) -> UsageRecord {
        UsageRecord {
            feature_id: feature.to_string(),
            page_url: page.to_string(),
            method: DetectionMethod::Css,
            location: None,
        }
    }

    fn ctx() -> ScanContext<'static> {
        ScanContext {
            ui_name: "storefront",
            target: "https://shop.test/",
            pages_scanned: 2,
        }
    }

    #[test]
    fn test_no_usages_is_fully_compliant() {
        let r = build_report(&ctx(), Vec::new(), &view(), &RiskPolicy::default());
        assert_eq!(r.compliance_score, 100.0);
        assert_eq!(r.total_features, 0);
        assert_eq!(r.catalog_version, 7);
    }

    #[test]
    fn test_has_selector_moderate_penalty() {
        let r = build_report(&ctx(), vec![usage(":has()", "/")], &view(), &RiskPolicy::default());
        // 3.56 * 1.5
        assert_eq!(r.compliance_score, 94.66);
        assert!(r.high_risk_features.is_empty());
        assert_eq!(r.findings[0].risk.category, RiskCategory::Medium);
    }

    #[test]
    fn test_duplicate_usage_does_not_change_score() {
        let policy = RiskPolicy::default();
        let once = build_report(&ctx(), vec![usage(":has()", "/"), usage("[popover]", "/")], &view(), &policy);
        let twice = build_report(
            &ctx(),
            vec![
                usage(":has()", "/"),
                usage("[popover]", "/"),
                usage(":has()", "/"),
                usage(":has()", "/checkout"),
            ],
            &view(),
            &policy,
        );
        assert_eq!(once.compliance_score, twice.compliance_score);
        assert_eq!(twice.total_features, 2);
        // Same feature on another page is a separate finding
        assert_eq!(twice.findings.len(), 3);
    }

    #[test]
    fn test_high_risk_deprecated_and_baseline_counts() {
        let r = build_report(
            &ctx(),
            vec![
                usage("[popover]", "/"),
                usage("document.write", "/"),
                usage("flexbox-gap", "/"),
                usage("::made-up", "/"),
            ],
            &view(),
            &RiskPolicy::default(),
        );
        assert_eq!(r.high_risk_features, vec!["::made-up", "[popover]"]);
        assert_eq!(r.deprecated_features, vec!["document.write"]);
        assert_eq!(r.baseline_compliant, 2);
        assert_eq!(r.total_features, 4);
        assert!(r.compliance_score < 100.0);
        assert!(r.compliance_score >= 0.0);
        assert_eq!(r.features().len(), 4);
    }

    #[test]
    fn test_score_clamped_at_zero() {
        let usages: Vec<UsageRecord> = (0..10).map(|i| usage(&format!("::unknown-{i}"), "/")).collect();
        let r = build_report(&ctx(), usages, &view(), &RiskPolicy::default());
        assert_eq!(r.compliance_score, 0.0);
    }

    #[test]
    fn test_reaggregation_appends_in_order() {
        let aggregator = Aggregator::new(Arc::new(MemoryHistory::new()), RiskPolicy::default(), 70.0);
        let first = aggregator.aggregate(&ctx(), vec![usage(":has()", "/")], &view()).unwrap();
        let second = aggregator.aggregate(&ctx(), Vec::new(), &view()).unwrap();
        let history = aggregator.history("storefront", None).unwrap();
        assert_eq!(history, vec![first, second.clone()]);
        assert_eq!(aggregator.report(&second.id).unwrap(), second);
    }

    #[test]
    fn test_stale_view_marks_report() {
        let mut v = view();
        v.stale = true;
        let r = build_report(&ctx(), vec![usage(":has()", "/")], &v, &RiskPolicy::default());
        assert!(r.catalog_stale);
        assert!(r.findings[0].risk.stale);
    }
}
