//! Risk scoring.
//!
//! A feature's risk level is a function of how far its global support falls
//! short of 100% and of its baseline status:
//!
//! ```text
//! risk = clamp(0, 10, scale * (gap / 100) ^ exponent + adjustment(status))
//! ```
//!
//! The curve rises steeply for the first few missing points of support and
//! flattens as the gap grows. The constants live in [`RiskPolicy`]; category
//! thresholds are fixed.

pub mod markets;

use crate::catalog::store::DataStore;
use crate::catalog::{round2, BaselineStatus, FeatureRecord};
use crate::error::{EngineError, EngineResult};
use chrono::Datelike;
use markets::{affected_markets, MarketImpact, TOP_MARKETS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Levels below this are `low`.
pub const LOW_RISK_BELOW: f64 = 3.0;
/// Levels at or above this are `high`.
pub const HIGH_RISK_FROM: f64 = 6.0;
pub const MAX_RISK: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    pub fn from_level(level: f64) -> Self {
        if level >= HIGH_RISK_FROM {
            Self::High
        } else if level >= LOW_RISK_BELOW {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunable constants of the risk curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    pub scale: f64,
    pub exponent: f64,
    pub widely_available: f64,
    pub newly_available: f64,
    pub limited: f64,
    pub unknown: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            scale: 10.0,
            exponent: 0.5,
            widely_available: -1.5,
            newly_available: 0.0,
            limited: 1.5,
            unknown: 0.5,
        }
    }
}

impl RiskPolicy {
    fn adjustment(&self, status: BaselineStatus) -> f64 {
        match status {
            BaselineStatus::WidelyAvailable => self.widely_available,
            BaselineStatus::NewlyAvailable => self.newly_available,
            BaselineStatus::Limited => self.limited,
            BaselineStatus::Unknown => self.unknown,
        }
    }

    /// Risk level for a support percentage and status, rounded to hundredths.
    pub fn level(&self, global_support: f64, status: BaselineStatus) -> f64 {
        let gap = (100.0 - global_support.clamp(0.0, 100.0)) / 100.0;
        let raw = self.scale * gap.powf(self.exponent) + self.adjustment(status);
        round2(raw.clamp(0.0, MAX_RISK))
    }
}

/// Risk of one feature, computed fresh for every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub feature_id: String,
    pub risk_level: f64,
    pub category: RiskCategory,
    pub global_support: f64,
    pub status: BaselineStatus,
    pub deprecated: bool,
    pub recommendation: String,
    pub alternatives: Vec<String>,
    /// Year from which the feature is, or is expected to be, safe to ship.
    #[serde(default)]
    pub safe_year: Option<i32>,
    /// Markets losing the most users to missing support, worst first.
    #[serde(default)]
    pub affected_markets: Vec<MarketImpact>,
    /// Catalog data behind this assessment was past its TTL or a refresh failed.
    pub stale: bool,
}

impl RiskAssessment {
    /// Score a catalog record.
    pub fn assess(record: &FeatureRecord, policy: &RiskPolicy, stale: bool) -> Self {
        Self::assess_in(record, policy, stale, chrono::Utc::now().year())
    }

    /// Score a catalog record as of `current_year`.
    pub fn assess_in(
        record: &FeatureRecord,
        policy: &RiskPolicy,
        stale: bool,
        current_year: i32,
    ) -> Self {
        let risk_level = policy.level(record.global_support, record.status);
        let category = RiskCategory::from_level(risk_level);
        Self {
            feature_id: record.id.clone(),
            risk_level,
            category,
            global_support: record.global_support,
            status: record.status,
            deprecated: record.deprecated,
            recommendation: recommendation(record, category),
            alternatives: record.alternatives.clone(),
            safe_year: Some(safe_year(record.global_support, current_year)),
            affected_markets: affected_markets(record, TOP_MARKETS),
            stale,
        }
    }

    /// Maximum-risk assessment for a feature the catalog does not know.
    pub fn unknown_feature(feature_id: &str, stale: bool) -> Self {
        Self {
            feature_id: feature_id.to_string(),
            risk_level: MAX_RISK,
            category: RiskCategory::High,
            global_support: 0.0,
            status: BaselineStatus::Unknown,
            deprecated: false,
            recommendation: "No compatibility data for this feature; treat it as unsupported \
                             until verified."
                .into(),
            alternatives: Vec::new(),
            safe_year: None,
            affected_markets: Vec::new(),
            stale,
        }
    }
}

/// Year a feature with `global_support` became or becomes safe: two years
/// back at 95% and above, this year from 85%, otherwise two years out.
pub fn safe_year(global_support: f64, current_year: i32) -> i32 {
    if global_support >= 95.0 {
        current_year - 2
    } else if global_support >= 85.0 {
        current_year
    } else {
        current_year + 2
    }
}

fn recommendation(record: &FeatureRecord, category: RiskCategory) -> String {
    let mut text = match category {
        RiskCategory::Low => format!(
            "{} is safe to use ({:.1}% global support).",
            record.label, record.global_support
        ),
        RiskCategory::Medium => format!(
            "Use {} with a fallback or behind @supports/feature detection ({:.1}% global support).",
            record.label, record.global_support
        ),
        RiskCategory::High => format!(
            "Avoid {} in critical paths or ship a polyfill ({:.1}% global support).",
            record.label, record.global_support
        ),
    };
    if record.deprecated {
        text.push_str(" Deprecated: plan a migration.");
    }
    if category != RiskCategory::Low && !record.alternatives.is_empty() {
        text.push_str(&format!(" Consider: {}.", record.alternatives.join(", ")));
    }
    text
}

/// Scores features against the live catalog.
#[derive(Clone)]
pub struct RiskScorer {
    store: DataStore,
    policy: RiskPolicy,
}

impl RiskScorer {
    pub fn new(store: DataStore, policy: RiskPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    /// Score one feature. Unknown identifiers are `NotFound`.
    pub fn score(&self, feature_id: &str) -> EngineResult<RiskAssessment> {
        let lookup = self.store.lookup(feature_id)?;
        Ok(RiskAssessment::assess(&lookup.record, &self.policy, lookup.stale))
    }

    /// Score one feature, treating unknown identifiers as maximum risk.
    pub fn score_or_max(&self, feature_id: &str) -> EngineResult<RiskAssessment> {
        match self.score(feature_id) {
            Err(EngineError::NotFound(_)) => Ok(RiskAssessment::unknown_feature(
                feature_id,
                self.store.is_stale(),
            )),
            other => other,
        }
    }
}
