//! Compatibility Data Store: the feature → browser-support catalog.
//!
//! The catalog is an immutable, versioned [`CatalogSnapshot`]. The
//! [`store::DataStore`] owns the current snapshot and swaps it wholesale on
//! refresh; everyone else only ever reads through an `Arc` to one snapshot.

pub mod curated;
pub mod feeds;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Which surface a feature lives on, and therefore which content it is
/// detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum FeatureKind {
    Css,
    Script,
    Html,
}

impl FeatureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Script => "script",
            Self::Html => "html",
        }
    }
}

/// Maturity of a feature's cross-browser availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum BaselineStatus {
    WidelyAvailable,
    NewlyAvailable,
    Limited,
    Unknown,
}

impl BaselineStatus {
    /// Classify from global support and whether every core engine ships it.
    pub fn classify(global_support: f64, has_engine_data: bool, all_core_engines: bool) -> Self {
        if !has_engine_data {
            Self::Unknown
        } else if !all_core_engines || global_support < 85.0 {
            Self::Limited
        } else if global_support < 95.0 {
            Self::NewlyAvailable
        } else {
            Self::WidelyAvailable
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WidelyAvailable => "widely_available",
            Self::NewlyAvailable => "newly_available",
            Self::Limited => "limited",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BaselineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Browser engines whose support decides whether a feature can be baseline.
pub const CORE_ENGINES: &[&str] = &["chrome", "edge", "firefox", "safari"];

/// Support facts for one feature.
///
/// Records are replaced whole on every refresh, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Stable key, e.g. `backdrop-filter`, `:has()`, `ResizeObserver`, `<dialog>`.
    pub id: String,
    pub label: String,
    pub kind: FeatureKind,
    /// Browser engine → minimum supporting version.
    pub browsers: BTreeMap<String, String>,
    /// Market-share weighted support, 0–100.
    pub global_support: f64,
    pub status: BaselineStatus,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub mdn_url: Option<String>,
    /// Hand-written detection regex; derived from `id` and `kind` when absent.
    #[serde(default)]
    pub pattern: Option<String>,
}

impl FeatureRecord {
    /// Minimal record, mostly for fixtures and pre-extracted catalogs.
    pub fn new(
        id: impl Into<String>,
        kind: FeatureKind,
        global_support: f64,
        status: BaselineStatus,
    ) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            kind,
            browsers: BTreeMap::new(),
            global_support: global_support.clamp(0.0, 100.0),
            status,
            deprecated: false,
            alternatives: Vec::new(),
            mdn_url: None,
            pattern: None,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = deprecated;
        self
    }

    pub fn with_alternatives(mut self, alternatives: &[&str]) -> Self {
        self.alternatives = alternatives.iter().map(|a| a.to_string()).collect();
        self
    }
}

/// One immutable, versioned view of the whole catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub version: u64,
    pub fetched_at: DateTime<Utc>,
    features: BTreeMap<String, FeatureRecord>,
}

impl CatalogSnapshot {
    pub fn new(
        version: u64,
        fetched_at: DateTime<Utc>,
        records: impl IntoIterator<Item = FeatureRecord>,
    ) -> Self {
        let features = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            version,
            fetched_at,
            features,
        }
    }

    pub fn get(&self, id: &str) -> Option<&FeatureRecord> {
        self.features.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.features.contains_key(id)
    }

    /// Records in identifier order.
    pub fn records(&self) -> impl Iterator<Item = &FeatureRecord> {
        self.features.values()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Whether the snapshot is older than `ttl` at `now`.
    pub fn is_expired(&self, ttl: std::time::Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.fetched_at) > ttl,
            Err(_) => false,
        }
    }
}

/// Dotted numeric browser version (`"15.4"`, `"≤79"`, `"16.2-16.3"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserVersion(Vec<u32>);

impl BrowserVersion {
    /// Parse the leading numeric version. Ranges keep their lower bound;
    /// `≤` prefixes are dropped. `TP`, `preview` and `all` do not parse.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_start_matches('≤').trim_start_matches("<=");
        let first = trimmed.split('-').next()?.trim();
        let parts: Option<Vec<u32>> = first.split('.').map(|p| p.parse::<u32>().ok()).collect();
        match parts {
            Some(parts) if !parts.is_empty() => Some(Self(parts)),
            _ => None,
        }
    }
}

impl PartialOrd for BrowserVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BrowserVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

/// Round to two decimals, the precision every reported percentage uses.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
