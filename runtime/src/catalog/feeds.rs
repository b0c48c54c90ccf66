//! Upstream compatibility feeds and catalog construction.
//!
//! Two feeds make up a catalog:
//!
//! - **Support tables**: MDN browser-compat-data (`css.properties`,
//!   `css.selectors`, `css.at-rules`, `api`, `html.elements`,
//!   `html.global_attributes`), giving each feature a minimum version per
//!   browser.
//! - **Market share**: the caniuse `agents` table, giving usage share per
//!   browser version.
//!
//! A feature's global support is the summed share of every browser version at
//! or above its minimum supported version. Building is all-or-nothing: a
//! feed that cannot be fetched or parsed fails the whole build.

use super::curated::CURATED_FEATURES;
use super::{round2, BaselineStatus, BrowserVersion, CatalogSnapshot, FeatureKind, FeatureRecord, CORE_ENGINES};
use crate::acquisition::http_client::HttpClient;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// BCD browser id → caniuse agent id.
const BROWSER_AGENTS: &[(&str, &str)] = &[
    ("chrome", "chrome"),
    ("chrome_android", "and_chr"),
    ("edge", "edge"),
    ("firefox", "firefox"),
    ("firefox_android", "and_ff"),
    ("safari", "safari"),
    ("safari_ios", "ios_saf"),
    ("opera", "opera"),
    ("opera_android", "op_mob"),
    ("samsunginternet_android", "samsung"),
    ("webview_android", "android"),
];

/// Pseudo-classes that take an argument list, reported as `:name()`.
const FUNCTIONAL_SELECTORS: &[&str] = &[
    "has",
    "is",
    "where",
    "not",
    "nth-child",
    "nth-last-child",
    "nth-of-type",
    "nth-last-of-type",
    "dir",
    "lang",
    "host",
    "host-context",
    "state",
];

#[derive(Debug, Clone, Copy)]
enum IdStyle {
    Plain,
    Selector,
    AtRule,
    Element,
    Attribute,
}

/// BCD subtrees ingested wholesale, one record per direct child.
const SUPPORT_TREES: &[(&str, FeatureKind, IdStyle)] = &[
    ("css.properties", FeatureKind::Css, IdStyle::Plain),
    ("css.selectors", FeatureKind::Css, IdStyle::Selector),
    ("css.at-rules", FeatureKind::Css, IdStyle::AtRule),
    ("api", FeatureKind::Script, IdStyle::Plain),
    ("html.elements", FeatureKind::Html, IdStyle::Element),
    ("html.global_attributes", FeatureKind::Html, IdStyle::Attribute),
];

fn feature_id(key: &str, style: IdStyle) -> String {
    match style {
        IdStyle::Plain => key.to_string(),
        IdStyle::Selector if FUNCTIONAL_SELECTORS.contains(&key) => format!(":{key}()"),
        IdStyle::Selector => format!(":{key}"),
        IdStyle::AtRule => format!("@{key}"),
        IdStyle::Element => format!("<{key}>"),
        IdStyle::Attribute => format!("[{key}]"),
    }
}

/// A source of raw upstream feed documents.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the per-feature support tables (BCD shape).
    async fn fetch_support(&self) -> Result<Value>;
    /// Fetch the browser-version usage table (caniuse shape).
    async fn fetch_market_share(&self) -> Result<Value>;
}

/// Feed source pulling both documents over HTTP.
pub struct HttpFeedSource {
    client: HttpClient,
    support_url: String,
    market_share_url: String,
}

const FEED_TIMEOUT: Duration = Duration::from_secs(60);

impl HttpFeedSource {
    pub fn new(support_url: impl Into<String>, market_share_url: impl Into<String>) -> Self {
        Self {
            client: HttpClient::new(FEED_TIMEOUT),
            support_url: support_url.into(),
            market_share_url: market_share_url.into(),
        }
    }

    async fn fetch_json(&self, url: &str) -> Result<Value> {
        self.client
            .get_json(url, FEED_TIMEOUT)
            .await
            .with_context(|| format!("failed to fetch feed {url}"))
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_support(&self) -> Result<Value> {
        self.fetch_json(&self.support_url).await
    }

    async fn fetch_market_share(&self) -> Result<Value> {
        self.fetch_json(&self.market_share_url).await
    }
}

/// Usage share per browser version, keyed by caniuse agent id.
#[derive(Debug, Clone, Default)]
pub struct MarketShare {
    agents: BTreeMap<String, Vec<(BrowserVersion, f64)>>,
}

impl MarketShare {
    /// Parse the `agents.<id>.usage_global` table of a caniuse document.
    pub fn from_caniuse(doc: &Value) -> Result<Self> {
        let agents = doc
            .get("agents")
            .and_then(Value::as_object)
            .context("market share feed has no `agents` table")?;

        let mut parsed = BTreeMap::new();
        for (agent, info) in agents {
            let Some(usage) = info.get("usage_global").and_then(Value::as_object) else {
                continue;
            };
            let versions: Vec<(BrowserVersion, f64)> = usage
                .iter()
                .filter_map(|(version, share)| {
                    Some((BrowserVersion::parse(version)?, share.as_f64()?))
                })
                .collect();
            parsed.insert(agent.clone(), versions);
        }

        if parsed.is_empty() {
            bail!("market share feed has no usable usage data");
        }
        Ok(Self { agents: parsed })
    }

    /// Build directly from (agent, version, share) triples.
    pub fn from_entries(entries: &[(&str, &str, f64)]) -> Self {
        let mut agents: BTreeMap<String, Vec<(BrowserVersion, f64)>> = BTreeMap::new();
        for (agent, version, share) in entries {
            if let Some(v) = BrowserVersion::parse(version) {
                agents.entry(agent.to_string()).or_default().push((v, *share));
            }
        }
        Self { agents }
    }

    /// Share of users whose browser version is at or above the minimum
    /// version recorded for its engine.
    pub fn weighted_support(&self, browsers: &BTreeMap<String, String>) -> f64 {
        let mut total = 0.0;
        for (bcd_browser, agent) in BROWSER_AGENTS {
            let Some(min) = browsers.get(*bcd_browser).and_then(|v| BrowserVersion::parse(v)) else {
                continue;
            };
            if let Some(versions) = self.agents.get(*agent) {
                total += versions
                    .iter()
                    .filter(|(v, _)| *v >= min)
                    .map(|(_, share)| share)
                    .sum::<f64>();
            }
        }
        round2(total.clamp(0.0, 100.0))
    }
}

/// Support facts lifted from one BCD `__compat` block.
struct CompatFacts {
    browsers: BTreeMap<String, String>,
    deprecated: bool,
    mdn_url: Option<String>,
}

fn compat_facts(node: &Value) -> Option<CompatFacts> {
    let compat = node.get("__compat")?;
    let support = compat.get("support").and_then(Value::as_object)?;

    let mut browsers = BTreeMap::new();
    for (browser, statement) in support {
        if let Some(version) = supported_since(statement) {
            browsers.insert(browser.clone(), version);
        }
    }

    Some(CompatFacts {
        browsers,
        deprecated: compat
            .pointer("/status/deprecated")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        mdn_url: compat
            .get("mdn_url")
            .and_then(Value::as_str)
            .map(String::from),
    })
}

/// Minimum unflagged, unprefixed version from a support statement (object
/// or array of objects). Removed features count as unsupported.
fn supported_since(statement: &Value) -> Option<String> {
    let candidates: Vec<&Value> = match statement {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    candidates.into_iter().find_map(|s| {
        let s = s.as_object()?;
        if s.contains_key("flags")
            || s.contains_key("prefix")
            || s.contains_key("alternative_name")
            || s.contains_key("version_removed")
        {
            return None;
        }
        match s.get("version_added")? {
            Value::String(v) if v != "preview" => Some(v.clone()),
            Value::Bool(true) => Some("1".to_string()),
            _ => None,
        }
    })
}

fn lookup_path<'a>(doc: &'a Value, dotted: &str) -> Option<&'a Value> {
    dotted.split('.').try_fold(doc, |node, key| node.get(key))
}

fn record_from_facts(
    id: String,
    label: String,
    kind: FeatureKind,
    facts: CompatFacts,
    share: &MarketShare,
) -> FeatureRecord {
    let global_support = share.weighted_support(&facts.browsers);
    let all_core = CORE_ENGINES.iter().all(|e| facts.browsers.contains_key(*e));
    let status = BaselineStatus::classify(global_support, !facts.browsers.is_empty(), all_core);

    FeatureRecord {
        id,
        label,
        kind,
        browsers: facts.browsers,
        global_support,
        status,
        deprecated: facts.deprecated,
        alternatives: Vec::new(),
        mdn_url: facts.mdn_url,
        pattern: None,
    }
}

/// Build a complete catalog snapshot from both feed documents.
pub fn build_catalog(
    support_doc: &Value,
    share: &MarketShare,
    version: u64,
    fetched_at: DateTime<Utc>,
) -> Result<CatalogSnapshot> {
    let mut records: BTreeMap<String, FeatureRecord> = BTreeMap::new();
    let mut trees_found = 0;

    for (path, kind, style) in SUPPORT_TREES {
        let Some(tree) = lookup_path(support_doc, path).and_then(Value::as_object) else {
            continue;
        };
        trees_found += 1;
        for (key, node) in tree {
            if key.starts_with("__") {
                continue;
            }
            let Some(facts) = compat_facts(node) else {
                continue;
            };
            let id = feature_id(key, *style);
            records.insert(id.clone(), record_from_facts(id.clone(), id, *kind, facts, share));
        }
    }

    if trees_found == 0 {
        bail!("support feed contains none of the expected BCD trees");
    }

    for curated in CURATED_FEATURES {
        let Some(facts) = lookup_path(support_doc, curated.bcd_path).and_then(compat_facts) else {
            tracing::debug!("curated feature {} has no BCD data at {}", curated.id, curated.bcd_path);
            continue;
        };
        let mut record = record_from_facts(
            curated.id.to_string(),
            curated.label.to_string(),
            curated.kind,
            facts,
            share,
        );
        record.deprecated |= curated.deprecated;
        record.alternatives = curated.alternatives.iter().map(|a| a.to_string()).collect();
        record.pattern = Some(curated.pattern.to_string());
        records.insert(record.id.clone(), record);
    }

    Ok(CatalogSnapshot::new(version, fetched_at, records.into_values()))
}
