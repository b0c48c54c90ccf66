//! Feature usage detection.
//!
//! Maps raw page content onto catalog feature identifiers. Content is split
//! into three kinds, each with its own strategy: stylesheet text is matched
//! against CSS features, script text against script features, markup against
//! HTML features. A feature used many times on a page yields one record, at
//! its first location.

pub mod patterns;
pub mod source;

use crate::catalog::{CatalogSnapshot, FeatureKind};
use crate::crawler::{ContentBlock, CrawlResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Which strategy found a usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Html,
    Css,
    Script,
}

/// Longest snippet kept from the matching line, in characters.
pub const SNIPPET_MAX_CHARS: usize = 100;

/// Position of the first match. Lines and columns are 1-based; `block` is
/// the index into the page's CSS or script blocks (0 for markup).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub block: usize,
    pub line: usize,
    pub column: usize,
    /// The matching line, trimmed and cut to [`SNIPPET_MAX_CHARS`].
    #[serde(default)]
    pub snippet: String,
}

/// One feature used on one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub feature_id: String,
    pub page_url: String,
    pub method: DetectionMethod,
    pub location: Option<Location>,
}

/// Content of one kind from one page.
#[derive(Debug, Clone, Copy)]
pub enum Content<'a> {
    Markup(&'a str),
    Stylesheets(&'a [ContentBlock]),
    Scripts(&'a [ContentBlock]),
}

impl Content<'_> {
    fn kind(&self) -> FeatureKind {
        match self {
            Content::Markup(_) => FeatureKind::Html,
            Content::Stylesheets(_) => FeatureKind::Css,
            Content::Scripts(_) => FeatureKind::Script,
        }
    }

    fn method(&self) -> DetectionMethod {
        match self {
            Content::Markup(_) => DetectionMethod::Html,
            Content::Stylesheets(_) => DetectionMethod::Css,
            Content::Scripts(_) => DetectionMethod::Script,
        }
    }

    /// First match of `re`, scanning blocks in order.
    fn first_match(&self, re: &Regex) -> Option<Location> {
        match self {
            Content::Markup(html) => locate(re, html, 0),
            Content::Stylesheets(blocks) | Content::Scripts(blocks) => blocks
                .iter()
                .enumerate()
                .find_map(|(i, block)| locate(re, &block.text, i)),
        }
    }
}

fn locate(re: &Regex, text: &str, block: usize) -> Option<Location> {
    let m = re.find(text)?;
    // Patterns may consume one leading delimiter; report the feature itself
    let start = text[m.start()..m.end()]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace() && !matches!(c, ';' | '{' | ',' | '('))
        .map(|(i, _)| m.start() + i)
        .unwrap_or(m.start());
    let before = &text[..start];
    let line = before.matches('\n').count() + 1;
    let column = before.rfind('\n').map(|nl| start - nl).unwrap_or(start + 1);
    let line_start = before.rfind('\n').map_or(0, |nl| nl + 1);
    let line_end = text[start..].find('\n').map_or(text.len(), |nl| start + nl);
    Some(Location {
        block,
        line,
        column,
        snippet: snippet(&text[line_start..line_end]),
    })
}

fn snippet(line: &str) -> String {
    line.trim().chars().take(SNIPPET_MAX_CHARS).collect()
}

/// Compiled patterns for one catalog snapshot, grouped by kind.
pub struct PatternSet {
    css: Vec<(String, Regex)>,
    script: Vec<(String, Regex)>,
    html: Vec<(String, Regex)>,
}

impl PatternSet {
    pub fn compile(snapshot: &CatalogSnapshot) -> Self {
        let mut set = Self {
            css: Vec::new(),
            script: Vec::new(),
            html: Vec::new(),
        };
        for record in snapshot.records() {
            let Some(re) = patterns::compile(record) else {
                continue;
            };
            let entry = (record.id.clone(), re);
            match record.kind {
                FeatureKind::Css => set.css.push(entry),
                FeatureKind::Script => set.script.push(entry),
                FeatureKind::Html => set.html.push(entry),
            }
        }
        set
    }

    fn for_kind(&self, kind: FeatureKind) -> &[(String, Regex)] {
        match kind {
            FeatureKind::Css => &self.css,
            FeatureKind::Script => &self.script,
            FeatureKind::Html => &self.html,
        }
    }

    pub fn len(&self) -> usize {
        self.css.len() + self.script.len() + self.html.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All usages on one page, one per feature, ordered by identifier.
    pub fn detect(&self, page: &CrawlResult) -> Vec<UsageRecord> {
        let contents = [
            Content::Markup(&page.html),
            Content::Stylesheets(&page.css),
            Content::Scripts(&page.scripts),
        ];
        let mut found: BTreeMap<&str, UsageRecord> = BTreeMap::new();
        for content in contents {
            for (id, re) in self.for_kind(content.kind()) {
                if found.contains_key(id.as_str()) {
                    continue;
                }
                if let Some(location) = content.first_match(re) {
                    found.insert(
                        id.as_str(),
                        UsageRecord {
                            feature_id: id.clone(),
                            page_url: page.url.clone(),
                            method: content.method(),
                            location: Some(location),
                        },
                    );
                }
            }
        }
        found.into_values().collect()
    }
}

/// Detect feature usage on one page against `snapshot`.
///
/// Compiles patterns on every call; use [`Detector`] for repeated scans.
pub fn detect(page: &CrawlResult, snapshot: &CatalogSnapshot) -> Vec<UsageRecord> {
    PatternSet::compile(snapshot).detect(page)
}

/// Detector that keeps the compiled patterns of the last snapshot it saw.
#[derive(Default)]
pub struct Detector {
    cached: Mutex<Option<(Arc<CatalogSnapshot>, Arc<PatternSet>)>>,
}

impl Detector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patterns for `snapshot`, compiled at most once per snapshot.
    pub fn patterns(&self, snapshot: &Arc<CatalogSnapshot>) -> Arc<PatternSet> {
        if let Ok(cached) = self.cached.lock() {
            if let Some((snap, set)) = cached.as_ref() {
                if Arc::ptr_eq(snap, snapshot) {
                    return Arc::clone(set);
                }
            }
        }
        let set = Arc::new(PatternSet::compile(snapshot));
        tracing::debug!(
            catalog_version = snapshot.version,
            patterns = set.len(),
            "compiled detection patterns"
        );
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some((Arc::clone(snapshot), Arc::clone(&set)));
        }
        set
    }

    /// Usages across all pages, in page order.
    pub fn detect_all(
        &self,
        pages: &[CrawlResult],
        snapshot: &Arc<CatalogSnapshot>,
    ) -> Vec<UsageRecord> {
        let set = self.patterns(snapshot);
        pages.iter().flat_map(|page| set.detect(page)).collect()
    }
}
