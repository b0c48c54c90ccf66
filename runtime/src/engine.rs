//! The engine facade: the operations the CLI and REST layer call.
//!
//! A scan runs crawl (or source loading) → detection → scoring →
//! aggregation against a single catalog snapshot taken when the scan starts.
//! A scan that is cancelled or runs past its deadline persists nothing.

use crate::catalog::feeds::HttpFeedSource;
use crate::catalog::store::{DataStore, Lookup, RefreshOutcome, StoreStatus};
use crate::catalog::FeatureRecord;
use crate::compliance::heatmap::Heatmap;
use crate::compliance::history::{HistoryStore, SqliteHistory};
use crate::compliance::{Aggregator, ScanContext, ScanReport};
use crate::config::{CrawlOptions, EngineConfig};
use crate::crawler::fetch::{default_fetcher, PageFetcher};
use crate::crawler::{CrawlOutcome, CrawlResult, Crawler};
use crate::detect::{source, Detector};
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::risk::{RiskAssessment, RiskPolicy, RiskScorer};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// Where a scan's content comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanSource {
    /// Crawl a live site from a seed URL.
    Live {
        url: String,
        #[serde(skip)]
        options: Option<CrawlOptions>,
    },
    /// Load a source tree (or single file) from disk.
    Static { path: PathBuf },
    /// Content already extracted by another tool.
    Extracted {
        label: String,
        pages: Vec<CrawlResult>,
    },
}

/// One scan request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanTarget {
    pub ui_name: String,
    pub source: ScanSource,
}

impl ScanTarget {
    pub fn live(ui_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            ui_name: ui_name.into(),
            source: ScanSource::Live {
                url: url.into(),
                options: None,
            },
        }
    }

    pub fn static_path(ui_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            ui_name: ui_name.into(),
            source: ScanSource::Static { path: path.into() },
        }
    }

    pub fn extracted(
        ui_name: impl Into<String>,
        label: impl Into<String>,
        pages: Vec<CrawlResult>,
    ) -> Self {
        Self {
            ui_name: ui_name.into(),
            source: ScanSource::Extracted {
                label: label.into(),
                pages,
            },
        }
    }

    /// Override the engine's crawl options for a live scan.
    pub fn with_crawl_options(mut self, crawl: CrawlOptions) -> Self {
        if let ScanSource::Live { options, .. } = &mut self.source {
            *options = Some(crawl);
        }
        self
    }

    /// Human-readable description of what is scanned.
    pub fn describe(&self) -> String {
        match &self.source {
            ScanSource::Live { url, .. } => url.clone(),
            ScanSource::Static { path } => path.display().to_string(),
            ScanSource::Extracted { label, .. } => label.clone(),
        }
    }
}

/// The compatibility intelligence engine.
pub struct Engine {
    config: EngineConfig,
    store: DataStore,
    scorer: RiskScorer,
    aggregator: Aggregator,
    detector: Detector,
    fetcher: OnceCell<Arc<dyn PageFetcher>>,
    events: EventBus,
}

impl Engine {
    /// Assemble an engine from its parts.
    pub fn new(
        config: EngineConfig,
        store: DataStore,
        history: Arc<dyn HistoryStore>,
        events: EventBus,
    ) -> Self {
        let policy = RiskPolicy::default();
        Self {
            scorer: RiskScorer::new(store.clone(), policy),
            aggregator: Aggregator::new(history, policy, config.low_compliance_threshold),
            detector: Detector::new(),
            fetcher: OnceCell::new(),
            config,
            store,
            events,
        }
    }

    /// Open the engine with durable storage under the configured data
    /// directory and the upstream feeds from the configuration.
    pub fn open(config: EngineConfig) -> anyhow::Result<Self> {
        let events = EventBus::default();
        let source = Arc::new(HttpFeedSource::new(
            config.support_feed_url.clone(),
            config.market_share_feed_url.clone(),
        ));
        let store = DataStore::new(
            source,
            config.cache_ttl,
            Some(config.snapshot_path()),
            events.clone(),
        );
        let history = SqliteHistory::open(&config.history_path())
            .with_context(|| format!("failed to open history at {}", config.history_path().display()))?;
        Ok(Self::new(config, store, Arc::new(history), events))
    }

    /// Use `fetcher` for crawling instead of probing for a browser.
    ///
    /// The first fetcher installed wins; later calls are ignored.
    pub fn with_fetcher(self, fetcher: Arc<dyn PageFetcher>) -> Self {
        if self.fetcher.set(fetcher).is_err() {
            tracing::debug!("page fetcher already installed; keeping the first one");
        }
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    async fn fetcher(&self) -> Arc<dyn PageFetcher> {
        let timeout = self.config.crawl.page_timeout;
        Arc::clone(
            self.fetcher
                .get_or_init(|| async move { default_fetcher(timeout).await })
                .await,
        )
    }

    // ── Catalog ───────────────────────────

    pub async fn refresh(&self) -> RefreshOutcome {
        self.store.refresh().await
    }

    pub fn catalog_status(&self) -> StoreStatus {
        self.store.status()
    }

    pub fn lookup(&self, feature_id: &str) -> EngineResult<Lookup> {
        self.store.lookup(feature_id)
    }

    /// Every catalog record, in identifier order.
    pub fn features(&self) -> EngineResult<Vec<FeatureRecord>> {
        let view = self.store.view()?;
        Ok(view.snapshot.records().cloned().collect())
    }

    // ── Risk ──────────────────────────────

    /// Risk of one feature. Unknown identifiers are `NotFound`.
    pub fn risk(&self, feature_id: &str) -> EngineResult<RiskAssessment> {
        self.scorer.score(feature_id)
    }

    /// Risk of several features; unknown identifiers score maximum risk.
    pub fn risk_batch(&self, feature_ids: &[String]) -> EngineResult<Vec<RiskAssessment>> {
        feature_ids
            .iter()
            .map(|id| self.scorer.score_or_max(id))
            .collect()
    }

    // ── Crawl & scan ──────────────────────

    /// Crawl a site without scanning it.
    pub async fn crawl(
        &self,
        seed: &str,
        options: Option<CrawlOptions>,
        cancel: &CancellationToken,
    ) -> EngineResult<CrawlOutcome> {
        let options = options.unwrap_or_else(|| self.config.crawl.clone());
        Crawler::new(self.fetcher().await, options)
            .crawl(seed, cancel)
            .await
    }

    /// Scan a target end to end and record the report.
    pub async fn scan(&self, target: ScanTarget, cancel: &CancellationToken) -> EngineResult<ScanReport> {
        let started = Instant::now();
        let ui_name = target.ui_name.trim().to_string();
        if ui_name.is_empty() {
            return Err(EngineError::InvalidInput("UI name must not be empty".into()));
        }
        let description = target.describe();

        // One snapshot for the whole scan
        let view = self.store.view()?;

        tracing::info!(ui = %ui_name, target = %description, "scan started");
        self.events.emit(EngineEvent::ScanStarted {
            ui_name: ui_name.clone(),
            target: description.clone(),
        });

        let scan_cancel = cancel.child_token();
        let pages = tokio::time::timeout(
            self.config.scan_timeout,
            self.collect_pages(&ui_name, target.source, &scan_cancel),
        )
        .await;
        let pages = match pages {
            Ok(Ok(pages)) if !cancel.is_cancelled() => pages,
            Ok(Ok(_)) => return Err(self.abort(&ui_name, EngineError::Cancelled)),
            Ok(Err(e)) => return Err(self.abort(&ui_name, e)),
            Err(_) => {
                scan_cancel.cancel();
                let ms = self.config.scan_timeout.as_millis() as u64;
                return Err(self.abort(&ui_name, EngineError::Timeout(ms)));
            }
        };

        let usages = self.detector.detect_all(&pages, &view.snapshot);
        let ctx = ScanContext {
            ui_name: &ui_name,
            target: &description,
            pages_scanned: pages.len(),
        };
        let report = self.aggregator.aggregate(&ctx, usages, &view)?;

        self.events.emit(EngineEvent::ScanCompleted {
            ui_name,
            report_id: report.id.clone(),
            compliance_score: report.compliance_score,
            features: report.total_features,
            high_risk: report.high_risk_features.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        Ok(report)
    }

    async fn collect_pages(
        &self,
        ui_name: &str,
        source: ScanSource,
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<CrawlResult>> {
        match source {
            ScanSource::Live { url, options } => {
                let options = options.unwrap_or_else(|| self.config.crawl.clone());
                let outcome = Crawler::new(self.fetcher().await, options)
                    .with_progress(self.events.clone(), ui_name)
                    .crawl(&url, cancel)
                    .await?;
                Ok(outcome.results)
            }
            ScanSource::Static { path } => tokio::task::spawn_blocking(move || source::load_source_tree(&path))
                .await
                .map_err(|e| EngineError::InvariantViolation(format!("source loader failed: {e}")))?,
            ScanSource::Extracted { pages, .. } => Ok(pages),
        }
    }

    fn abort(&self, ui_name: &str, error: EngineError) -> EngineError {
        tracing::warn!(ui = %ui_name, "scan aborted: {error}");
        self.events.emit(EngineEvent::ScanAborted {
            ui_name: ui_name.to_string(),
            reason: error.to_string(),
        });
        error
    }

    // ── Compliance ────────────────────────

    pub fn heatmap(&self) -> EngineResult<Heatmap> {
        self.aggregator.heatmap()
    }

    pub fn history(&self, ui_name: &str, limit: Option<usize>) -> EngineResult<Vec<ScanReport>> {
        self.aggregator.history(ui_name, limit)
    }

    pub fn report(&self, report_id: &str) -> EngineResult<ScanReport> {
        self.aggregator.report(report_id)
    }
}
