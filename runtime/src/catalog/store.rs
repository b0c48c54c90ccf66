//! The Data Store: owns the current catalog snapshot.
//!
//! ## Snapshot swap
//!
//! The current snapshot is an `Arc<CatalogSnapshot>` behind a lock that is
//! only held long enough to clone or replace the `Arc`. Readers keep their
//! clone for the whole operation, so a refresh landing mid-scan never mixes
//! two catalog versions.
//!
//! ## Freshness
//!
//! Reads never wait on the network. When the snapshot is older than the TTL,
//! the read returns it flagged stale and kicks off one background refresh.
//! A failed refresh keeps the previous snapshot and leaves the stale flag set
//! until a refresh succeeds.

use super::feeds::{build_catalog, FeedSource, MarketShare};
use super::{CatalogSnapshot, FeatureRecord};
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use anyhow::Context;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Minimum spacing between background refresh attempts.
const BACKGROUND_RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// One consistent catalog view handed to a reader.
#[derive(Debug, Clone)]
pub struct CatalogView {
    pub snapshot: Arc<CatalogSnapshot>,
    /// Older than the TTL, or the last refresh attempt failed.
    pub stale: bool,
}

/// A single feature lookup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Lookup {
    pub record: FeatureRecord,
    pub stale: bool,
    pub catalog_version: u64,
}

/// What a refresh attempt did.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Refreshed { version: u64, features: usize },
    /// Feeds failed; the previous snapshot (if any) keeps serving.
    Failed {
        reason: String,
        serving_version: Option<u64>,
    },
    /// Another refresh was already running.
    InProgress,
}

/// Point-in-time store status for health output.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStatus {
    pub version: Option<u64>,
    pub features: usize,
    pub fetched_at: Option<chrono::DateTime<Utc>>,
    pub stale: bool,
    pub refreshing: bool,
}

/// The compatibility Data Store. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DataStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    current: RwLock<Option<Arc<CatalogSnapshot>>>,
    source: Arc<dyn FeedSource>,
    ttl: Duration,
    snapshot_path: Option<PathBuf>,
    last_refresh_failed: AtomicBool,
    refreshing: AtomicBool,
    last_attempt: Mutex<Option<Instant>>,
    events: EventBus,
}

impl DataStore {
    /// Create a store, loading the persisted snapshot at `snapshot_path` if
    /// one exists so lookups work before the first refresh completes.
    pub fn new(
        source: Arc<dyn FeedSource>,
        ttl: Duration,
        snapshot_path: Option<PathBuf>,
        events: EventBus,
    ) -> Self {
        let initial = snapshot_path.as_deref().and_then(|path| match load_snapshot(path) {
            Ok(snapshot) => {
                info!(
                    "loaded catalog snapshot v{} ({} features) from {}",
                    snapshot.version,
                    snapshot.len(),
                    path.display()
                );
                Some(Arc::new(snapshot))
            }
            Err(e) => {
                debug!("no usable catalog snapshot at {}: {e:#}", path.display());
                None
            }
        });

        Self {
            inner: Arc::new(StoreInner {
                current: RwLock::new(initial),
                source,
                ttl,
                snapshot_path,
                last_refresh_failed: AtomicBool::new(false),
                refreshing: AtomicBool::new(false),
                last_attempt: Mutex::new(None),
                events,
            }),
        }
    }

    /// Install a snapshot directly (seed data, pre-extracted catalogs).
    pub fn install(&self, snapshot: CatalogSnapshot) {
        self.inner.swap(Arc::new(snapshot));
        self.inner.last_refresh_failed.store(false, Ordering::SeqCst);
    }

    /// Re-fetch both feeds and atomically replace the snapshot.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.inner.refresh().await
    }

    /// The current snapshot. Fails only when no snapshot has ever been
    /// loaded or fetched.
    pub fn view(&self) -> EngineResult<CatalogView> {
        let snapshot = self.inner.current().ok_or_else(|| {
            EngineError::InvariantViolation(
                "no catalog snapshot: refresh has never succeeded and none is cached".into(),
            )
        })?;

        let expired = snapshot.is_expired(self.inner.ttl, Utc::now());
        if expired {
            self.spawn_background_refresh();
        }

        Ok(CatalogView {
            stale: expired || self.inner.last_refresh_failed.load(Ordering::SeqCst),
            snapshot,
        })
    }

    /// Look up one feature.
    pub fn lookup(&self, feature_id: &str) -> EngineResult<Lookup> {
        let view = self.view()?;
        let record = view
            .snapshot
            .get(feature_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("feature '{feature_id}'")))?;
        Ok(Lookup {
            record,
            stale: view.stale,
            catalog_version: view.snapshot.version,
        })
    }

    /// Global support percentage of one feature.
    pub fn support_percentage(&self, feature_id: &str) -> EngineResult<f64> {
        self.lookup(feature_id).map(|l| l.record.global_support)
    }

    /// Whether readers are currently being served stale data.
    pub fn is_stale(&self) -> bool {
        match self.inner.current() {
            Some(snapshot) => {
                snapshot.is_expired(self.inner.ttl, Utc::now())
                    || self.inner.last_refresh_failed.load(Ordering::SeqCst)
            }
            None => true,
        }
    }

    pub fn status(&self) -> StoreStatus {
        let current = self.inner.current();
        StoreStatus {
            version: current.as_ref().map(|s| s.version),
            features: current.as_ref().map(|s| s.len()).unwrap_or(0),
            fetched_at: current.as_ref().map(|s| s.fetched_at),
            stale: self.is_stale(),
            refreshing: self.inner.refreshing.load(Ordering::SeqCst),
        }
    }

    fn spawn_background_refresh(&self) {
        if self.inner.refreshing.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(last) = self.inner.last_attempt.lock() {
            if last.is_some_and(|at| at.elapsed() < BACKGROUND_RETRY_INTERVAL) {
                return;
            }
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("catalog expired but no runtime is available for a background refresh");
            return;
        };
        let inner = Arc::clone(&self.inner);
        handle.spawn(async move {
            let outcome = inner.refresh().await;
            debug!("background catalog refresh: {outcome:?}");
        });
    }
}

impl StoreInner {
    fn current(&self) -> Option<Arc<CatalogSnapshot>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn swap(&self, snapshot: Arc<CatalogSnapshot>) {
        match self.current.write() {
            Ok(mut guard) => *guard = Some(snapshot),
            Err(poisoned) => *poisoned.into_inner() = Some(snapshot),
        }
    }

    async fn refresh(&self) -> RefreshOutcome {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return RefreshOutcome::InProgress;
        }

        let start = Instant::now();
        if let Ok(mut last) = self.last_attempt.lock() {
            *last = Some(start);
        }
        let next_version = self.current().map(|s| s.version + 1).unwrap_or(1);
        let result = self.fetch_snapshot(next_version).await;

        let outcome = match result {
            Ok(snapshot) => {
                let features = snapshot.len();
                let snapshot = Arc::new(snapshot);
                if let Some(path) = &self.snapshot_path {
                    if let Err(e) = save_snapshot(path, &snapshot) {
                        warn!("failed to persist catalog snapshot: {e:#}");
                    }
                }
                self.swap(snapshot);
                self.last_refresh_failed.store(false, Ordering::SeqCst);

                let elapsed_ms = start.elapsed().as_millis() as u64;
                info!("catalog refreshed: v{next_version}, {features} features in {elapsed_ms}ms");
                self.events.emit(EngineEvent::CatalogRefreshed {
                    version: next_version,
                    features,
                    elapsed_ms,
                });
                RefreshOutcome::Refreshed {
                    version: next_version,
                    features,
                }
            }
            Err(e) => {
                self.last_refresh_failed.store(true, Ordering::SeqCst);
                let serving_version = self.current().map(|s| s.version);
                let reason = format!("{e:#}");
                warn!("catalog refresh failed, serving v{serving_version:?}: {reason}");
                self.events.emit(EngineEvent::CatalogStale {
                    reason: reason.clone(),
                    serving_version,
                });
                RefreshOutcome::Failed {
                    reason,
                    serving_version,
                }
            }
        };

        self.refreshing.store(false, Ordering::SeqCst);
        outcome
    }

    async fn fetch_snapshot(&self, version: u64) -> anyhow::Result<CatalogSnapshot> {
        let (support, share) = futures::try_join!(
            self.source.fetch_support(),
            self.source.fetch_market_share()
        )?;
        let share = MarketShare::from_caniuse(&share)?;
        let fetched_at = Utc::now();
        tokio::task::spawn_blocking(move || build_catalog(&support, &share, version, fetched_at))
            .await
            .context("catalog build task panicked")?
    }
}

fn load_snapshot(path: &Path) -> anyhow::Result<CatalogSnapshot> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read catalog snapshot: {}", path.display()))?;
    serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse catalog snapshot: {}", path.display()))
}

/// Write to a sibling temp file, then rename over the target.
fn save_snapshot(path: &Path, snapshot: &CatalogSnapshot) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create data dir: {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec(snapshot)?;
    std::fs::write(&tmp, data)
        .with_context(|| format!("failed to write catalog snapshot: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move catalog snapshot into {}", path.display()))?;
    Ok(())
}
