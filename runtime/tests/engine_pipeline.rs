//! End-to-end scans through the engine facade: live crawls, source trees,
//! cancellation, deadlines and the compliance history they leave behind.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use featurescope_runtime::catalog::feeds::FeedSource;
use featurescope_runtime::catalog::store::DataStore;
use featurescope_runtime::catalog::{BaselineStatus, CatalogSnapshot, FeatureKind, FeatureRecord};
use featurescope_runtime::compliance::history::{HistoryStore, MemoryHistory, SqliteHistory};
use featurescope_runtime::crawler::fetch::{HttpFetcher, MemoryFetcher};
use featurescope_runtime::crawler::{ContentBlock, CrawlResult};
use featurescope_runtime::events::{EngineEvent, EventBus};
use featurescope_runtime::{Engine, EngineConfig, EngineError, ScanTarget};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Fixtures ──

struct OfflineFeeds;

#[async_trait]
impl FeedSource for OfflineFeeds {
    async fn fetch_support(&self) -> Result<Value> {
        Err(anyhow!("upstream unreachable"))
    }
    async fn fetch_market_share(&self) -> Result<Value> {
        Err(anyhow!("upstream unreachable"))
    }
}

fn catalog(hours_old: i64) -> CatalogSnapshot {
    CatalogSnapshot::new(
        7,
        Utc::now() - chrono::Duration::hours(hours_old),
        vec![
            FeatureRecord::new(":has()", FeatureKind::Css, 87.3, BaselineStatus::NewlyAvailable),
            FeatureRecord::new("<dialog>", FeatureKind::Html, 94.0, BaselineStatus::NewlyAvailable),
            FeatureRecord::new("flex", FeatureKind::Css, 99.2, BaselineStatus::WidelyAvailable),
            FeatureRecord::new("document.execCommand", FeatureKind::Script, 97.0, BaselineStatus::Limited)
                .with_deprecated(true)
                .with_alternatives(&["Clipboard API"]),
        ],
    )
}

fn engine_with(config: EngineConfig, history: Arc<dyn HistoryStore>, snapshot: Option<CatalogSnapshot>) -> Engine {
    let events = EventBus::default();
    let store = DataStore::new(Arc::new(OfflineFeeds), config.cache_ttl, None, events.clone());
    if let Some(snapshot) = snapshot {
        store.install(snapshot);
    }
    Engine::new(config, store, history, events)
}

fn engine() -> Engine {
    engine_with(EngineConfig::default(), Arc::new(MemoryHistory::new()), Some(catalog(0)))
}

fn shop() -> MemoryFetcher {
    MemoryFetcher::new()
        .page(
            "https://shop.test/",
            r#"<html><head><link rel="stylesheet" href="/app.css"></head>
               <body><a href="/cart">Cart</a><a href="https://cdn.other.test/x">x</a></body></html>"#,
        )
        .page(
            "https://shop.test/cart",
            r#"<html><body><dialog open>Checkout</dialog></body></html>"#,
        )
        .asset("https://shop.test/app.css", ".card:has(img) { flex: 1; }")
}

// ── Scans ──

#[tokio::test]
async fn test_live_scan_crawls_same_origin_and_scores() {
    let fetcher = Arc::new(shop());
    let engine = engine().with_fetcher(fetcher.clone());

    let report = engine
        .scan(ScanTarget::live("storefront", "https://shop.test/"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.pages_scanned, 2);
    assert_eq!(fetcher.hits("https://cdn.other.test/x"), 0);
    let features: Vec<&str> = report.features().keys().copied().collect();
    assert_eq!(features, vec![":has()", "<dialog>", "flex"]);
    assert_eq!(report.total_features, 3);
    assert_eq!(report.baseline_compliant, 1);
    assert!(report.high_risk_features.is_empty());
    assert_eq!(report.catalog_version, 7);
    assert!(!report.catalog_stale);

    // 100 - 3.56*1.5 - 2.45*0.1 - 0.0*0.1
    assert!((report.compliance_score - 94.415).abs() < 0.02, "{}", report.compliance_score);
}

#[tokio::test]
async fn test_first_installed_fetcher_wins() {
    let first = Arc::new(shop());
    let second = Arc::new(MemoryFetcher::new());
    let engine = engine().with_fetcher(first.clone()).with_fetcher(second.clone());

    let outcome = engine
        .crawl("https://shop.test/", None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(first.hits("https://shop.test/"), 1);
    assert_eq!(second.total_hits(), 0);
}

#[tokio::test]
async fn test_static_scan_reads_source_tree() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::create_dir_all(dir.path().join("node_modules/lib")).unwrap();
    std::fs::write(dir.path().join("src/app.css"), ".a:has(.b) {}").unwrap();
    std::fs::write(
        dir.path().join("src/copy.js"),
        "button.onclick = () => document.execCommand('copy');",
    )
    .unwrap();
    std::fs::write(dir.path().join("node_modules/lib/x.html"), "<dialog></dialog>").unwrap();

    let engine = engine();
    let report = engine
        .scan(ScanTarget::static_path("admin", dir.path()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.pages_scanned, 2);
    assert_eq!(report.total_features, 2);
    assert_eq!(report.deprecated_features, vec!["document.execCommand".to_string()]);
    assert!(!report.features().contains_key("<dialog>"));
}

#[tokio::test]
async fn test_extracted_scan_dedups_per_page() {
    let page = |url: &str| CrawlResult {
        url: url.to_string(),
        css: vec![
            ContentBlock::inline(".a:has(b) {}"),
            ContentBlock::inline(".c:has(d) {}"),
        ],
        ..CrawlResult::default()
    };
    let engine = engine();
    let report = engine
        .scan(
            ScanTarget::extracted("docs", "fixture", vec![page("/a"), page("/b")]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    // One finding per (feature, page); scored once per feature
    assert_eq!(report.findings.len(), 2);
    assert_eq!(report.total_features, 1);
    assert!((report.compliance_score - 94.66).abs() < 1e-9);
}

#[tokio::test]
async fn test_unknown_catalog_is_invariant_violation() {
    let engine = engine_with(EngineConfig::default(), Arc::new(MemoryHistory::new()), None);
    let result = engine
        .scan(ScanTarget::extracted("x", "fixture", vec![]), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(EngineError::InvariantViolation(_))));
}

#[tokio::test]
async fn test_empty_ui_name_is_rejected() {
    let result = engine()
        .scan(ScanTarget::extracted("  ", "fixture", vec![]), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(EngineError::InvalidInput(_))));
}

#[tokio::test]
async fn test_live_scan_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"<style>.x:has(y){}</style><a href="/gone">gone</a>"#, "text/html"),
        )
        .mount(&server)
        .await;

    let engine = engine().with_fetcher(Arc::new(HttpFetcher::new(Duration::from_secs(5))));
    let report = engine
        .scan(
            ScanTarget::live("marketing", format!("{}/", server.uri())),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    // The 404 link is a page failure, not a scan failure
    assert_eq!(report.pages_scanned, 1);
    assert_eq!(report.total_features, 1);
}

// ── Cancellation & deadlines ──

#[tokio::test]
async fn test_cancelled_scan_persists_nothing() {
    let fetcher = shop().delay("https://shop.test/", Duration::from_millis(300));
    let engine = engine().with_fetcher(Arc::new(fetcher));
    let mut events = engine.events().subscribe();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = engine
        .scan(ScanTarget::live("storefront", "https://shop.test/"), &cancel)
        .await;
    assert!(matches!(result, Err(EngineError::Cancelled)), "{result:?}");
    assert!(engine.history("storefront", None).unwrap().is_empty());
    assert_eq!(engine.heatmap().unwrap().total_uis, 0);

    let mut aborted = false;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, EngineEvent::ScanCompleted { .. }));
        aborted |= matches!(event, EngineEvent::ScanAborted { .. });
    }
    assert!(aborted);
}

#[tokio::test]
async fn test_scan_deadline_times_out() {
    let mut config = EngineConfig::default();
    config.scan_timeout = Duration::from_millis(100);
    let engine = engine_with(config, Arc::new(MemoryHistory::new()), Some(catalog(0)))
        .with_fetcher(Arc::new(shop().delay("https://shop.test/", Duration::from_secs(2))));

    let result = engine
        .scan(ScanTarget::live("storefront", "https://shop.test/"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(EngineError::Timeout(100))), "{result:?}");
    assert!(engine.history("storefront", None).unwrap().is_empty());
}

// ── Catalog staleness ──

#[tokio::test]
async fn test_expired_catalog_marks_report_stale() {
    let mut config = EngineConfig::default();
    config.cache_ttl = Duration::from_secs(3600);
    let engine = engine_with(config, Arc::new(MemoryHistory::new()), Some(catalog(2)));

    let report = engine
        .scan(
            ScanTarget::extracted(
                "docs",
                "fixture",
                vec![CrawlResult {
                    html: "<dialog></dialog>".into(),
                    ..CrawlResult::default()
                }],
            ),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(report.catalog_stale);
    assert!(report.findings.iter().all(|f| f.risk.stale));

    // Feeds are down: the old snapshot keeps serving
    let lookup = engine.lookup("<dialog>").unwrap();
    assert!(lookup.stale);
    assert_eq!(lookup.catalog_version, 7);
}

// ── History & heatmap ──

#[tokio::test]
async fn test_history_and_heatmap_across_uis() {
    let dir = TempDir::new().unwrap();
    let history = Arc::new(SqliteHistory::open(&dir.path().join("history.db")).unwrap());
    let engine = engine_with(EngineConfig::default(), history, Some(catalog(0)));
    let cancel = CancellationToken::new();

    let css = |text: &str| {
        vec![CrawlResult {
            url: "/".into(),
            css: vec![ContentBlock::inline(text)],
            ..CrawlResult::default()
        }]
    };

    let first = engine
        .scan(ScanTarget::extracted("checkout", "v1", css(".a:has(b) {}")), &cancel)
        .await
        .unwrap();
    let second = engine
        .scan(ScanTarget::extracted("checkout", "v2", css(".a { flex: 1 }")), &cancel)
        .await
        .unwrap();
    engine
        .scan(ScanTarget::extracted("search", "v1", css(".a:has(b) {}")), &cancel)
        .await
        .unwrap();

    let scans = engine.history("checkout", None).unwrap();
    let ids: Vec<&str> = scans.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
    let latest = engine.history("checkout", Some(1)).unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, second.id);
    assert!(engine.history("nobody", None).unwrap().is_empty());

    let heatmap = engine.heatmap().unwrap();
    assert_eq!(heatmap.total_uis, 2);
    // Latest checkout scan only uses flex
    let checkout = heatmap.uis.iter().find(|u| u.ui_name == "checkout").unwrap();
    assert!(checkout.compliance_score > 99.0);

    assert_eq!(engine.report(&first.id).unwrap(), first);
    assert!(matches!(engine.report("missing"), Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_risk_batch_scores_unknown_at_max() {
    let engine = engine();
    let risks = engine
        .risk_batch(&[":has()".to_string(), "not-a-feature".to_string()])
        .unwrap();
    assert!((risks[0].risk_level - 3.56).abs() < 1e-9);
    assert_eq!(risks[1].risk_level, 10.0);
    assert!(matches!(engine.risk("not-a-feature"), Err(EngineError::NotFound(_))));
}
