// Copyright 2026 Featurescope Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API for the engine.
//!
//! A thin axum router over [`Engine`]: every endpoint maps onto one engine
//! operation and serializes its result. Engine errors map onto status codes
//! with a `{"error": {"code", "message"}}` body.

use crate::catalog::{BaselineStatus, FeatureKind};
use crate::compliance::gate::check_compliance;
use crate::config::CrawlOptions;
use crate::crawler::CrawlResult;
use crate::engine::{Engine, ScanTarget};
use crate::error::EngineError;
use crate::events;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

type AppState = Arc<Engine>;

/// Build the axum Router with all REST endpoints.
pub fn router(engine: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/events", get(events_sse))
        .route("/api/v1/refresh", post(handle_refresh))
        .route("/api/v1/features", get(handle_features))
        .route("/api/v1/features/:id", get(handle_feature))
        .route("/api/v1/risk/batch", post(handle_risk_batch))
        .route("/api/v1/risk/:id", get(handle_risk))
        .route("/api/v1/crawl", post(handle_crawl))
        .route("/api/v1/scan", post(handle_scan))
        .route("/api/v1/heatmap", get(handle_heatmap))
        .route("/api/v1/history/:ui", get(handle_history))
        .route("/api/v1/reports/:id", get(handle_report))
        .layer(cors)
        .with_state(engine)
}

/// Start the REST API server on `addr`. Shut down by dropping the returned
/// future.
pub async fn start(addr: std::net::SocketAddr, engine: AppState) -> anyhow::Result<()> {
    let app = router(engine);
    tracing::info!("REST API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Errors ──────────────────────────────────────────────────────

/// Engine error rendered as an HTTP response.
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "E_NOT_FOUND"),
            EngineError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "E_INVALID_PARAMS"),
            EngineError::FetchFailure { .. } => (StatusCode::BAD_GATEWAY, "E_FETCH_FAILED"),
            EngineError::Cancelled => (StatusCode::CONFLICT, "E_CANCELLED"),
            EngineError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "E_TIMEOUT"),
            EngineError::InvariantViolation(_) => (StatusCode::SERVICE_UNAVAILABLE, "E_NO_CATALOG"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "E_INTERNAL"),
        };
        let body = serde_json::json!({
            "error": { "code": code, "message": self.0.to_string() }
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

fn to_json<T: serde::Serialize>(value: &T) -> ApiResult {
    serde_json::to_value(value)
        .map(Json)
        .map_err(|e| ApiError(EngineError::from(e)))
}

// ── Handlers ────────────────────────────────────────────────────

async fn health(State(engine): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "catalog": engine.catalog_status(),
    }))
}

/// SSE query parameters.
#[derive(Deserialize, Default)]
struct EventsParams {
    ui: Option<String>,
}

/// Server-Sent Events endpoint for real-time engine events.
///
/// Optionally filters scan events by UI via `?ui=checkout`.
async fn events_sse(
    Query(params): Query<EventsParams>,
    State(engine): State<AppState>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = engine.events().subscribe();
    let ui_filter = params.ui;

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(ref ui) = ui_filter {
                        if !events::event_matches_ui(&event, ui) {
                            continue;
                        }
                    }
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default())
}

async fn handle_refresh(State(engine): State<AppState>) -> ApiResult {
    let outcome = engine.refresh().await;
    to_json(&outcome)
}

#[derive(Deserialize, Default)]
struct FeatureFilter {
    kind: Option<FeatureKind>,
    status: Option<BaselineStatus>,
    search: Option<String>,
}

async fn handle_features(
    State(engine): State<AppState>,
    Query(filter): Query<FeatureFilter>,
) -> ApiResult {
    let needle = filter.search.map(|s| s.to_lowercase());
    let features: Vec<_> = engine
        .features()?
        .into_iter()
        .filter(|f| filter.kind.map_or(true, |k| f.kind == k))
        .filter(|f| filter.status.map_or(true, |s| f.status == s))
        .filter(|f| {
            needle
                .as_deref()
                .map_or(true, |n| f.id.to_lowercase().contains(n))
        })
        .collect();
    Ok(Json(serde_json::json!({
        "total": features.len(),
        "features": features,
    })))
}

async fn handle_feature(State(engine): State<AppState>, Path(id): Path<String>) -> ApiResult {
    to_json(&engine.lookup(&id)?)
}

async fn handle_risk(State(engine): State<AppState>, Path(id): Path<String>) -> ApiResult {
    to_json(&engine.risk(&id)?)
}

#[derive(Deserialize)]
struct RiskBatchBody {
    features: Vec<String>,
}

async fn handle_risk_batch(
    State(engine): State<AppState>,
    Json(body): Json<RiskBatchBody>,
) -> ApiResult {
    let assessments = engine.risk_batch(&body.features)?;
    Ok(Json(serde_json::json!({ "features": assessments })))
}

/// Crawl limits a request may override.
#[derive(Deserialize, Default)]
struct CrawlLimits {
    max_depth: Option<u32>,
    max_pages: Option<usize>,
}

impl CrawlLimits {
    fn apply(&self, base: &CrawlOptions) -> CrawlOptions {
        let mut options = base.clone();
        if let Some(d) = self.max_depth {
            options.max_depth = d;
        }
        if let Some(p) = self.max_pages {
            options.max_pages = p.max(1);
        }
        options
    }
}

#[derive(Deserialize)]
struct CrawlBody {
    url: String,
    #[serde(flatten)]
    limits: CrawlLimits,
}

async fn handle_crawl(State(engine): State<AppState>, Json(body): Json<CrawlBody>) -> ApiResult {
    let options = body.limits.apply(&engine.config().crawl);
    let cancel = CancellationToken::new();
    let outcome = engine.crawl(&body.url, Some(options), &cancel).await?;
    let pages: Vec<Value> = outcome
        .results
        .iter()
        .map(|p| {
            serde_json::json!({
                "url": p.url,
                "depth": p.depth,
                "css_blocks": p.css.len(),
                "script_blocks": p.scripts.len(),
                "links": p.links,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({
        "termination": outcome.termination,
        "pages": pages,
        "failures": outcome.failures,
    })))
}

/// Exactly one of `url`, `path` or `pages` selects the scan source.
#[derive(Deserialize)]
struct ScanBody {
    ui_name: String,
    url: Option<String>,
    path: Option<String>,
    pages: Option<Vec<CrawlResult>>,
    #[serde(flatten)]
    limits: CrawlLimits,
    min_compliance: Option<f64>,
    #[serde(default)]
    fail_on_deprecated: bool,
}

async fn handle_scan(State(engine): State<AppState>, Json(body): Json<ScanBody>) -> ApiResult {
    let target = match (body.url, body.path, body.pages) {
        (Some(url), None, None) => ScanTarget::live(&body.ui_name, url)
            .with_crawl_options(body.limits.apply(&engine.config().crawl)),
        (None, Some(path), None) => ScanTarget::static_path(&body.ui_name, path),
        (None, None, Some(pages)) => ScanTarget::extracted(&body.ui_name, "extracted", pages),
        _ => {
            return Err(ApiError(EngineError::InvalidInput(
                "provide exactly one of url, path or pages".into(),
            )))
        }
    };

    // Dropping the request drops the scan; nothing is persisted
    let cancel = CancellationToken::new();
    let report = engine.scan(target, &cancel).await?;
    let gate = body.min_compliance.map(|min| check_compliance(&report, min, body.fail_on_deprecated));
    Ok(Json(serde_json::json!({
        "report": report,
        "gate": gate,
    })))
}

async fn handle_heatmap(State(engine): State<AppState>) -> ApiResult {
    to_json(&engine.heatmap()?)
}

#[derive(Deserialize, Default)]
struct HistoryParams {
    limit: Option<usize>,
}

async fn handle_history(
    State(engine): State<AppState>,
    Path(ui): Path<String>,
    Query(params): Query<HistoryParams>,
) -> ApiResult {
    let scans = engine.history(&ui, params.limit)?;
    Ok(Json(serde_json::json!({
        "ui_name": ui,
        "scans": scans,
    })))
}

async fn handle_report(State(engine): State<AppState>, Path(id): Path<String>) -> ApiResult {
    to_json(&engine.report(&id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::feeds::FeedSource;
    use crate::catalog::store::DataStore;
    use crate::catalog::{CatalogSnapshot, FeatureRecord};
    use crate::compliance::history::MemoryHistory;
    use crate::config::EngineConfig;
    use crate::crawler::ContentBlock;
    use crate::events::EventBus;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct OfflineFeeds;

    #[async_trait::async_trait]
    impl FeedSource for OfflineFeeds {
        async fn fetch_support(&self) -> anyhow::Result<Value> {
            anyhow::bail!("offline")
        }
        async fn fetch_market_share(&self) -> anyhow::Result<Value> {
            anyhow::bail!("offline")
        }
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_engine_futures_are_send() {
        let engine = Engine::new(
            EngineConfig::default(),
            DataStore::new(
                Arc::new(OfflineFeeds),
                std::time::Duration::from_secs(3600),
                None,
                EventBus::default(),
            ),
            Arc::new(MemoryHistory::new()),
            EventBus::default(),
        );
        let cancel = CancellationToken::new();
        assert_send(&engine.refresh());
        assert_send(&engine.crawl("https://site.test/", None, &cancel));
        assert_send(&engine.scan(ScanTarget::live("docs", "https://site.test/"), &cancel));
    }

    fn app() -> Router {
        let events = EventBus::default();
        let store = DataStore::new(
            Arc::new(OfflineFeeds),
            std::time::Duration::from_secs(3600),
            None,
            events.clone(),
        );
        store.install(CatalogSnapshot::new(
            1,
            chrono::Utc::now(),
            vec![
                FeatureRecord::new(":has()", FeatureKind::Css, 87.3, BaselineStatus::NewlyAvailable)
                    .with_pattern(r":has\s*\("),
                FeatureRecord::new("<dialog>", FeatureKind::Html, 94.0, BaselineStatus::NewlyAvailable),
            ],
        ));
        let engine = Engine::new(
            EngineConfig::default(),
            store,
            Arc::new(MemoryHistory::new()),
            events,
        );
        router(Arc::new(engine))
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_catalog() {
        let (status, body) = call(&app(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["catalog"]["version"], 1);
    }

    #[tokio::test]
    async fn test_risk_known_and_unknown() {
        let app = app();
        let (status, body) = call(&app, get("/api/v1/risk/:has()")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["category"], "medium");

        let (status, body) = call(&app, get("/api/v1/risk/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "E_NOT_FOUND");

        let (status, body) = call(
            &app,
            post("/api/v1/risk/batch", serde_json::json!({ "features": [":has()", "nope"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["features"][1]["risk_level"], 10.0);
    }

    #[tokio::test]
    async fn test_scan_extracted_pages_then_heatmap_and_history() {
        let app = app();
        let page = CrawlResult {
            url: "src/app.css".into(),
            css: vec![ContentBlock::inline(".card:has(img) {}")],
            ..CrawlResult::default()
        };
        let (status, body) = call(
            &app,
            post(
                "/api/v1/scan",
                serde_json::json!({ "ui_name": "storefront", "pages": [page], "min_compliance": 95.0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["report"]["compliance_score"], 94.66);
        assert_eq!(body["gate"]["passed"], false);

        let (_, heatmap) = call(&app, get("/api/v1/heatmap")).await;
        assert_eq!(heatmap["total_uis"], 1);

        let (_, history) = call(&app, get("/api/v1/history/storefront")).await;
        assert_eq!(history["scans"].as_array().map(Vec::len), Some(1));

        let id = body["report"]["id"].as_str().unwrap();
        let (status, _) = call(&app, get(&format!("/api/v1/reports/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_scan_requires_one_source() {
        let (status, body) = call(
            &app(),
            post("/api/v1/scan", serde_json::json!({ "ui_name": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "E_INVALID_PARAMS");
    }

    #[tokio::test]
    async fn test_features_filter() {
        let (status, body) = call(&app(), get("/api/v1/features?kind=html")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["features"][0]["id"], "<dialog>");
    }
}
