//! Same-origin breadth-first crawler.
//!
//! A crawl starts from one seed URL and walks same-origin links level by
//! level until the queue is empty or the page budget is spent. A bounded pool
//! of workers pulls pages from the [`frontier::Frontier`]; each worker fetches
//! a page, extracts its style/script/link surface, fetches linked assets and
//! reports the links back. Page failures are recorded and skipped; only an
//! unreachable seed fails the crawl.

pub mod extract;
pub mod fetch;
pub mod frontier;

use crate::config::CrawlOptions;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use extract::Slot;
use fetch::PageFetcher;
use frontier::{normalize_url, same_origin, Frontier, QueuedPage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Where a CSS or script block came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockSource {
    /// `<style>` or inline `<script>`.
    Inline,
    /// A `style=""` attribute.
    Attribute,
    /// A linked stylesheet or script.
    Linked { url: String },
    /// A file from a source tree.
    File { path: String },
}

/// One block of stylesheet or script text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub source: BlockSource,
    pub text: String,
}

impl ContentBlock {
    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            source: BlockSource::Inline,
            text: text.into(),
        }
    }
}

/// The raw surface of one crawled page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlResult {
    /// Crawl origin, e.g. `https://site.test`; follows a seed redirect.
    pub origin: String,
    /// Where the page landed after redirects.
    pub url: String,
    pub depth: u32,
    pub html: String,
    /// Stylesheet text in document order; attribute styles last.
    pub css: Vec<ContentBlock>,
    pub scripts: Vec<ContentBlock>,
    /// Normalized same-origin links found on the page.
    pub links: BTreeSet<String>,
}

/// A page that could not be fetched or extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageFailure {
    pub url: String,
    pub depth: u32,
    pub error: String,
}

/// Why the crawl stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Every reachable page within the depth limit was visited.
    Exhausted,
    /// Eligible links remained when the page budget ran out.
    BudgetExceeded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOutcome {
    /// Successful pages in discovery order.
    pub results: Vec<CrawlResult>,
    pub failures: Vec<PageFailure>,
    pub termination: Termination,
}

#[derive(Default)]
struct Collected {
    results: Vec<(u64, CrawlResult)>,
    failures: Vec<(u64, PageFailure)>,
    seed_error: Option<String>,
}

/// Crawls one site with a fixed fetcher and options.
pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    options: CrawlOptions,
    progress: Option<(EventBus, String)>,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, options: CrawlOptions) -> Self {
        Self {
            fetcher,
            options,
            progress: None,
        }
    }

    /// Emit per-page events on `events`, tagged with `ui_name`.
    pub fn with_progress(mut self, events: EventBus, ui_name: impl Into<String>) -> Self {
        self.progress = Some((events, ui_name.into()));
        self
    }

    pub fn options(&self) -> &CrawlOptions {
        &self.options
    }

    /// Crawl from `seed` until the frontier drains, the budget is spent or
    /// `cancel` fires.
    pub async fn crawl(&self, seed: &str, cancel: &CancellationToken) -> EngineResult<CrawlOutcome> {
        let seed_key = normalize_url(seed, self.options.query_policy)
            .ok_or_else(|| EngineError::InvalidInput(format!("not an http(s) URL: {seed}")))?;
        let seed_url = Url::parse(&seed_key)
            .map_err(|e| EngineError::InvalidInput(format!("{seed}: {e}")))?;

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let workers = self.options.workers.clamp(1, 64);
        tracing::info!(
            seed = %seed_key,
            max_depth = self.options.max_depth,
            max_pages = self.options.max_pages,
            workers,
            "crawl started"
        );

        let frontier = Frontier::new(seed_url, &self.options);
        let collected = Mutex::new(Collected::default());
        futures::future::join_all(
            (0..workers).map(|_| self.worker(&frontier, &collected, cancel)),
        )
        .await;

        if cancel.is_cancelled() {
            tracing::info!(seed = %seed_key, "crawl cancelled");
            return Err(EngineError::Cancelled);
        }

        let collected = collected
            .into_inner()
            .map_err(|_| EngineError::InvariantViolation("crawl state poisoned".into()))?;
        if let Some(reason) = collected.seed_error {
            return Err(EngineError::FetchFailure {
                url: seed_key,
                reason,
            });
        }

        let mut results = collected.results;
        results.sort_by_key(|(seq, _)| *seq);
        let mut failures = collected.failures;
        failures.sort_by_key(|(seq, _)| *seq);
        let termination = if frontier.budget_exceeded() {
            Termination::BudgetExceeded
        } else {
            Termination::Exhausted
        };

        tracing::info!(
            seed = %seed_key,
            pages = results.len(),
            failures = failures.len(),
            ?termination,
            "crawl finished"
        );
        Ok(CrawlOutcome {
            results: results.into_iter().map(|(_, r)| r).collect(),
            failures: failures.into_iter().map(|(_, f)| f).collect(),
            termination,
        })
    }

    async fn worker(
        &self,
        frontier: &Frontier,
        collected: &Mutex<Collected>,
        cancel: &CancellationToken,
    ) {
        while let Some(page) = frontier.next(cancel).await {
            let visit = self.visit(frontier, &page);
            let visited = tokio::time::timeout(self.options.page_timeout, visit)
                .await
                .unwrap_or_else(|_| {
                    Err(anyhow::anyhow!(
                        "timed out after {}ms",
                        self.options.page_timeout.as_millis()
                    ))
                });

            match visited {
                Ok(None) => frontier.complete(&page, std::iter::empty()),
                Ok(Some(result)) => {
                    frontier.complete(&page, &result.links);
                    self.emit(|ui_name| EngineEvent::PageCrawled {
                        ui_name,
                        url: result.url.clone(),
                        depth: result.depth,
                        css_blocks: result.css.len(),
                        script_blocks: result.scripts.len(),
                    });
                    if let Ok(mut c) = collected.lock() {
                        c.results.push((page.seq, result));
                    }
                }
                Err(e) => {
                    frontier.complete(&page, std::iter::empty());
                    let error = format!("{e:#}");
                    tracing::warn!(url = %page.url, depth = page.depth, "page skipped: {error}");
                    self.emit(|ui_name| EngineEvent::PageFailed {
                        ui_name,
                        url: page.url.clone(),
                        error: error.clone(),
                    });
                    if let Ok(mut c) = collected.lock() {
                        if page.depth == 0 {
                            c.seed_error = Some(error);
                        } else {
                            c.failures.push((
                                page.seq,
                                PageFailure {
                                    url: page.url.clone(),
                                    depth: page.depth,
                                    error,
                                },
                            ));
                        }
                    }
                }
            }
        }
    }

    fn emit(&self, event: impl FnOnce(String) -> EngineEvent) {
        if let Some((events, ui_name)) = &self.progress {
            events.emit(event(ui_name.clone()));
        }
    }

    /// Fetch one page, extract it and pull in its linked assets.
    ///
    /// Returns `None` when the page redirected onto a URL another page has
    /// already claimed.
    async fn visit(
        &self,
        frontier: &Frontier,
        page: &QueuedPage,
    ) -> anyhow::Result<Option<CrawlResult>> {
        let fetched = self
            .fetcher
            .fetch_page(&page.url, self.options.page_timeout)
            .await?;

        let final_url = Url::parse(&fetched.final_url).or_else(|_| Url::parse(&page.url))?;
        let origin = if page.depth == 0 {
            frontier.rebase(&final_url)
        } else {
            frontier.origin()
        }
        .ok_or_else(|| anyhow::anyhow!("crawl state poisoned"))?;
        if !same_origin(&final_url, &origin) {
            anyhow::bail!("redirected off-origin to {final_url}");
        }

        let final_key = normalize_url(final_url.as_str(), self.options.query_policy)
            .unwrap_or_else(|| page.url.clone());
        if !frontier.claim(page, &final_key) {
            tracing::debug!(url = %page.url, landed = %final_key, "redirect target already visited");
            return Ok(None);
        }

        let extracted = extract::extract(&fetched.html, &final_url);
        let links: BTreeSet<String> = extracted
            .links
            .iter()
            .filter_map(|l| normalize_url(l, self.options.query_policy))
            .filter(|l| Url::parse(l).map(|u| same_origin(&u, &origin)).unwrap_or(false))
            .collect();

        let css = self.resolve_slots(&origin, extracted.css).await;
        let scripts = self.resolve_slots(&origin, extracted.scripts).await;

        Ok(Some(CrawlResult {
            origin: origin.origin().ascii_serialization(),
            url: final_key,
            depth: page.depth,
            html: fetched.html,
            css,
            scripts,
            links,
        }))
    }

    /// Fetch linked blocks, keeping document order. Failed or disallowed
    /// assets are dropped.
    async fn resolve_slots(&self, origin: &Url, slots: Vec<Slot>) -> Vec<ContentBlock> {
        let fetches = slots.into_iter().map(|slot| async move {
            match slot {
                Slot::Ready(block) => Some(block),
                Slot::Linked(url) => {
                    let allowed = self.options.cross_origin_assets
                        || Url::parse(&url).map(|u| same_origin(&u, origin)).unwrap_or(false);
                    if !allowed {
                        return None;
                    }
                    match self.fetcher.fetch_asset(&url, self.options.page_timeout).await {
                        Ok(text) => Some(ContentBlock {
                            source: BlockSource::Linked { url },
                            text,
                        }),
                        Err(e) => {
                            tracing::debug!(%url, "asset skipped: {e:#}");
                            None
                        }
                    }
                }
            }
        });
        futures::future::join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetch::MemoryFetcher;
    use std::time::Duration;

    fn options(max_depth: u32, max_pages: usize) -> CrawlOptions {
        CrawlOptions {
            max_depth,
            max_pages,
            ..CrawlOptions::default()
        }
    }

    fn link(href: &str) -> String {
        format!(r#"<a href="{href}">{href}</a>"#)
    }

    async fn run(fetcher: Arc<MemoryFetcher>, opts: CrawlOptions) -> EngineResult<CrawlOutcome> {
        Crawler::new(fetcher, opts)
            .crawl("https://site.test/", &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_chain_respects_max_depth() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .page("https://site.test/", &link("/a"))
                .page("https://site.test/a", &link("/b"))
                .page("https://site.test/b", &link("/c"))
                .page("https://site.test/c", "<p>deep</p>"),
        );
        let outcome = run(fetcher.clone(), options(2, 10)).await.unwrap();
        let urls: Vec<&str> = outcome.results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://site.test/", "https://site.test/a", "https://site.test/b"]);
        assert!(outcome.results.iter().all(|r| r.depth <= 2));
        assert_eq!(outcome.termination, Termination::Exhausted);
        assert_eq!(fetcher.hits("https://site.test/c"), 0);
        assert_eq!(outcome.results[0].origin, "https://site.test");
    }

    #[tokio::test]
    async fn test_cycles_terminate_and_visit_once() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .page("https://site.test/", &format!("{}{}", link("/a"), link("/b")))
                .page("https://site.test/a", &format!("{}{}", link("/b"), link("/")))
                .page("https://site.test/b", &format!("{}{}", link("/a"), link("/?ref=b"))),
        );
        let outcome = run(fetcher.clone(), options(10, 50)).await.unwrap();
        assert_eq!(outcome.results.len(), 3);
        for url in ["https://site.test/", "https://site.test/a", "https://site.test/b"] {
            assert_eq!(fetcher.hits(url), 1, "{url} fetched more than once");
        }
        assert_eq!(fetcher.total_hits(), 3);
    }

    #[tokio::test]
    async fn test_max_pages_exact_with_workers() {
        let links: String = (0..20).map(|i| link(&format!("/p{i}"))).collect();
        let mut fetcher = MemoryFetcher::new().page("https://site.test/", &links);
        for i in 0..20 {
            fetcher = fetcher.page(&format!("https://site.test/p{i}"), &link("/"));
        }
        let fetcher = Arc::new(fetcher);
        let mut opts = options(3, 5);
        opts.workers = 4;
        let outcome = run(fetcher.clone(), opts).await.unwrap();
        assert_eq!(outcome.results.len(), 5);
        assert_eq!(fetcher.total_hits(), 5);
        assert_eq!(outcome.termination, Termination::BudgetExceeded);
    }

    #[tokio::test]
    async fn test_cross_origin_links_not_followed() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .page(
                    "https://site.test/",
                    &format!("{}{}", link("https://other.test/"), link("http://site.test/insecure")),
                )
                .page("https://other.test/", "<p>other</p>"),
        );
        let outcome = run(fetcher.clone(), options(2, 10)).await.unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results[0].links.is_empty());
        assert_eq!(fetcher.hits("https://other.test/"), 0);
    }

    #[tokio::test]
    async fn test_page_failure_is_recorded_and_skipped() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .page("https://site.test/", &format!("{}{}", link("/missing"), link("/ok")))
                .page("https://site.test/ok", "<p>ok</p>"),
        );
        let outcome = run(fetcher, options(2, 10)).await.unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].url, "https://site.test/missing");
        assert_eq!(outcome.failures[0].depth, 1);
    }

    #[tokio::test]
    async fn test_unreachable_seed_fails_crawl() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let err = run(fetcher, options(2, 10)).await.unwrap_err();
        assert!(matches!(err, EngineError::FetchFailure { .. }));
    }

    #[tokio::test]
    async fn test_off_origin_redirect_is_a_failure() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .page("https://site.test/", &link("/out"))
                .redirect("https://site.test/out", "https://other.test/landing")
                .page("https://other.test/landing", "<p>elsewhere</p>"),
        );
        let outcome = run(fetcher, options(2, 10)).await.unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.failures[0].error.contains("off-origin"));
    }

    #[tokio::test]
    async fn test_seed_redirect_within_site_moves_origin() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .redirect("http://site.test/", "https://site.test/")
                .page("https://site.test/", &link("/about"))
                .page("https://site.test/about", "<p>about</p>"),
        );
        let outcome = Crawler::new(fetcher, options(2, 10))
            .crawl("http://site.test/", &CancellationToken::new())
            .await
            .unwrap();
        let urls: Vec<&str> = outcome.results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://site.test/", "https://site.test/about"]);
        assert!(outcome.results.iter().all(|r| r.origin == "https://site.test"));
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_redirect_target_scanned_once() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .page("https://site.test/", &format!("{}{}", link("/old"), link("/new")))
                .redirect("https://site.test/old", "https://site.test/new")
                .page("https://site.test/new", "<p>new</p>"),
        );
        let outcome = run(fetcher, options(2, 10)).await.unwrap();
        let urls: Vec<&str> = outcome.results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls.iter().filter(|u| **u == "https://site.test/new").count(), 1);
        assert!(!urls.contains(&"https://site.test/old"));
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_assets_fetched_in_order_and_failures_skipped() {
        let html = r#"<link rel="stylesheet" href="/a.css">
            <style>.inline { color: red }</style>
            <link rel="stylesheet" href="/missing.css">
            <link rel="stylesheet" href="https://cdn.test/lib.css">
            <script src="/app.js"></script>"#;
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .page("https://site.test/", html)
                .asset("https://site.test/a.css", ".a { aspect-ratio: 1 }")
                .asset("https://cdn.test/lib.css", ".lib { display: grid }")
                .asset("https://site.test/app.js", "new ResizeObserver(cb)"),
        );

        let outcome = run(fetcher.clone(), options(1, 10)).await.unwrap();
        let page = &outcome.results[0];
        let texts: Vec<&str> = page.css.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec![".a { aspect-ratio: 1 }", ".inline { color: red }", ".lib { display: grid }"]);
        assert_eq!(page.scripts.len(), 1);

        let mut opts = options(1, 10);
        opts.cross_origin_assets = false;
        let outcome = run(fetcher, opts).await.unwrap();
        assert_eq!(outcome.results[0].css.len(), 2);
    }

    #[tokio::test]
    async fn test_slow_page_times_out() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .page("https://site.test/", &link("/slow"))
                .page("https://site.test/slow", "<p>late</p>")
                .delay("https://site.test/slow", Duration::from_secs(5)),
        );
        let mut opts = options(2, 10);
        opts.page_timeout = Duration::from_millis(50);
        let outcome = run(fetcher, opts).await.unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.failures[0].error.contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancelled_crawl_errors() {
        let fetcher = Arc::new(MemoryFetcher::new().page("https://site.test/", "<p>x</p>"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = Crawler::new(fetcher, options(2, 10))
            .crawl("https://site.test/", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[tokio::test]
    async fn test_progress_events() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .page("https://site.test/", &format!("{}{}", link("/a"), link("/gone")))
                .page("https://site.test/a", "<p>a</p>"),
        );
        let events = EventBus::new(16);
        let mut rx = events.subscribe();
        Crawler::new(fetcher, options(1, 10))
            .with_progress(events, "docs")
            .crawl("https://site.test/", &CancellationToken::new())
            .await
            .unwrap();

        let mut crawled = 0;
        let mut failed = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                EngineEvent::PageCrawled { ui_name, .. } => {
                    assert_eq!(ui_name, "docs");
                    crawled += 1;
                }
                EngineEvent::PageFailed { .. } => failed += 1,
                _ => {}
            }
        }
        assert_eq!((crawled, failed), (2, 1));
    }
}
