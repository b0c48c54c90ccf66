//! Page and asset fetchers.
//!
//! The crawl loop only sees [`PageFetcher`]. Pages come from a headless
//! browser when one is available so client-rendered markup is visible;
//! otherwise plain HTTP is used. Assets (stylesheets, scripts) are always
//! fetched over HTTP.

use crate::acquisition::http_client::HttpClient;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// HTML of one fetched page and where it ended up after redirects.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub html: String,
}

/// Source of page markup and linked assets for the crawler.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch (and render, where supported) one page.
    async fn fetch_page(&self, url: &str, timeout: Duration) -> Result<FetchedPage>;
    /// Fetch a stylesheet or script body.
    async fn fetch_asset(&self, url: &str, timeout: Duration) -> Result<String>;
}

/// Plain HTTP fetcher. No script execution.
#[derive(Clone)]
pub struct HttpFetcher {
    client: HttpClient,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: HttpClient::new(timeout),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str, timeout: Duration) -> Result<FetchedPage> {
        let resp = self.client.get(url, timeout).await?;
        if !resp.is_success() {
            bail!("HTTP {} for {url}", resp.status);
        }
        if !resp.is_html() {
            bail!("not an HTML page ({})", resp.content_type.unwrap_or_default());
        }
        Ok(FetchedPage {
            final_url: resp.final_url,
            html: resp.body,
        })
    }

    async fn fetch_asset(&self, url: &str, timeout: Duration) -> Result<String> {
        self.client.get_text(url, timeout).await
    }
}

/// Renders pages in a browser tab and returns the post-render DOM.
pub struct RenderingFetcher {
    renderer: Arc<dyn Renderer>,
    client: HttpClient,
}

impl RenderingFetcher {
    pub fn new(renderer: Arc<dyn Renderer>, timeout: Duration) -> Self {
        Self {
            renderer,
            client: HttpClient::new(timeout),
        }
    }
}

#[async_trait]
impl PageFetcher for RenderingFetcher {
    async fn fetch_page(&self, url: &str, timeout: Duration) -> Result<FetchedPage> {
        let mut tab = self.renderer.open_tab().await?;
        let rendered = tab.render(url, timeout).await.map(|page| FetchedPage {
            final_url: page.final_url,
            html: page.html,
        });
        // Close the tab even when rendering failed
        if let Err(e) = tab.close().await {
            tracing::debug!("closing tab: {e:#}");
        }
        rendered
    }

    async fn fetch_asset(&self, url: &str, timeout: Duration) -> Result<String> {
        self.client.get_text(url, timeout).await
    }
}

/// Pick the best available fetcher: a headless browser if it launches,
/// plain HTTP otherwise.
pub async fn default_fetcher(timeout: Duration) -> Arc<dyn PageFetcher> {
    match ChromiumRenderer::new().await {
        Ok(renderer) => {
            tracing::info!("rendering pages with headless Chromium");
            Arc::new(RenderingFetcher::new(Arc::new(renderer), timeout))
        }
        Err(e) => {
            tracing::warn!("browser unavailable ({e:#}); falling back to HTTP-only crawling");
            Arc::new(HttpFetcher::new(timeout))
        }
    }
}

/// In-memory site: fixed pages and assets keyed by URL.
///
/// Used to replay captured sites and to drive crawl tests. Records how often
/// each page was requested.
#[derive(Default)]
pub struct MemoryFetcher {
    pages: HashMap<String, String>,
    assets: HashMap<String, String>,
    redirects: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    hits: Mutex<HashMap<String, usize>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn asset(mut self, url: &str, body: &str) -> Self {
        self.assets.insert(url.to_string(), body.to_string());
        self
    }

    /// Serve `url` as if the server redirected to `target`.
    pub fn redirect(mut self, url: &str, target: &str) -> Self {
        self.redirects.insert(url.to_string(), target.to_string());
        self
    }

    /// Sleep before answering for `url`.
    pub fn delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    /// Number of times a page was requested.
    pub fn hits(&self, url: &str) -> usize {
        self.hits
            .lock()
            .map(|h| h.get(url).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total page requests across all URLs.
    pub fn total_hits(&self) -> usize {
        self.hits.lock().map(|h| h.values().sum()).unwrap_or(0)
    }
}

#[async_trait]
impl PageFetcher for MemoryFetcher {
    async fn fetch_page(&self, url: &str, _timeout: Duration) -> Result<FetchedPage> {
        if let Ok(mut hits) = self.hits.lock() {
            *hits.entry(url.to_string()).or_insert(0) += 1;
        }
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        let final_url = self.redirects.get(url).cloned().unwrap_or_else(|| url.to_string());
        match self.pages.get(&final_url) {
            Some(html) => Ok(FetchedPage {
                final_url,
                html: html.clone(),
            }),
            None => bail!("HTTP 404 for {url}"),
        }
    }

    async fn fetch_asset(&self, url: &str, _timeout: Duration) -> Result<String> {
        self.assets
            .get(url)
            .cloned()
            .with_context(|| format!("HTTP 404 for {url}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_fetcher_rejects_non_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string("{}"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<p>hi</p>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5));
        let timeout = Duration::from_secs(5);
        assert!(fetcher
            .fetch_page(&format!("{}/data.json", server.uri()), timeout)
            .await
            .is_err());
        let page = fetcher
            .fetch_page(&format!("{}/", server.uri()), timeout)
            .await
            .unwrap();
        assert_eq!(page.html, "<p>hi</p>");
    }

    #[tokio::test]
    async fn test_http_fetcher_asset_404_is_error() {
        let server = MockServer::start().await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5));
        let result = fetcher
            .fetch_asset(&format!("{}/missing.css", server.uri()), Duration::from_secs(5))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_memory_fetcher_counts_hits_and_redirects() {
        let fetcher = MemoryFetcher::new()
            .page("https://site.test/new", "<p>moved</p>")
            .redirect("https://site.test/old", "https://site.test/new");
        let timeout = Duration::from_secs(1);

        let page = fetcher.fetch_page("https://site.test/old", timeout).await.unwrap();
        assert_eq!(page.final_url, "https://site.test/new");
        assert!(fetcher.fetch_page("https://site.test/none", timeout).await.is_err());
        assert_eq!(fetcher.hits("https://site.test/old"), 1);
        assert_eq!(fetcher.total_hits(), 2);
    }

    /// Tabs that fail to load any URL containing "broken".
    struct FakeRenderer {
        open: Arc<std::sync::atomic::AtomicUsize>,
    }

    struct FakeTab {
        open: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn open_tab(&self) -> Result<Box<dyn crate::renderer::RenderTab>> {
            self.open.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Box::new(FakeTab {
                open: Arc::clone(&self.open),
            }))
        }

        fn open_tabs(&self) -> usize {
            self.open.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl crate::renderer::RenderTab for FakeTab {
        async fn render(
            &mut self,
            url: &str,
            _timeout: Duration,
        ) -> Result<crate::renderer::RenderedPage> {
            if url.contains("broken") {
                bail!("navigation failed: net::ERR_FAILED");
            }
            Ok(crate::renderer::RenderedPage {
                final_url: format!("{url}#rendered"),
                html: "<dialog open></dialog>".into(),
                elapsed: Duration::from_millis(1),
            })
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.open.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_rendering_fetcher_closes_tabs() {
        let renderer = Arc::new(FakeRenderer {
            open: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        });
        let fetcher = RenderingFetcher::new(renderer.clone(), Duration::from_secs(1));

        let page = fetcher
            .fetch_page("https://a.test/", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(page.html, "<dialog open></dialog>");
        assert!(fetcher
            .fetch_page("https://a.test/broken", Duration::from_secs(1))
            .await
            .is_err());
        assert_eq!(renderer.open_tabs(), 0);
    }
}
