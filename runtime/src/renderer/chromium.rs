//! Chromium renderer over chromiumoxide.

use super::{RenderTab, RenderedPage, Renderer};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SYSTEM_BINARIES: &[&str] = &["google-chrome", "chromium", "chromium-browser"];

/// Locate a Chromium binary: `FEATURESCOPE_CHROMIUM_PATH`, then a browser
/// installed under `~/.featurescope/chromium`, then the system `PATH`.
pub fn find_chromium() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("FEATURESCOPE_CHROMIUM_PATH").map(PathBuf::from) {
        if path.exists() {
            return Some(path);
        }
        tracing::warn!(path = %path.display(), "FEATURESCOPE_CHROMIUM_PATH does not exist");
    }

    let bundled = dirs::home_dir().map(|home| home.join(".featurescope/chromium"));
    let bundled_candidates = bundled.iter().flat_map(|base| {
        [
            base.join("chrome-linux64/chrome"),
            base.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            base.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            base.join("chrome"),
        ]
    });
    if let Some(path) = bundled_candidates.into_iter().find(|p| p.exists()) {
        return Some(path);
    }

    SYSTEM_BINARIES
        .iter()
        .find_map(|name| which::which(name).ok())
        .or_else(|| {
            let mac = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
            (cfg!(target_os = "macos") && mac.exists()).then_some(mac)
        })
}

/// One headless Chromium process shared by every crawl worker.
pub struct ChromiumRenderer {
    browser: Browser,
    open: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch headless Chromium.
    pub async fn new() -> Result<Self> {
        let executable = find_chromium()
            .context("Chromium not found. Set FEATURESCOPE_CHROMIUM_PATH or install Chrome.")?;
        tracing::debug!(path = %executable.display(), "launching Chromium");

        let config = BrowserConfig::builder()
            .chrome_executable(executable)
            .args([
                "--headless=new",
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--disable-extensions",
                "--disable-background-networking",
                "--mute-audio",
            ])
            .build()
            .map_err(|e| anyhow!("invalid browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // The CDP connection only makes progress while its handler is polled
        tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self {
            browser,
            open: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn open_tab(&self) -> Result<Box<dyn RenderTab>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to open tab")?;
        self.open.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(ChromiumTab {
            page,
            open: Arc::clone(&self.open),
        }))
    }

    fn open_tabs(&self) -> usize {
        self.open.load(Ordering::Relaxed)
    }
}

struct ChromiumTab {
    page: Page,
    open: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderTab for ChromiumTab {
    async fn render(&mut self, url: &str, timeout: Duration) -> Result<RenderedPage> {
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {}ms", timeout.as_millis()),
        }

        // Client-side redirects and late rendering get whatever budget is left
        let remaining = timeout.saturating_sub(start.elapsed());
        let _ = tokio::time::timeout(remaining, self.page.wait_for_navigation()).await;

        let html: String = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .context("failed to read rendered DOM")?
            .into_value()
            .map_err(|e| anyhow!("rendered DOM is not a string: {e:?}"))?;
        let final_url = self
            .page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        Ok(RenderedPage {
            final_url,
            html,
            elapsed: start.elapsed(),
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.open.fetch_sub(1, Ordering::Relaxed);
        self.page.close().await.context("failed to close tab")
    }
}
