//! Headless browser rendering.
//!
//! Feature usage often arrives through client-side rendering, so crawled
//! pages are loaded in a real browser tab and the post-script DOM is what
//! gets extracted. [`Renderer`] hands out tabs; [`RenderTab`] loads one page.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// The DOM of a page after its scripts ran.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// URL after redirects and client-side navigation.
    pub final_url: String,
    pub html: String,
    pub elapsed: Duration,
}

/// A browser engine that can open tabs.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn open_tab(&self) -> Result<Box<dyn RenderTab>>;
    /// Tabs opened and not yet closed.
    fn open_tabs(&self) -> usize;
}

/// One browser tab.
#[async_trait]
pub trait RenderTab: Send + Sync {
    /// Load `url`, let it settle, and read back the DOM, all within `timeout`.
    async fn render(&mut self, url: &str, timeout: Duration) -> Result<RenderedPage>;
    async fn close(self: Box<Self>) -> Result<()>;
}
