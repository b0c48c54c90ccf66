//! Async HTTP client wrapping reqwest.
//!
//! Not a browser. Serves the upstream feeds, linked stylesheets and scripts,
//! and HTML-only crawling. Transient failures (5xx, 429, connection errors)
//! are retried with backoff; timeouts are not.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;

const USER_AGENT: &str = concat!("featurescope/", env!("CARGO_PKG_VERSION"));

/// How transient failures are retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub base_delay: Duration,
    /// Upper bound on a server-requested `Retry-After`.
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_retry_after: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// A fully-read response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map_or(true, |ct| ct.contains("html"))
    }
}

/// HTTP client shared by the feed source and the fetchers. Cheap to clone.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        Self::with_retry(timeout, RetryPolicy::default())
    }

    pub fn with_retry(timeout: Duration, retry: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client, retry }
    }

    /// GET `url`, retrying transient failures. Non-2xx final statuses are
    /// returned, not raised.
    pub async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        let mut attempt = 0u32;
        loop {
            let sent = self.client.get(url).timeout(timeout).send().await;
            let resp = match sent {
                Ok(resp) => resp,
                Err(e) if attempt < self.retry.max_retries && !e.is_timeout() => {
                    attempt += 1;
                    tracing::debug!(%url, attempt, "retrying after error: {e}");
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    continue;
                }
                Err(e) => return Err(e).with_context(|| format!("GET {url}")),
            };

            let status = resp.status().as_u16();
            if attempt < self.retry.max_retries && (status >= 500 || status == 429) {
                attempt += 1;
                let delay = if status == 429 {
                    resp.headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.trim().parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or(self.retry.backoff(attempt))
                        .min(self.retry.max_retry_after)
                } else {
                    self.retry.backoff(attempt)
                };
                tracing::debug!(%url, status, attempt, "retrying in {}ms", delay.as_millis());
                tokio::time::sleep(delay).await;
                continue;
            }

            let final_url = resp.url().to_string();
            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = resp
                .text()
                .await
                .with_context(|| format!("reading body of {url}"))?;
            return Ok(HttpResponse {
                final_url,
                status,
                content_type,
                body,
            });
        }
    }

    /// GET a body that must come back 2xx.
    pub async fn get_text(&self, url: &str, timeout: Duration) -> Result<String> {
        let resp = self.get(url, timeout).await?;
        if !resp.is_success() {
            bail!("HTTP {} for {url}", resp.status);
        }
        Ok(resp.body)
    }

    /// GET and decode a JSON document.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, timeout: Duration) -> Result<T> {
        let body = self.get_text(url, timeout).await?;
        serde_json::from_str(&body).with_context(|| format!("{url} is not valid JSON"))
    }
}
