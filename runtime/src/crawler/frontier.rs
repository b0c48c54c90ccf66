//! Crawl frontier: the queue, the visited set and the page budget.
//!
//! One mutex-guarded owner. Workers ask for the next page and report the
//! links they found; every enqueue decision is made here under the lock, so
//! a URL is dispatched at most once and the budget is exact.

use crate::config::{CrawlOptions, QueryPolicy};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Canonical visited-set key: scheme, host, port and path, no fragment, and
/// the query stripped or sorted per `policy`. Non-HTTP(S) URLs yield `None`.
pub fn normalize_url(raw: &str, policy: QueryPolicy) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    match policy {
        QueryPolicy::Strip => url.set_query(None),
        QueryPolicy::Sort => {
            let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
            if pairs.is_empty() {
                url.set_query(None);
            } else {
                pairs.sort();
                url.query_pairs_mut().clear().extend_pairs(pairs);
            }
        }
    }
    Some(url.to_string())
}

/// Same scheme, host and effective port.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// A page handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedPage {
    pub url: String,
    pub depth: u32,
    /// Discovery order; results are reported in this order.
    pub seq: u64,
}

#[derive(Debug)]
struct FrontierState {
    /// Origin links must share; re-based once if the seed redirects.
    origin: Url,
    queue: VecDeque<QueuedPage>,
    /// Every key dispatched or landed on, redirect targets included.
    visited: HashSet<String>,
    /// Pages handed out so far; the budget counts these, not aliases.
    dispatched: usize,
    in_flight: usize,
    next_seq: u64,
    budget_hit: bool,
}

pub(crate) struct Frontier {
    max_depth: u32,
    max_pages: usize,
    policy: QueryPolicy,
    state: Mutex<FrontierState>,
    changed: Notify,
}

impl Frontier {
    /// Start a frontier holding only the (already normalized) seed at depth 0.
    pub fn new(seed: Url, options: &CrawlOptions) -> Self {
        let seed_key = seed.to_string();
        let mut state = FrontierState {
            origin: seed,
            queue: VecDeque::new(),
            visited: HashSet::new(),
            dispatched: 1,
            in_flight: 0,
            next_seq: 1,
            budget_hit: false,
        };
        state.visited.insert(seed_key.clone());
        state.queue.push_back(QueuedPage {
            url: seed_key,
            depth: 0,
            seq: 0,
        });
        Self {
            max_depth: options.max_depth,
            max_pages: options.max_pages.max(1),
            policy: options.query_policy,
            state: Mutex::new(state),
            changed: Notify::new(),
        }
    }

    pub fn origin(&self) -> Option<Url> {
        self.state.lock().ok().map(|s| s.origin.clone())
    }

    /// Adopt the seed's landing URL as the crawl origin, so a seed that
    /// redirects to its https or www form keeps its own links in scope.
    pub fn rebase(&self, landed: &Url) -> Option<Url> {
        let mut state = self.state.lock().ok()?;
        if !same_origin(&state.origin, landed) {
            tracing::info!(from = %state.origin, to = %landed, "seed redirected; crawl origin moved");
            state.origin = landed.clone();
        }
        Some(state.origin.clone())
    }

    /// Record that `page` landed on `final_key` after redirects.
    ///
    /// Returns `false` when that key was already dispatched or landed on by
    /// another page, in which case the content is a duplicate.
    pub fn claim(&self, page: &QueuedPage, final_key: &str) -> bool {
        if page.url == final_key {
            return true;
        }
        match self.state.lock() {
            Ok(mut state) => state.visited.insert(final_key.to_string()),
            Err(_) => false,
        }
    }

    /// Next page to fetch, waiting while other workers may still add links.
    ///
    /// Returns `None` once the queue is empty with nothing in flight, or when
    /// `cancel` fires.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<QueuedPage> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            let notified = {
                let mut state = self.state.lock().ok()?;
                if let Some(page) = state.queue.pop_front() {
                    state.in_flight += 1;
                    return Some(page);
                }
                if state.in_flight == 0 {
                    return None;
                }
                // Registered before the lock drops, so no wakeup is missed
                self.changed.notified()
            };
            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Report a finished page and the links it discovered.
    pub fn complete<'a>(&self, page: &QueuedPage, links: impl IntoIterator<Item = &'a String>) {
        if let Ok(mut state) = self.state.lock() {
            for link in links {
                self.offer(&mut state, link, page.depth + 1);
            }
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }

    fn offer(&self, state: &mut FrontierState, link: &str, depth: u32) {
        if depth > self.max_depth {
            return;
        }
        let Some(key) = normalize_url(link, self.policy) else {
            return;
        };
        let Ok(parsed) = Url::parse(&key) else {
            return;
        };
        if !same_origin(&parsed, &state.origin) || state.visited.contains(&key) {
            return;
        }
        if state.dispatched >= self.max_pages {
            state.budget_hit = true;
            return;
        }
        state.visited.insert(key.clone());
        state.dispatched += 1;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push_back(QueuedPage {
            url: key,
            depth,
            seq,
        });
    }

    /// Whether some eligible link was refused because the budget was spent.
    pub fn budget_exceeded(&self) -> bool {
        self.state.lock().map(|s| s.budget_hit).unwrap_or(false)
    }

    #[cfg(test)]
    fn visited_len(&self) -> usize {
        self.state.lock().map(|s| s.visited.len()).unwrap_or(0)
    }
}
