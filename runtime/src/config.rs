//! Engine configuration.
//!
//! Defaults are overridden by `FEATURESCOPE_*` environment variables and then
//! by CLI flags. Unparseable values fall back to the default silently.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MAX_DEPTH: u32 = 2;
const DEFAULT_MAX_PAGES: usize = 50;
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_CACHE_TTL_SECS: u64 = 6 * 3600;
const DEFAULT_PAGE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SCAN_TIMEOUT_MS: u64 = 10 * 60_000;
const DEFAULT_LOW_COMPLIANCE_THRESHOLD: f64 = 70.0;
const DEFAULT_MIN_COMPLIANCE_SCORE: f64 = 80.0;

/// MDN browser-compat-data bundle.
pub const DEFAULT_SUPPORT_FEED_URL: &str =
    "https://unpkg.com/@mdn/browser-compat-data/data.json";
/// caniuse full data; only the `agents` usage table is read.
pub const DEFAULT_MARKET_SHARE_FEED_URL: &str =
    "https://raw.githubusercontent.com/Fyrd/caniuse/main/fulldata-json/data-2.0.json";

/// How query strings take part in visited-set keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum QueryPolicy {
    /// Drop the query entirely: `/a?x=1` and `/a?x=2` are the same page.
    Strip,
    /// Keep the query with its pairs sorted by key.
    Sort,
}

impl QueryPolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strip" => Some(Self::Strip),
            "sort" | "canonical" => Some(Self::Sort),
            _ => None,
        }
    }
}

/// Crawl limits and fetch behavior for one crawl session.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub max_depth: u32,
    pub max_pages: usize,
    pub workers: usize,
    pub page_timeout: Duration,
    pub query_policy: QueryPolicy,
    pub cross_origin_assets: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_pages: DEFAULT_MAX_PAGES,
            workers: DEFAULT_WORKERS,
            page_timeout: Duration::from_millis(DEFAULT_PAGE_TIMEOUT_MS),
            query_policy: QueryPolicy::Strip,
            cross_origin_assets: true,
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub crawl: CrawlOptions,
    pub cache_ttl: Duration,
    pub scan_timeout: Duration,
    pub low_compliance_threshold: f64,
    /// Read by the CI gate only; the engine itself never enforces it.
    pub min_compliance_score: f64,
    pub support_feed_url: String,
    pub market_share_feed_url: String,
    pub data_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            crawl: CrawlOptions::default(),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            scan_timeout: Duration::from_millis(DEFAULT_SCAN_TIMEOUT_MS),
            low_compliance_threshold: DEFAULT_LOW_COMPLIANCE_THRESHOLD,
            min_compliance_score: DEFAULT_MIN_COMPLIANCE_SCORE,
            support_feed_url: DEFAULT_SUPPORT_FEED_URL.to_string(),
            market_share_feed_url: DEFAULT_MARKET_SHARE_FEED_URL.to_string(),
            data_dir: default_data_dir(),
        }
    }
}

impl EngineConfig {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = EnvReader { lookup };

        let crawl = CrawlOptions {
            max_depth: env.u32("FEATURESCOPE_MAX_DEPTH", defaults.crawl.max_depth),
            max_pages: env
                .usize("FEATURESCOPE_MAX_PAGES", defaults.crawl.max_pages)
                .max(1),
            workers: env
                .usize("FEATURESCOPE_WORKERS", defaults.crawl.workers)
                .clamp(1, 64),
            page_timeout: Duration::from_millis(env.u64(
                "FEATURESCOPE_PAGE_TIMEOUT_MS",
                DEFAULT_PAGE_TIMEOUT_MS,
            )),
            query_policy: env
                .string("FEATURESCOPE_QUERY_POLICY")
                .and_then(|v| QueryPolicy::parse(&v))
                .unwrap_or(defaults.crawl.query_policy),
            cross_origin_assets: env.bool(
                "FEATURESCOPE_CROSS_ORIGIN_ASSETS",
                defaults.crawl.cross_origin_assets,
            ),
        };

        Self {
            crawl,
            cache_ttl: Duration::from_secs(
                env.u64("FEATURESCOPE_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS),
            ),
            scan_timeout: Duration::from_millis(
                env.u64("FEATURESCOPE_SCAN_TIMEOUT_MS", DEFAULT_SCAN_TIMEOUT_MS),
            ),
            low_compliance_threshold: env
                .f64(
                    "FEATURESCOPE_LOW_COMPLIANCE_THRESHOLD",
                    defaults.low_compliance_threshold,
                )
                .clamp(0.0, 100.0),
            min_compliance_score: env
                .f64(
                    "FEATURESCOPE_MIN_COMPLIANCE_SCORE",
                    defaults.min_compliance_score,
                )
                .clamp(0.0, 100.0),
            support_feed_url: env
                .string("FEATURESCOPE_SUPPORT_FEED_URL")
                .unwrap_or(defaults.support_feed_url),
            market_share_feed_url: env
                .string("FEATURESCOPE_MARKET_SHARE_FEED_URL")
                .unwrap_or(defaults.market_share_feed_url),
            data_dir: env
                .string("FEATURESCOPE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
        }
    }

    /// Path of the persisted catalog snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("catalog.json")
    }

    /// Path of the scan history database.
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.db")
    }
}

/// `~/.featurescope`, or `/tmp/.featurescope` without a home directory.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".featurescope")
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn u64(&self, name: &str, default_value: u64) -> u64 {
        self.string(name)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(default_value)
    }

    fn u32(&self, name: &str, default_value: u32) -> u32 {
        self.string(name)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(default_value)
    }

    fn usize(&self, name: &str, default_value: usize) -> usize {
        self.string(name)
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(default_value)
    }

    fn f64(&self, name: &str, default_value: f64) -> f64 {
        self.string(name)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(default_value)
    }

    fn bool(&self, name: &str, default_value: bool) -> bool {
        match self.string(name).map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            _ => default_value,
        }
    }
}
