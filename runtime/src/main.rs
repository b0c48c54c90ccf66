// Copyright 2026 Featurescope Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use featurescope_runtime::catalog::{BaselineStatus, FeatureKind};
use featurescope_runtime::cli;
use featurescope_runtime::config::{CrawlOptions, QueryPolicy};
use featurescope_runtime::{Engine, EngineConfig, ScanTarget};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "featurescope",
    about = "Featurescope — compatibility intelligence for web UIs",
    version,
    after_help = "Run 'featurescope <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Data directory (defaults to ~/.featurescope)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Crawl limits shared by `crawl` and `scan`.
#[derive(clap::Args, Debug, Clone)]
struct CrawlArgs {
    /// Maximum link depth from the seed page
    #[arg(long)]
    max_depth: Option<u32>,
    /// Maximum number of pages to fetch
    #[arg(long)]
    max_pages: Option<usize>,
    /// Concurrent page fetches
    #[arg(long)]
    workers: Option<usize>,
    /// Per-page timeout in milliseconds
    #[arg(long)]
    page_timeout: Option<u64>,
    /// How query strings take part in deduplication
    #[arg(long, value_enum)]
    query_policy: Option<QueryPolicy>,
    /// Only fetch stylesheets and scripts from the seed origin
    #[arg(long)]
    same_origin_assets: bool,
}

impl CrawlArgs {
    fn apply(&self, base: &CrawlOptions) -> CrawlOptions {
        let mut options = base.clone();
        if let Some(d) = self.max_depth {
            options.max_depth = d;
        }
        if let Some(p) = self.max_pages {
            options.max_pages = p.max(1);
        }
        if let Some(w) = self.workers {
            options.workers = w.clamp(1, 64);
        }
        if let Some(ms) = self.page_timeout {
            options.page_timeout = Duration::from_millis(ms);
        }
        if let Some(q) = self.query_policy {
            options.query_policy = q;
        }
        if self.same_origin_assets {
            options.cross_origin_assets = false;
        }
        options
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Re-fetch the browser support and market share feeds
    Refresh,
    /// List catalog features
    Features {
        /// Only features of this kind
        #[arg(long, value_enum)]
        kind: Option<FeatureKind>,
        /// Only features with this baseline status
        #[arg(long, value_enum)]
        status: Option<BaselineStatus>,
        /// Substring match on id or label
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one feature's support data
    Feature {
        /// Feature id (e.g. ":has()", "<dialog>", "Array.prototype.at")
        id: String,
    },
    /// Crawl a site without scoring it
    Crawl {
        /// Seed URL
        url: String,
        #[command(flatten)]
        limits: CrawlArgs,
    },
    /// Scan a live site or a source tree and record the report
    Scan {
        /// Seed URL of a live site
        #[arg(long, conflicts_with = "path", required_unless_present = "path")]
        url: Option<String>,
        /// Source tree or single file
        #[arg(long)]
        path: Option<PathBuf>,
        /// Name the report is recorded under
        #[arg(long)]
        ui: String,
        #[command(flatten)]
        limits: CrawlArgs,
        /// Exit with code 2 when the score is below this threshold
        #[arg(long)]
        min_compliance: Option<f64>,
        /// Also fail the gate when any deprecated feature is used
        #[arg(long)]
        fail_on_deprecated: bool,
    },
    /// Score one or more features for browser-support risk
    Risk {
        /// Feature ids
        #[arg(required = true)]
        features: Vec<String>,
    },
    /// Cross-UI compliance overview
    Heatmap,
    /// Recorded scans for one UI, oldest first
    History {
        /// UI name
        ui: String,
        /// Maximum number of scans
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Serve the REST API
    Serve {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Listen port
        #[arg(long, default_value = "7800")]
        port: u16,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "featurescope_runtime=debug" } else { "featurescope_runtime=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("FEATURESCOPE_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("FEATURESCOPE_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("FEATURESCOPE_VERBOSE", "1");
    }
    init_logging(cli.verbose, cli.log_json);

    let mut config = EngineConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let result = run(cli.command, config).await;

    // Consistent exit codes: 0=success, 1=error, 2=compliance gate failed
    match result {
        Ok(code) => {
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Err(e) => {
            if cli::output::is_json() {
                cli::output::print_json(&serde_json::json!({
                    "error": true,
                    "message": format!("{e:#}"),
                }));
            } else if !cli::output::is_quiet() {
                eprintln!("  Error: {e:#}");
            }
            std::process::exit(1);
        }
    }
}

async fn run(command: Commands, config: EngineConfig) -> Result<i32> {
    if let Commands::Completions { shell } = command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "featurescope", &mut std::io::stdout());
        return Ok(0);
    }

    let engine = Engine::open(config)?;
    match command {
        Commands::Refresh => cli::catalog_cmd::run_refresh(&engine).await?,
        Commands::Features { kind, status, search } => {
            cli::catalog_cmd::run_list(&engine, kind, status, search.as_deref()).await?
        }
        Commands::Feature { id } => cli::catalog_cmd::run_show(&engine, &id).await?,
        Commands::Crawl { url, limits } => {
            let options = limits.apply(&engine.config().crawl);
            cli::crawl_cmd::run(&engine, &url, options).await?
        }
        Commands::Scan {
            url,
            path,
            ui,
            limits,
            min_compliance,
            fail_on_deprecated,
        } => {
            let target = match (url, path) {
                (Some(url), _) => ScanTarget::live(ui, url)
                    .with_crawl_options(limits.apply(&engine.config().crawl)),
                (None, Some(path)) => ScanTarget::static_path(ui, path),
                (None, None) => anyhow::bail!("provide --url or --path"),
            };
            let gate = match (min_compliance, fail_on_deprecated) {
                (None, false) => None,
                (min, fail_on_deprecated) => Some(cli::scan_cmd::Gate {
                    min_compliance: min.unwrap_or(engine.config().min_compliance_score),
                    fail_on_deprecated,
                }),
            };
            return cli::scan_cmd::run(&engine, target, gate).await;
        }
        Commands::Risk { features } => cli::risk_cmd::run(&engine, &features).await?,
        Commands::Heatmap => cli::report_cmd::run_heatmap(&engine).await?,
        Commands::History { ui, limit } => cli::report_cmd::run_history(&engine, &ui, limit).await?,
        Commands::Serve { host, port } => cli::serve_cmd::run(engine, &host, port).await?,
        Commands::Doctor => cli::doctor::run(&engine).await?,
        Commands::Completions { .. } => {}
    }
    Ok(0)
}
