//! CLI subcommand implementations for the `featurescope` binary.

pub mod catalog_cmd;
pub mod crawl_cmd;
pub mod doctor;
pub mod output;
pub mod report_cmd;
pub mod risk_cmd;
pub mod scan_cmd;
pub mod serve_cmd;

use crate::engine::Engine;
use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// Make sure a catalog snapshot exists, refreshing once if none is cached.
pub async fn ensure_catalog(engine: &Engine) -> Result<()> {
    if engine.catalog_status().version.is_some() {
        return Ok(());
    }
    output::note("No cached compatibility data; fetching feeds...");
    match engine.refresh().await {
        crate::catalog::store::RefreshOutcome::Failed { reason, .. } => {
            anyhow::bail!("could not load compatibility data: {reason}")
        }
        _ => Ok(()),
    }
}

/// Cancellation token that fires on Ctrl-C.
pub fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            output::note("Interrupted; stopping after in-flight pages...");
            child.cancel();
        }
    });
    token
}
