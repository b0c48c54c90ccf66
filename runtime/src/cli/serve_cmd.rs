//! `featurescope serve`: run the REST API in the foreground.

use crate::cli::output;
use crate::engine::Engine;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

/// Serve until Ctrl-C.
pub async fn run(engine: Engine, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    if engine.catalog_status().version.is_none() {
        output::note("No cached compatibility data; run `featurescope refresh` or POST /api/v1/refresh.");
    }
    output::note(&format!("Serving on http://{addr} (Ctrl-C to stop)"));

    let engine = Arc::new(engine);
    tokio::select! {
        result = crate::rest::start(addr, engine) => result,
        _ = tokio::signal::ctrl_c() => {
            output::note("Shutting down.");
            Ok(())
        }
    }
}
