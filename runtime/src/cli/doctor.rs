//! `featurescope doctor`: environment readiness check.

use crate::cli::output;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;

/// Check the browser, data directory and cached catalog.
pub async fn run(engine: &Engine) -> Result<()> {
    let config: &EngineConfig = engine.config();
    let chromium = find_chromium();
    let data_dir_ok = std::fs::create_dir_all(&config.data_dir).is_ok();
    let status = engine.catalog_status();

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "data_dir": config.data_dir.display().to_string(),
            "data_dir_writable": data_dir_ok,
            "catalog": status,
            "crawl": {
                "max_depth": config.crawl.max_depth,
                "max_pages": config.crawl.max_pages,
                "workers": config.crawl.workers,
                "page_timeout_ms": config.crawl.page_timeout.as_millis() as u64,
            },
        }));
        return Ok(());
    }

    println!("Featurescope Doctor");
    println!("===================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Crawls fall back to plain HTTP (no script rendering). \
             Set FEATURESCOPE_CHROMIUM_PATH to use a browser."
        ),
    }

    if data_dir_ok {
        println!("[OK] Data directory: {}", config.data_dir.display());
    } else {
        println!("[!!] Data directory not writable: {}", config.data_dir.display());
    }

    match status.version {
        Some(v) if status.stale => {
            println!("[!!] Catalog v{v} ({} features) is stale. Run `featurescope refresh`.", status.features)
        }
        Some(v) => println!("[OK] Catalog v{v}: {} features", status.features),
        None => println!("[!!] No cached catalog. Run `featurescope refresh`."),
    }

    println!();
    println!(
        "Crawl: depth {}, {} pages, {} workers, {}ms per page",
        config.crawl.max_depth,
        config.crawl.max_pages,
        config.crawl.workers,
        config.crawl.page_timeout.as_millis()
    );
    println!(
        "Status: {}",
        if data_dir_ok && status.version.is_some() { "READY" } else { "NOT READY" }
    );
    Ok(())
}
