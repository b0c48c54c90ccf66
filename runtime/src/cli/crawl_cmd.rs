//! `featurescope crawl <url>`: walk a site without scoring it.

use crate::cli::output;
use crate::config::CrawlOptions;
use crate::crawler::Termination;
use crate::engine::Engine;
use anyhow::Result;

pub async fn run(engine: &Engine, url: &str, options: CrawlOptions) -> Result<()> {
    output::note(&format!(
        "Crawling {url} (depth {}, up to {} pages)...",
        options.max_depth, options.max_pages
    ));
    let cancel = super::ctrl_c_token();
    let outcome = engine.crawl(url, Some(options), &cancel).await?;

    if output::is_json() {
        // Page bodies are large; report the surface, not the content
        let pages: Vec<_> = outcome
            .results
            .iter()
            .map(|p| {
                serde_json::json!({
                    "url": p.url,
                    "depth": p.depth,
                    "css_blocks": p.css.len(),
                    "script_blocks": p.scripts.len(),
                    "links": p.links.len(),
                })
            })
            .collect();
        output::print_json(&serde_json::json!({
            "seed": url,
            "termination": outcome.termination,
            "pages": pages,
            "failures": outcome.failures,
        }));
        return Ok(());
    }

    for page in &outcome.results {
        println!(
            "  [{}] {}  css:{} js:{} links:{}",
            page.depth,
            page.url,
            page.css.len(),
            page.scripts.len(),
            page.links.len()
        );
    }
    for failure in &outcome.failures {
        println!("  [{}] {}  FAILED: {}", failure.depth, failure.url, failure.error);
    }
    if !output::is_quiet() {
        println!();
        let why = match outcome.termination {
            Termination::Exhausted => "site exhausted",
            Termination::BudgetExceeded => "page budget reached",
        };
        println!(
            "  {} pages, {} failures ({why})",
            outcome.results.len(),
            outcome.failures.len()
        );
    }
    Ok(())
}
