//! `featurescope refresh` / `features` / `feature <id>`: the compatibility catalog.

use crate::catalog::store::RefreshOutcome;
use crate::catalog::{BaselineStatus, FeatureKind};
use crate::cli::output;
use crate::engine::Engine;
use anyhow::{bail, Result};

/// Re-fetch both upstream feeds.
pub async fn run_refresh(engine: &Engine) -> Result<()> {
    output::note("Fetching compatibility and market-share feeds...");
    let outcome = engine.refresh().await;
    if output::is_json() {
        output::print_json(&outcome);
    }
    match outcome {
        RefreshOutcome::Refreshed { version, features } => {
            if !output::is_json() && !output::is_quiet() {
                println!("  Catalog v{version}: {features} features");
            }
            Ok(())
        }
        RefreshOutcome::InProgress => {
            output::note("A refresh is already running.");
            Ok(())
        }
        RefreshOutcome::Failed {
            reason,
            serving_version,
        } => match serving_version {
            Some(v) => {
                output::note(&format!("Refresh failed ({reason}); still serving v{v} (stale)."));
                Ok(())
            }
            None => bail!("refresh failed and no cached catalog exists: {reason}"),
        },
    }
}

/// List catalog features, optionally filtered.
pub async fn run_list(
    engine: &Engine,
    kind: Option<FeatureKind>,
    status: Option<BaselineStatus>,
    search: Option<&str>,
) -> Result<()> {
    super::ensure_catalog(engine).await?;
    let needle = search.map(str::to_lowercase);
    let features: Vec<_> = engine
        .features()?
        .into_iter()
        .filter(|f| kind.map_or(true, |k| f.kind == k))
        .filter(|f| status.map_or(true, |s| f.status == s))
        .filter(|f| {
            needle.as_deref().map_or(true, |n| {
                f.id.to_lowercase().contains(n) || f.label.to_lowercase().contains(n)
            })
        })
        .collect();

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "total": features.len(),
            "stale": engine.store().is_stale(),
            "features": features,
        }));
        return Ok(());
    }

    if features.is_empty() {
        output::note("No matching features.");
        return Ok(());
    }
    for f in &features {
        println!(
            "  {:<40} {:<7} {:>6.2}%  {}{}",
            f.id,
            f.kind.as_str(),
            f.global_support,
            f.status,
            if f.deprecated { "  (deprecated)" } else { "" }
        );
    }
    if !output::is_quiet() {
        println!();
        println!("  {} features", features.len());
    }
    Ok(())
}

/// Show one feature's support facts.
pub async fn run_show(engine: &Engine, feature_id: &str) -> Result<()> {
    super::ensure_catalog(engine).await?;
    let lookup = engine.lookup(feature_id)?;
    if output::is_json() {
        output::print_json(&lookup);
        return Ok(());
    }

    let f = &lookup.record;
    println!("  {} ({})", f.label, f.id);
    println!("  Kind:           {}", f.kind.as_str());
    println!("  Global support: {:.2}%", f.global_support);
    println!("  Status:         {}", f.status);
    if f.deprecated {
        println!("  Deprecated:     yes");
    }
    if !f.browsers.is_empty() {
        println!("  Since:");
        for (browser, version) in &f.browsers {
            println!("    {browser:<16} {version}");
        }
    }
    if !f.alternatives.is_empty() {
        println!("  Alternatives:   {}", f.alternatives.join(", "));
    }
    if let Some(url) = &f.mdn_url {
        println!("  Docs:           {url}");
    }
    if lookup.stale {
        println!();
        println!("  Note: catalog v{} is stale.", lookup.catalog_version);
    }
    Ok(())
}
