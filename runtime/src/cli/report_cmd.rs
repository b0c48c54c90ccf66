//! `featurescope heatmap` / `history <ui>`: views over recorded scans.

use crate::cli::output;
use crate::engine::Engine;
use anyhow::Result;

pub async fn run_heatmap(engine: &Engine) -> Result<()> {
    let heatmap = engine.heatmap()?;
    if output::is_json() {
        output::print_json(&heatmap);
        return Ok(());
    }
    if heatmap.total_uis == 0 {
        output::note("No scans recorded yet. Run `featurescope scan` first.");
        return Ok(());
    }

    for ui in &heatmap.uis {
        println!(
            "  {:<24} {} {:>6.2}%  high-risk:{} deprecated:{}",
            ui.ui_name,
            output::score_bar(ui.compliance_score),
            ui.compliance_score,
            ui.high_risk_features.len(),
            ui.deprecated_features.len()
        );
    }
    println!();
    println!(
        "  {} UIs, average {:.2}%, {} below {:.0}%, {} with high-risk features",
        heatmap.total_uis,
        heatmap.average_compliance,
        heatmap.low_compliance_uis,
        heatmap.low_compliance_threshold,
        heatmap.high_risk_uis
    );
    if let Some(worst) = &heatmap.worst_performer {
        println!("  Worst performer: {worst}");
    }
    if !heatmap.deprecated_features.is_empty() {
        println!("  Deprecated in use: {}", heatmap.deprecated_features.join(", "));
    }
    Ok(())
}

pub async fn run_history(engine: &Engine, ui_name: &str, limit: Option<usize>) -> Result<()> {
    let history = engine.history(ui_name, limit)?;
    if output::is_json() {
        output::print_json(&serde_json::json!({
            "ui_name": ui_name,
            "scans": history,
        }));
        return Ok(());
    }
    if history.is_empty() {
        output::note(&format!("No scans recorded for '{ui_name}'."));
        return Ok(());
    }

    for report in &history {
        println!(
            "  {}  {} {:>6.2}%  features:{} high-risk:{}  {}",
            report.scanned_at.format("%Y-%m-%d %H:%M"),
            output::score_bar(report.compliance_score),
            report.compliance_score,
            report.total_features,
            report.high_risk_features.len(),
            report.id
        );
    }
    Ok(())
}
