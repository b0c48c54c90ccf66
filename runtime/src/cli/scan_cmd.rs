//! `featurescope scan`: scan a live site or a source tree and record the
//! report, optionally gating on a minimum compliance score.

use crate::cli::output;
use crate::compliance::gate::check_compliance;
use crate::compliance::ScanReport;
use crate::engine::{Engine, ScanTarget};
use crate::risk::RiskCategory;
use anyhow::Result;

/// Gate settings from `--min-compliance` / `--fail-on-deprecated`.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    pub min_compliance: f64,
    pub fail_on_deprecated: bool,
}

/// Returns the process exit code: 0 when the gate passes (or no gate was
/// requested), 2 when it fails.
pub async fn run(engine: &Engine, target: ScanTarget, gate: Option<Gate>) -> Result<i32> {
    super::ensure_catalog(engine).await?;
    output::note(&format!("Scanning '{}' ({})...", target.ui_name, target.describe()));

    let cancel = super::ctrl_c_token();
    let report = engine.scan(target, &cancel).await?;
    let outcome = gate.map(|g| check_compliance(&report, g.min_compliance, g.fail_on_deprecated));

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "report": report,
            "gate": outcome,
        }));
    } else {
        print_report(&report);
        if let Some(o) = &outcome {
            println!();
            for line in o.message.lines() {
                println!("  {line}");
            }
        }
    }

    Ok(match outcome {
        Some(o) if !o.passed => 2,
        _ => 0,
    })
}

fn print_report(report: &ScanReport) {
    println!(
        "  {}  {} {:.2}%",
        report.ui_name,
        output::score_bar(report.compliance_score),
        report.compliance_score
    );
    println!(
        "  {} pages, {} features ({} baseline), catalog v{}{}",
        report.pages_scanned,
        report.total_features,
        report.baseline_compliant,
        report.catalog_version,
        if report.catalog_stale { " (stale)" } else { "" }
    );
    if output::is_quiet() {
        return;
    }

    let features = report.features();
    if features.is_empty() {
        return;
    }
    println!();
    let mut rows: Vec<_> = features.into_values().collect();
    rows.sort_by(|a, b| b.risk_level.total_cmp(&a.risk_level));
    for risk in rows {
        let marker = match risk.category {
            RiskCategory::High => "!!",
            RiskCategory::Medium => " !",
            RiskCategory::Low => "  ",
        };
        println!(
            "  {marker} {:<36} {} {:>5.2}  {:>6.2}%{}",
            risk.feature_id,
            output::risk_bar(risk.risk_level),
            risk.risk_level,
            risk.global_support,
            if risk.deprecated { "  deprecated" } else { "" }
        );
        if output::is_verbose() {
            println!("       {}", risk.recommendation);
        }
    }
}
