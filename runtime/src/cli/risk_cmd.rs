//! `featurescope risk <feature>...`: risk assessment for features.

use crate::cli::output;
use crate::engine::Engine;
use anyhow::Result;

pub async fn run(engine: &Engine, features: &[String]) -> Result<()> {
    super::ensure_catalog(engine).await?;

    // A single explicit lookup reports unknown features as errors
    let assessments = if let [single] = features {
        vec![engine.risk(single)?]
    } else {
        engine.risk_batch(features)?
    };

    if output::is_json() {
        if let [only] = assessments.as_slice() {
            output::print_json(only);
        } else {
            output::print_json(&serde_json::json!({ "features": assessments }));
        }
        return Ok(());
    }

    for a in &assessments {
        println!(
            "  {:<36} {} {:>5.2} {:<6}  {:>6.2}%  {}",
            a.feature_id,
            output::risk_bar(a.risk_level),
            a.risk_level,
            a.category,
            a.global_support,
            a.status
        );
        if !output::is_quiet() {
            println!("       {}", a.recommendation);
        }
    }
    if assessments.iter().any(|a| a.stale) {
        output::note("Compatibility data is stale; run `featurescope refresh`.");
    }
    Ok(())
}
