//! Output helpers shared by every subcommand.
//!
//! Global flags are parsed once in `main` and exported as environment
//! variables so any module can check them without threading a config value
//! through.

use serde::Serialize;

fn flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

/// `--json`: machine-readable output only.
pub fn is_json() -> bool {
    flag("FEATURESCOPE_JSON")
}

/// `--quiet`: suppress non-essential output.
pub fn is_quiet() -> bool {
    flag("FEATURESCOPE_QUIET")
}

pub fn is_verbose() -> bool {
    flag("FEATURESCOPE_VERBOSE")
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: failed to serialize output: {e}"),
    }
}

/// Ten-cell bar for a 0–100 score.
pub fn score_bar(score: f64) -> String {
    let filled = ((score.clamp(0.0, 100.0) / 10.0).round()) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled))
}

/// Ten-cell bar for a 0–10 risk level.
pub fn risk_bar(level: f64) -> String {
    score_bar(level * 10.0)
}

/// Status line on stderr unless `--quiet` or `--json`.
pub fn note(message: &str) {
    if !is_quiet() && !is_json() {
        eprintln!("  {message}");
    }
}
