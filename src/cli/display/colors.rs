//! Status and coverage color mapping for CLI output.
//!
//! All coloring respects `NO_COLOR` env var automatically via the `colored` crate.

use colored::Colorize;

/// Returns a colored string for per-file and run status values.
///
/// Color scheme:
/// - Green:  merged, completed
/// - Yellow: skipped, nothing_to_do
/// - Red:    failed, model_failure, syntax_error
/// - Dim:    cancelled
pub fn colorize_status(status: &str) -> colored::ColoredString {
    match status.to_lowercase().as_str() {
        "merged" | "completed" | "valid" => status.green().bold(),
        "skipped" | "nothing_to_do" | "empty" => status.yellow(),
        "failed" | "model_failure" | "syntax_error" => status.red().bold(),
        "cancelled" => status.dimmed(),
        _ => status.white(),
    }
}

/// Coverage percentage colored by distance from the target.
pub fn colorize_coverage(pct: f64, target: f64) -> colored::ColoredString {
    let text = format!("{pct:.1}%");
    if pct >= target {
        text.green()
    } else if pct >= target / 2.0 {
        text.yellow()
    } else {
        text.red()
    }
}
