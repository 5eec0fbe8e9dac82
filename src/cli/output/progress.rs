//! Progress bar utilities using indicatif for terminal output
//!
//! Bars draw to stderr, so they never mix with `--json` output.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::application::ProgressEvent;
use crate::domain::models::OutcomeStatus;

/// Style templates for different progress bar types
const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";
const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner:.green} {msg}";

/// Progress bar characters for visual effect
const PROGRESS_CHARS: &str = "█▓▒░ ";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Create a standard progress bar
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(PROGRESS_CHARS);
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a spinner for indeterminate operations
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_CHARS);
    spinner.set_style(style);
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Extension trait for ProgressBar to add common utility methods
pub trait ProgressBarExt {
    /// Finish with a success message (green checkmark)
    fn finish_success(&self, message: impl Into<String>);

    /// Finish with a warning message (yellow !)
    fn finish_warning(&self, message: impl Into<String>);
}

impl ProgressBarExt for ProgressBar {
    fn finish_success(&self, message: impl Into<String>) {
        self.finish_with_message(format!("✓ {}", message.into()));
    }

    fn finish_warning(&self, message: impl Into<String>) {
        self.finish_with_message(format!("! {}", message.into()));
    }
}

/// Render pipeline progress events until the sender side closes.
///
/// Returns the number of merged candidates seen.
pub async fn drive_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) -> usize {
    let spinner = create_spinner("Selecting candidates");
    let mut bar: Option<ProgressBar> = None;
    let mut merged = 0;

    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Started { total } => {
                spinner.finish_and_clear();
                bar = Some(create_progress_bar(total as u64));
            }
            ProgressEvent::CandidateFinished {
                path,
                status,
                tests_added,
            } => {
                if status == OutcomeStatus::Merged {
                    merged += 1;
                }
                if let Some(bar) = &bar {
                    bar.set_message(format!("{path}: {status} (+{tests_added})"));
                    bar.inc(1);
                }
            }
        }
    }

    match bar {
        Some(bar) if merged > 0 => bar.finish_success(format!("{merged} file(s) received new tests")),
        Some(bar) => bar.finish_warning("no tests merged"),
        None => spinner.finish_and_clear(),
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drive_progress_counts_merged() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ProgressEvent::Started { total: 2 }).unwrap();
        tx.send(ProgressEvent::CandidateFinished {
            path: "a.py".to_string(),
            status: OutcomeStatus::Merged,
            tests_added: 2,
        })
        .unwrap();
        tx.send(ProgressEvent::CandidateFinished {
            path: "b.py".to_string(),
            status: OutcomeStatus::Skipped,
            tests_added: 0,
        })
        .unwrap();
        drop(tx);

        assert_eq!(drive_progress(rx).await, 1);
    }
}
