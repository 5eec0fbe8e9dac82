//! CLI output formatting module
//!
//! Progress display for long-running commands.

pub mod progress;

pub use progress::{create_progress_bar, create_spinner, drive_progress, ProgressBarExt};
