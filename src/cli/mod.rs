//! Command-line interface
//!
//! - `types`: clap argument definitions
//! - `commands`: one handler per subcommand
//! - `display`: tables, colors and the human/JSON output switch
//! - `output`: progress rendering

pub mod commands;
pub mod display;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};

/// Report a command failure and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": chain,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        use colored::Colorize;
        eprintln!("{} {:#}", "error:".red().bold(), err);
    }
    std::process::exit(1)
}
