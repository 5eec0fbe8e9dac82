//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::infrastructure::config::{ConfigOverrides, LoggingOverrides, ModelOverrides};

/// Command line of the `covgen` binary
#[derive(Parser)]
#[command(name = "covgen")]
#[command(about = "Generate unit tests for the least covered files of a repository", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file layered over .covgen/config.yaml
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

/// Subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Generate tests for the least covered files and merge them
    Generate(GenerateArgs),

    /// Rank candidate files without contacting the model
    Select(SelectArgs),

    /// Print the code structure extracted from one source file
    Inspect(InspectArgs),
}

/// Candidate selection flags shared by `generate` and `select`
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Maximum number of files to process
    #[arg(short = 'n', long)]
    pub max_files: Option<usize>,

    /// Files at or above this coverage percentage are skipped
    #[arg(short, long)]
    pub target_coverage: Option<f64>,

    /// Only consider these languages (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub languages: Vec<String>,

    /// Glob patterns of paths to exclude (repeatable)
    #[arg(short, long = "exclude")]
    pub exclude: Vec<String>,

    /// Repository root the coverage paths are relative to
    #[arg(long, value_name = "DIR")]
    pub repo_root: Option<PathBuf>,
}

/// Arguments of `covgen generate`
#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Coverage report (JSON)
    pub coverage: PathBuf,

    /// Candidate selection
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Test framework, or "auto" to detect per file
    #[arg(short = 'f', long)]
    pub test_framework: Option<String>,

    /// Model identifier
    #[arg(short, long)]
    pub model: Option<String>,

    /// Chat completions endpoint base URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Files processed in parallel
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Stop dispatching new files after this many seconds
    #[arg(long, value_name = "SECS")]
    pub run_timeout: Option<u64>,

    /// Directory receiving summary.json and changes.patch
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Report what would change without writing test files
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments of `covgen select`
#[derive(Args, Debug, Clone)]
pub struct SelectArgs {
    /// Coverage report (JSON)
    pub coverage: PathBuf,

    /// Candidate selection
    #[command(flatten)]
    pub selection: SelectionArgs,
}

/// Arguments of `covgen inspect`
#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Source file to inspect
    pub file: PathBuf,

    /// Language override when the extension is ambiguous
    #[arg(short, long)]
    pub language: Option<String>,
}

impl SelectionArgs {
    fn apply_to(&self, overrides: &mut ConfigOverrides) {
        overrides.max_files = self.max_files;
        overrides.target_coverage = self.target_coverage;
        if !self.languages.is_empty() {
            overrides.languages = Some(self.languages.clone());
        }
        if !self.exclude.is_empty() {
            overrides.exclude_patterns = Some(self.exclude.clone());
        }
        overrides.repo_root.clone_from(&self.repo_root);
    }
}

impl Cli {
    /// Overrides shared by every command
    pub fn base_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            logging: self.log_level.as_ref().map(|level| LoggingOverrides {
                level: Some(level.clone()),
                format: None,
            }),
            ..ConfigOverrides::default()
        }
    }
}

impl GenerateArgs {
    /// Layer the generate flags over `base`
    pub fn overrides(&self, base: ConfigOverrides) -> ConfigOverrides {
        let mut overrides = base;
        self.selection.apply_to(&mut overrides);
        overrides.test_framework.clone_from(&self.test_framework);
        overrides.concurrency = self.concurrency;
        overrides.run_timeout_secs = self.run_timeout;
        overrides.output_dir.clone_from(&self.output_dir);
        if self.dry_run {
            overrides.apply = Some(false);
        }
        if self.model.is_some() || self.endpoint.is_some() {
            overrides.model = Some(ModelOverrides {
                id: self.model.clone(),
                endpoint: self.endpoint.clone(),
            });
        }
        overrides
    }
}

impl SelectArgs {
    /// Layer the selection flags over `base`
    pub fn overrides(&self, base: ConfigOverrides) -> ConfigOverrides {
        let mut overrides = base;
        self.selection.apply_to(&mut overrides);
        overrides
    }
}
