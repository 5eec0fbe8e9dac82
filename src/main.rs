//! Covgen CLI entry point.

use clap::Parser;

use covgen::cli::commands::{self, init_logging, load_config};
use covgen::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        covgen::cli::handle_error(err, json);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let base = cli.base_overrides();
    let overrides = match &cli.command {
        Commands::Generate(args) => args.overrides(base),
        Commands::Select(args) => args.overrides(base),
        Commands::Inspect(_) => base,
    };
    let config = load_config(cli.config.as_deref(), &overrides)?;
    let _logger = init_logging(&config)?;

    match cli.command {
        Commands::Generate(args) => commands::generate::execute(args, config, cli.json).await,
        Commands::Select(args) => commands::select::execute(&args, &config, cli.json),
        Commands::Inspect(args) => commands::inspect::execute(args, cli.json).await,
    }
}
