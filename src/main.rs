//! Market structure CLI application.

mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;

use cli::{Cli, Commands};
use logging::setup_logging;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::ValidateConfig = cli.command {
        return cli::commands::validate::run(&cli.config);
    }

    let config = chan_config::load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

    // Setup logging
    let level = cli
        .log_level
        .map(|l| l.as_str().to_string())
        .unwrap_or_else(|| config.logging.level.clone());
    let json = cli.json_logs || config.logging.format == "json";
    let _guard = setup_logging(&level, json, config.logging.file.as_deref().map(Path::new))?;

    // Execute command
    match cli.command {
        Commands::Analyze(args) => cli::commands::analyze::run(args, &config),
        Commands::Replay(args) => cli::commands::replay::run(args, &config),
        Commands::ValidateConfig => Ok(()),
    }
}
