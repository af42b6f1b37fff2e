//! Analyze command implementation.

use anyhow::{Context, Result};
use tracing::info;

use chan_config::AppConfig;

use super::{open_chan, print_warnings, resolve_levels};
use crate::cli::AnalyzeArgs;

pub fn run(args: AnalyzeArgs, config: &AppConfig) -> Result<()> {
    let levels = resolve_levels(&args.levels, config)?;
    info!(instrument = %config.app.instrument, levels = levels.len(), "Starting analysis");

    let mut chan = open_chan(config.engine.clone(), &levels)?;
    let snapshot = chan.drain().context("Failed to load bars")?;
    print_warnings(&chan);

    match args.output.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        _ => {
            if !config.app.instrument.is_empty() {
                println!("{}", config.app.instrument);
            }
            println!("{}", snapshot.summary());
        }
    }

    if let Some(save_path) = &args.save {
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(save_path, json)
            .with_context(|| format!("Failed to write {}", save_path.display()))?;
        info!("Results saved to {:?}", save_path);
    }

    Ok(())
}
