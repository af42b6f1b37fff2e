//! CLI command implementations.

pub mod analyze;
pub mod replay;
pub mod validate;

use anyhow::{Context, Result};
use tracing::info;

use chan_config::{AppConfig, LevelSource};
use chan_data::CsvProvider;
use chan_engine::{Chan, ChanConfig};

use crate::cli::LevelArgs;

/// Levels from the command line, or from the configuration file when none
/// were given.
fn resolve_levels(args: &LevelArgs, config: &AppConfig) -> Result<Vec<LevelSource>> {
    let levels: Vec<LevelSource> = if args.levels.is_empty() {
        config.levels.clone()
    } else {
        args.levels
            .iter()
            .map(|l| LevelSource {
                timeframe: l.timeframe,
                path: l.path.clone(),
            })
            .collect()
    };
    if levels.is_empty() {
        anyhow::bail!("No levels configured. Add [[levels]] to the configuration or pass --level 1d=data/daily.csv");
    }
    Ok(levels)
}

/// Build the driver and open one CSV source per level.
fn open_chan(engine: ChanConfig, levels: &[LevelSource]) -> Result<Chan> {
    let timeframes: Vec<_> = levels.iter().map(|l| l.timeframe).collect();
    let provider = levels
        .iter()
        .fold(CsvProvider::new(), |p, l| p.with_level(l.timeframe, l.path.clone()));
    let mut chan = Chan::new(engine, &timeframes).context("Invalid engine configuration")?;
    chan.open(&provider).context("Failed to open bar sources")?;
    info!(levels = ?chan.timeframes(), "sources opened");
    Ok(chan)
}

fn print_warnings(chan: &Chan) {
    for warning in chan.warnings() {
        eprintln!("warning: {}", warning);
    }
}
