//! Replay command implementation.

use anyhow::{Context, Result};
use chrono::DateTime;

use chan_config::AppConfig;
use chan_engine::Snapshot;

use super::{open_chan, print_warnings, resolve_levels};
use crate::cli::ReplayArgs;

pub fn run(args: ReplayArgs, config: &AppConfig) -> Result<()> {
    let levels = resolve_levels(&args.levels, config)?;
    let mut engine = config.engine.clone();
    if let Some(skip) = args.skip {
        engine.replay.skip_steps = skip;
    }
    let every = args.every.max(1);

    let mut chan = open_chan(engine, &levels)?;
    let mut last_signal = None;
    for snapshot in chan.steps() {
        let snapshot = snapshot.context("Replay aborted")?;
        let newest = snapshot.levels[0].signals.last().map(|s| (s.line, s.types.clone()));
        if newest.is_some() && newest != last_signal {
            if let Some(signal) = snapshot.levels[0].signals.last() {
                let types: Vec<&str> = signal.types.iter().map(|t| t.name()).collect();
                println!(
                    "step {:>6}  {} {} at {}",
                    snapshot.step,
                    signal.side,
                    types.join(","),
                    format_time(signal.timestamp)
                );
            }
            last_signal = newest;
        }
        if snapshot.step % every == 0 {
            println!("{}", step_line(&snapshot));
        }
    }
    print_warnings(&chan);
    Ok(())
}

fn step_line(snapshot: &Snapshot) -> String {
    let time = snapshot.levels[0]
        .last_bar
        .map(|b| format_time(b.timestamp))
        .unwrap_or_default();
    let levels: Vec<String> = snapshot
        .levels
        .iter()
        .map(|l| {
            format!(
                "{}: bars {} strokes {}/{} segments {}/{} zones {}",
                l.timeframe, l.bars, l.final_strokes, l.strokes, l.final_segments, l.segments, l.zones
            )
        })
        .collect();
    format!("step {:>6}  {}  {}", snapshot.step, time, levels.join(" | "))
}

fn format_time(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}
