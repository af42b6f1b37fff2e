//! CLI definitions.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use chan_core::Timeframe;

#[derive(Parser)]
#[command(name = "chan")]
#[command(author, version, about = "Multi-level market structure analysis")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", env = "CHAN_CONFIG")]
    pub config: PathBuf,

    /// Log level (overrides the configuration file)
    #[arg(short, long)]
    pub log_level: Option<LogLevel>,

    /// Enable JSON log format
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load every level and print the resulting structure
    Analyze(AnalyzeArgs),
    /// Replay the coarsest level bar by bar
    Replay(ReplayArgs),
    /// Validate configuration
    ValidateConfig,
}

/// A `TIMEFRAME=PATH` pair.
#[derive(Debug, Clone)]
pub struct LevelArg {
    pub timeframe: Timeframe,
    pub path: PathBuf,
}

fn parse_level(s: &str) -> Result<LevelArg, String> {
    let (tf, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected TIMEFRAME=PATH, got '{}'", s))?;
    Ok(LevelArg {
        timeframe: tf.parse()?,
        path: PathBuf::from(path),
    })
}

#[derive(clap::Args)]
pub struct LevelArgs {
    /// Bar file per level, coarsest first (e.g. --level 1d=data/daily.csv);
    /// replaces the levels of the configuration file
    #[arg(short = 'L', long = "level", value_parser = parse_level)]
    pub levels: Vec<LevelArg>,
}

#[derive(clap::Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub levels: LevelArgs,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    pub output: String,

    /// Save the snapshot as JSON
    #[arg(long)]
    pub save: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub levels: LevelArgs,

    /// Coarsest-level bars to consume before printing
    #[arg(long)]
    pub skip: Option<usize>,

    /// Print every n-th step
    #[arg(long, default_value = "1")]
    pub every: usize,
}
