//! Configuration structures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use chan_core::{ChanError, Timeframe};
use chan_engine::ChanConfig;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid engine configuration: {0}")]
    Engine(#[from] ChanError),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: ChanConfig,
    /// Bar files, coarsest level first
    #[serde(default)]
    pub levels: Vec<LevelSource>,
}

impl AppConfig {
    /// Configured timeframes in file order.
    pub fn timeframes(&self) -> Vec<Timeframe> {
        self.levels.iter().map(|l| l.timeframe).collect()
    }

    /// Reject engine values and level lists the engine would refuse.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.engine.validate()?;
        let timeframes = self.timeframes();
        if let Some(pair) = timeframes.windows(2).find(|w| w[0] <= w[1]) {
            return Err(ChanError::Config(format!(
                "levels must be listed coarsest first, got {} before {}",
                pair[0], pair[1]
            ))
            .into());
        }
        Ok(())
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// General app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub name: String,
    /// Label printed with results
    pub instrument: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "chan".to_string(),
            instrument: String::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

/// Bar file of one level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSource {
    pub timeframe: Timeframe,
    pub path: PathBuf,
}
