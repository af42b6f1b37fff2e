//! Configuration management.

mod settings;

pub use settings::{AppConfig, AppSettings, LevelSource, LoggingConfig, SettingsError};

use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Environment variable prefix; `CHAN__ENGINE__STROKE__STRICT=false`
/// overrides `engine.stroke.strict`.
pub const ENV_PREFIX: &str = "CHAN";

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

fn finish(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<AppConfig, SettingsError> {
    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from file and environment.
pub fn load_config(path: &Path) -> Result<AppConfig, SettingsError> {
    finish(
        Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(environment()),
    )
}

/// Load configuration from TOML text and environment.
pub fn load_config_str(text: &str) -> Result<AppConfig, SettingsError> {
    finish(
        Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .add_source(environment()),
    )
}
