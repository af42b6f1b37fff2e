//! Validate configuration command.

use anyhow::Result;
use std::path::Path;

use chan_config::load_config;

pub fn run(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {:?}", config_path);

    match load_config(config_path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("App: {}", config.app.name);
            println!("Log level: {}", config.logging.level);
            for level in &config.levels {
                println!("Level {}: {}", level.timeframe, level.path.display());
            }
            println!();
            println!("{}", config.to_toml()?);
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
