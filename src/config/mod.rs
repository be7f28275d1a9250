//! Configuration system - YAML-based config loading.
//!
//! Configuration is loaded in layers: built-in defaults, then
//! config.yml from the config directory, then environment-variable
//! overrides. The result is validated before the server starts.

pub mod settings;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

pub use settings::*;

/// Load configuration from YAML files.
///
/// The config directory is resolved from the explicit argument, the
/// `SNMPFARM_HOME` environment variable, or the user's home directory,
/// in that order.
pub fn load_config(config_dir: Option<&Path>) -> Result<FarmConfig> {
    let home = config_dir
        .map(PathBuf::from)
        .or_else(|| std::env::var("SNMPFARM_HOME").ok().map(PathBuf::from))
        .or_else(dirs::home_dir)
        .context("Cannot determine config directory")?;

    let config_path = home.join("config.yml");
    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config = serde_yaml::from_str::<FarmConfig>(&contents)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        info!("Loaded config from {}", config_path.display());
        config
    } else {
        FarmConfig::default()
    };

    // Walk files are usually named relative to the config directory.
    for dt in &mut config.device_types {
        if dt.walk_file.is_relative() {
            dt.walk_file = home.join(&dt.walk_file);
        }
    }

    config.apply_env_overrides();
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    Ok(config)
}
