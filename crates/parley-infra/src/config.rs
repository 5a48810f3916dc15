//! Configuration loader for parley.
//!
//! Reads `parley.toml` from a configuration directory and deserializes it
//! into [`ParleyConfig`]. The lenient loader falls back to defaults when the
//! file is missing, malformed or invalid; the strict loader reports why.

use std::path::Path;

use parley_types::config::ParleyConfig;
use parley_types::error::ConfigError;

/// File name looked up inside the configuration directory.
pub const CONFIG_FILE: &str = "parley.toml";

/// Load configuration from `{dir}/parley.toml`.
///
/// - If the file does not exist, returns [`ParleyConfig::default()`] (unbounded).
/// - If the file cannot be read or parsed, logs a warning and returns the default.
/// - If the parsed values fail validation, logs a warning and returns the default.
pub async fn load_config(dir: &Path) -> ParleyConfig {
    let config_path = dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return ParleyConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return ParleyConfig::default();
        }
    };

    let config = match toml::from_str::<ParleyConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            return ParleyConfig::default();
        }
    };

    match config.validate() {
        Ok(()) => config,
        Err(err) => {
            tracing::warn!("Rejected {}: {err}, using defaults", config_path.display());
            ParleyConfig::default()
        }
    }
}

/// Load and validate configuration from an explicit file path.
pub async fn load_config_strict(path: &Path) -> Result<ParleyConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
    let config = toml::from_str::<ParleyConfig>(&content)
        .map_err(|err| ConfigError::Parse(format!("{}: {err}", path.display())))?;
    config.validate()?;
    Ok(config)
}
