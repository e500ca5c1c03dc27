//! Configuration loading from the file system

use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use super::defaults::{CONFIG_FILE_NAME, DEFAULT_DATA_DIR};
use super::types::Config;

/// Default config location (~/.clipkeep/config.json)
pub fn default_config_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde(DEFAULT_DATA_DIR).as_ref()).join(CONFIG_FILE_NAME)
}

/// Load configuration from ~/.clipkeep/config.json
///
/// Returns Config::default() if the file is missing or invalid.
pub fn load_config() -> Config {
    load_config_from(&default_config_path())
}

/// Load configuration from an explicit path.
///
/// Returns Config::default() if any step fails.
#[instrument(name = "load_config")]
pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Config::default();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to read config, using defaults");
            return Config::default();
        }
    };

    match serde_json::from_str::<Config>(&content) {
        Ok(config) => {
            info!(path = %path.display(), "Successfully loaded config");
            config
        }
        Err(e) => {
            // Unknown keys are ignored, so this is a type or syntax error
            let hint = if e.to_string().contains("invalid type") {
                "\n\nHint: numeric settings must be numbers, e.g. \"pollingIntervalSeconds\": 0.5"
            } else {
                ""
            };
            warn!(
                error = %e,
                path = %path.display(),
                hint = %hint,
                "Failed to parse config JSON, using defaults"
            );
            Config::default()
        }
    }
}
