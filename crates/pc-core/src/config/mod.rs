//! Configuration management for Portcullis

pub mod defaults;
mod settings;
mod store;

pub use settings::{Settings, MIN_HEARTBEAT_INTERVAL};
pub use store::{ConfigStore, ConfigView, EnvLookup};

use crate::error::ConfigError;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Environment variable naming the installation root
pub const ROOT_ENV: &str = "PORTCULLIS_PATH";

/// Installation root: `$PORTCULLIS_PATH`, else the working directory
pub fn root_path() -> PathBuf {
    std::env::var_os(ROOT_ENV)
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("portcullis")
}

/// Startup file location when none is given on the command line.
///
/// `$PORTCULLIS_PATH/config.toml` if that variable is set, otherwise the
/// platform configuration directory.
pub fn default_config_path() -> PathBuf {
    match std::env::var_os(ROOT_ENV) {
        Some(root) => PathBuf::from(root).join("config.toml"),
        None => default_config_dir().join("config.toml"),
    }
}

/// Load the local startup values from a TOML file.
///
/// Only upper-case keys are kept; anything else in the file is treated as a
/// scratch value and ignored. A missing file is an error: the controller must
/// not start without a configuration source.
pub fn load_local(path: &Path) -> Result<Map<String, Value>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    parse_local(&content)
}

fn parse_local(content: &str) -> Result<Map<String, Value>, ConfigError> {
    let table: Value = toml::from_str(content)?;
    let Value::Object(entries) = table else {
        return Err(ConfigError::Invalid("top level must be a table".into()));
    };

    Ok(entries
        .into_iter()
        .filter(|(key, _)| is_config_key(key))
        .collect())
}

fn is_config_key(key: &str) -> bool {
    key.chars().any(|c| c.is_ascii_alphabetic()) && !key.chars().any(|c| c.is_ascii_lowercase())
}

/// Build the store for this process: built-in defaults anchored at
/// [`root_path`] plus the local file at `path`.
pub fn load_store(path: &Path) -> Result<ConfigStore, ConfigError> {
    let local = load_local(path)?;
    tracing::debug!(path = %path.display(), keys = local.len(), "Loaded local config");
    Ok(ConfigStore::new(defaults::builtin(&root_path()), local))
}
