//! Configuration loader for GenSX.
//!
//! Reads `config.toml` from the data directory (`~/.gensx/` by default) and
//! deserializes it into [`GensxConfig`]. Falls back to defaults when the file
//! is missing or malformed, then applies `GENSX_*` environment overrides.

use std::path::{Path, PathBuf};

use gensx_types::config::{GensxConfig, SinkKind};
use thiserror::Error;

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "GENSX_DATA_DIR";

/// Errors from interpreting configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: &'static str, message: String },
}

/// Resolve the data directory.
///
/// Priority: `GENSX_DATA_DIR`, then `~/.gensx`, then `./.gensx` when no home
/// directory can be determined.
pub fn resolve_data_dir() -> PathBuf {
    match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => return PathBuf::from(dir),
        _ => {}
    }
    dirs::home_dir()
        .map(|home| home.join(".gensx"))
        .unwrap_or_else(|| PathBuf::from(".gensx"))
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GensxConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_config(data_dir: &Path) -> GensxConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GensxConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GensxConfig::default();
        }
    };

    match toml::from_str::<GensxConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GensxConfig::default()
        }
    }
}

/// Apply `GENSX_*` overrides from the process environment.
pub fn apply_env_overrides(config: &mut GensxConfig) -> Result<(), ConfigError> {
    apply_env_overrides_with(config, |var| std::env::var(var).ok())
}

/// Apply overrides read through `lookup`; empty values are ignored.
pub fn apply_env_overrides_with<F>(config: &mut GensxConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());

    if let Some(value) = get("GENSX_CHECKPOINTS") {
        config.checkpoints.enabled = parse_bool("GENSX_CHECKPOINTS", &value)?;
    }
    if let Some(value) = get("GENSX_CHECKPOINT_SINK") {
        config.checkpoints.sink = value
            .parse::<SinkKind>()
            .map_err(|message| ConfigError::InvalidValue {
                var: "GENSX_CHECKPOINT_SINK",
                message,
            })?;
    }
    if let Some(value) = get("GENSX_API_BASE_URL") {
        config.api.base_url = value;
    }
    if let Some(value) = get("GENSX_CONSOLE_URL") {
        config.api.console_url = value;
    }
    if let Some(value) = get("GENSX_ORG") {
        config.api.org = Some(value);
    }
    if let Some(value) = get("GENSX_PROJECT") {
        config.api.project = Some(value);
    }
    if let Some(value) = get("GENSX_ENV") {
        config.api.environment = value;
    }
    if let Some(value) = get("GENSX_API_KEY") {
        config.api.api_key = Some(value);
    }
    if let Some(value) = get("GENSX_DATABASE_URL") {
        config.storage.database_url = Some(value);
    }
    Ok(())
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            var,
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}
