//! Configuration types for the GenSX engine.
//!
//! `GensxConfig` is the top-level `config.toml` controlling checkpoint
//! capture, the hosted API connection, and local storage. Every field has a
//! default so an empty file (or no file) is a valid configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Top-level configuration, loaded from `{data_dir}/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GensxConfig {
    #[serde(default)]
    pub checkpoints: CheckpointConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

/// Checkpoint capture settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Process-wide capture flag. When false, no node is recorded and no
    /// sink is ever called.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Debounce window between the first unflushed update and the flush.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Where snapshots go.
    #[serde(default)]
    pub sink: SinkKind,
}

fn default_enabled() -> bool {
    true
}

fn default_flush_interval_ms() -> u64 {
    10
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            flush_interval_ms: default_flush_interval_ms(),
            sink: SinkKind::default(),
        }
    }
}

impl CheckpointConfig {
    /// Capture switched off entirely.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn flush_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.flush_interval_ms)
    }
}

/// Persistence target for checkpoint snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Local SQLite store under the data directory.
    #[default]
    Sqlite,
    /// Hosted GenSX API.
    Api,
    /// Discard snapshots.
    None,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKind::Sqlite => write!(f, "sqlite"),
            SinkKind::Api => write!(f, "api"),
            SinkKind::None => write!(f, "none"),
        }
    }
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(SinkKind::Sqlite),
            "api" => Ok(SinkKind::Api),
            "none" => Ok(SinkKind::None),
            other => Err(format!("unknown checkpoint sink: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Hosted API
// ---------------------------------------------------------------------------

/// Connection settings for the hosted checkpoint API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Web console, used to print a link to a stored execution.
    #[serde(default = "default_console_url")]
    pub console_url: String,

    #[serde(default)]
    pub org: Option<String>,

    #[serde(default)]
    pub project: Option<String>,

    #[serde(default = "default_environment")]
    pub environment: String,

    /// Never written back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    "https://api.gensx.com".to_string()
}

fn default_console_url() -> String {
    "https://app.gensx.com".to_string()
}

fn default_environment() -> String {
    "default".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            console_url: default_console_url(),
            org: None,
            project: None,
            environment: default_environment(),
            api_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Local storage settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite URL. Defaults to `gensx.db` in the data directory.
    #[serde(default)]
    pub database_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = GensxConfig::default();
        assert!(config.checkpoints.enabled);
        assert_eq!(config.checkpoints.flush_interval_ms, 10);
        assert_eq!(config.checkpoints.sink, SinkKind::Sqlite);
        assert_eq!(config.api.base_url, "https://api.gensx.com");
        assert_eq!(config.api.environment, "default");
        assert!(config.storage.database_url.is_none());
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: GensxConfig = toml::from_str("").unwrap();
        assert_eq!(config, GensxConfig::default());
    }

    #[test]
    fn test_config_deserialize_with_values() {
        let toml_str = r#"
[checkpoints]
enabled = false
flush_interval_ms = 50
sink = "api"

[api]
org = "acme"
project = "research"
api_key = "sk-test"
"#;
        let config: GensxConfig = toml::from_str(toml_str).unwrap();
        assert!(!config.checkpoints.enabled);
        assert_eq!(config.checkpoints.flush_interval_ms, 50);
        assert_eq!(config.checkpoints.sink, SinkKind::Api);
        assert_eq!(config.api.org.as_deref(), Some("acme"));
        assert_eq!(config.api.project.as_deref(), Some("research"));
        assert_eq!(config.api.api_key.as_deref(), Some("sk-test"));
        // Unspecified fields keep their defaults.
        assert_eq!(config.api.base_url, "https://api.gensx.com");
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = GensxConfig::default();
        config.api.api_key = Some("sk-secret".to_string());
        let out = toml::to_string(&config).unwrap();
        assert!(!out.contains("sk-secret"));
    }

    #[test]
    fn test_sink_kind_from_str() {
        assert_eq!("API".parse::<SinkKind>().unwrap(), SinkKind::Api);
        assert_eq!(" sqlite ".parse::<SinkKind>().unwrap(), SinkKind::Sqlite);
        assert_eq!("none".parse::<SinkKind>().unwrap(), SinkKind::None);
        assert!("s3".parse::<SinkKind>().is_err());
    }
}
