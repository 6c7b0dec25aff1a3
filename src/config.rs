//! Configuration for the input relay.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collector endpoint receiving `{"events": [...]}` batches
    pub webhook_url: String,

    /// Seconds between send cycles
    pub send_interval_seconds: u64,

    /// Maximum events per request
    pub batch_size: usize,

    /// Directory holding the audit log and pending store
    pub log_dir: PathBuf,

    /// File name of the pending store inside `log_dir`
    pub pending_cache_file: String,

    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Events from windows whose title contains one of these are dropped
    pub sensitive_title_keywords: Vec<String>,

    /// Verbose logging
    pub debug_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("input-relay");

        Self {
            webhook_url: "http://127.0.0.1:8000/api/input".to_string(),
            send_interval_seconds: 5,
            batch_size: 25,
            log_dir: data_dir.join("logs"),
            pending_cache_file: "pending_events.jsonl".to_string(),
            request_timeout_seconds: 10,
            sensitive_title_keywords: ["password", "login", "auth", "credential"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            debug_mode: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            tracing::debug!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            let config = Self::default();
            tracing::info!("Config file missing; writing defaults to {:?}", path);
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("input-relay")
            .join("config.json")
    }

    /// Ensure the log directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.log_dir).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Time between send cycles, at least one second.
    pub fn send_interval(&self) -> Duration {
        Duration::from_secs(self.send_interval_seconds.max(1))
    }

    /// Events per request, at least one.
    pub fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Per-request timeout, at least one second.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }

    pub fn pending_cache_path(&self) -> PathBuf {
        self.log_dir.join(&self.pending_cache_file)
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
