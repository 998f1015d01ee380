//! Configuration module for Boxroom.

use serde::Deserialize;
use std::path::Path;

use crate::{BoxroomError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/boxroom.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Attachment storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding uploaded attachment bytes.
    #[serde(default = "default_storage_path")]
    pub path: String,
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
}

fn default_storage_path() -> String {
    "data/uploads".to_string()
}

fn default_max_upload_size() -> u64 {
    100
}

impl StorageConfig {
    /// Maximum upload size in bytes.
    pub fn max_upload_bytes(&self) -> Result<u64> {
        self.max_upload_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| {
                BoxroomError::Config(format!(
                    "storage.max_upload_size_mb is too large: {}",
                    self.max_upload_size_mb
                ))
            })
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            max_upload_size_mb: default_max_upload_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file; console only when unset.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Attachment storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(BoxroomError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BoxroomError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `BOXROOM_DATABASE_PATH`
    /// - `BOXROOM_STORAGE_PATH`
    /// - `BOXROOM_LOG_LEVEL`
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = non_empty_env("BOXROOM_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(path) = non_empty_env("BOXROOM_STORAGE_PATH") {
            self.storage.path = path;
        }
        if let Some(level) = non_empty_env("BOXROOM_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(BoxroomError::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.storage.max_upload_size_mb == 0 {
            return Err(BoxroomError::Config(
                "storage.max_upload_size_mb must be at least 1".to_string(),
            ));
        }
        self.storage.max_upload_bytes()?;
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
