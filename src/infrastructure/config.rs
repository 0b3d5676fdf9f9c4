use crate::domain::error::SqlCacheError;
use crate::domain::model::KeyComparer;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_enable")]
    pub enable: bool,
    /// Maximum number of cached entries. Values of zero or below are a
    /// configuration error when the cache is enabled.
    #[serde(default = "default_capacity")]
    pub capacity: i64,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default)]
    pub comparer: KeyComparer,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable: true,
            capacity: default_capacity(),
            refresh_interval_ms: default_refresh_interval_ms(),
            comparer: KeyComparer::default(),
        }
    }
}

impl CacheConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

// Defaults
fn default_database_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sqlcache")
        .join("sqlcache.db")
}
fn default_enable() -> bool {
    true
}
fn default_capacity() -> i64 {
    64
}
fn default_refresh_interval_ms() -> u64 {
    30_000
}

pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("sqlcache").join("config.toml"))
}

impl Config {
    /// Loads the config from the default location, falling back to defaults
    /// when the file is absent or unreadable.
    pub fn load() -> Result<Self, SqlCacheError> {
        match get_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Loads a config file, warning and falling back to defaults when the
    /// contents do not parse.
    pub fn load_from(path: &Path) -> Result<Self, SqlCacheError> {
        let content = fs::read_to_string(path)?;
        match toml::from_str::<Config>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("failed to parse config file {}: {}", path.display(), e);
                Ok(Self::default())
            }
        }
    }
}
