//! Configuration management for Crosscast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between polls for due jobs
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Maximum concurrent publish jobs
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Job-level attempt ceiling before the post is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay in seconds for exponential retry backoff
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    /// Per-target publish timeout in seconds
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            worker_pool_size: default_worker_pool_size(),
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
            publish_timeout: default_publish_timeout(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    60
}

fn default_publish_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Timeout in seconds for each webhook POST
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    10
}

/// Which platform names get a publisher registered by the daemon.
///
/// Real publishers are external integrations wired in by the embedding
/// application; names listed under `mock` get the built-in mock publisher,
/// which is useful for demos and end-to-end testing without credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformsConfig {
    #[serde(default)]
    pub mock: Vec<String>,
}

impl Config {
    /// Load configuration from `CROSSCAST_CONFIG` or the XDG default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&resolve_config_path()?)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        Ok(toml::from_str(&raw).map_err(ConfigError::Parse)?)
    }

    /// Built-in defaults, used when no config file exists yet.
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/crosscast/crosscast.db".to_string(),
            },
            scheduler: SchedulerConfig::default(),
            notifications: NotificationsConfig::default(),
            platforms: PlatformsConfig::default(),
        }
    }
}

/// Config file location: `CROSSCAST_CONFIG` wins, else the XDG config dir.
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosscast").join("config.toml"))
}
