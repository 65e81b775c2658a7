//! BidSwarm configuration file

use crate::logging::LoggingConfig;
use crate::marketplace::RetryConfig;
use crate::ratelimit::RateLimitConfig;
use crate::storage::StoreConfig;
use crate::swarm::ControllerConfig;
use crate::{BidSwarmError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where swarms, agents and events are persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

fn default_database_path() -> PathBuf {
    StoreConfig::default().path
}

fn default_wal_mode() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

impl StorageConfig {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: self.path.clone(),
            wal_mode: self.wal_mode,
        }
    }
}

/// BidSwarm configuration
///
/// Represents the complete ~/.config/bidswarm/config.yaml file: controller
/// tunables (including strategy tuning), marketplace quotas and backoff,
/// client retries, storage and logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BidSwarmConfig {
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Per-category marketplace quotas and backoff
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Client-side retries for marketplace calls
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BidSwarmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_controller(mut self, controller: ControllerConfig) -> Self {
        self.controller = controller;
        self
    }

    pub fn with_rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.path = path.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    /// `~/.config/bidswarm/config.yaml` if present, otherwise built-in defaults
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            return Self::load(&path);
        }
        tracing::debug!(path = %path.display(), "No configuration file, using defaults");
        Ok(Self::default())
    }

    /// Parse a YAML file; sections left out fall back to their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BidSwarmError::Configuration(vec![format!(
                    "Config file not found: {}",
                    path.display()
                )]));
            }
            Err(e) => return Err(e.into()),
        };

        let config: Self = serde_yaml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            cycle_interval_secs = config.controller.cycle_interval_secs,
            max_retries = config.retry.max_retries,
            database = %config.storage.path.display(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Write as YAML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        tracing::info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// `~/.config/bidswarm/config.yaml` on every platform
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("bidswarm")
            .join("config.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{ApiCategory, Quota};
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let config = BidSwarmConfig::new()
            .with_controller(ControllerConfig::default().with_cycle_interval_secs(45))
            .with_rate_limits(
                RateLimitConfig::default().with_quota(ApiCategory::Bid, Quota::new(4, 400)),
            )
            .with_retry(RetryConfig::default().with_max_retries(1))
            .with_database_path(temp_dir.path().join("swarm.db"))
            .with_log_level("info");
        config.save(&config_path).unwrap();

        let loaded = BidSwarmConfig::load(&config_path).unwrap();
        assert_eq!(loaded.controller.cycle_interval_secs, 45);
        assert_eq!(loaded.rate_limits.quota(ApiCategory::Bid), Quota::new(4, 400));
        assert_eq!(loaded.storage.path, temp_dir.path().join("swarm.db"));
        assert_eq!(loaded.logging.level, "info");
        assert_eq!(loaded.retry.max_retries, 1);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            "controller:\n  max_agents_per_swarm: 8\n  strategy:\n    sniper:\n      snipe_seconds: 5\n",
        )
        .unwrap();

        let config = BidSwarmConfig::load(&config_path).unwrap();
        assert_eq!(config.controller.max_agents_per_swarm, 8);
        assert_eq!(config.controller.strategy.sniper.snipe_seconds, 5);
        assert_eq!(config.controller.strategy.sniper.snipe_lead_seconds, 120);
        assert_eq!(config.controller.cycle_interval_secs, 30);
        assert_eq!(config.rate_limits.quota(ApiCategory::Search), Quota::new(30, 5_000));
        assert!(config.storage.wal_mode);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = BidSwarmConfig::load(temp_dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(BidSwarmError::Configuration(_))));
    }

    #[test]
    fn test_default_path() {
        let path = BidSwarmConfig::default_path();
        assert!(path.ends_with(".config/bidswarm/config.yaml"));
    }
}
