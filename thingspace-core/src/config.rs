//! Configuration parsing and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Space configuration matching the thingspace.yml schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceConfig {
    /// Rederivation rounds one imprint may run before giving up
    #[serde(default = "default_max_reactive_rounds")]
    pub max_reactive_rounds: usize,

    #[serde(default)]
    pub storage: StorageConfig,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Snapshot file written by the file-backed store
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    /// How long tooling waits for pending writes before giving up
    #[serde(default = "default_await_timeout_ms")]
    pub await_timeout_ms: u64,
}

fn default_max_reactive_rounds() -> usize {
    64
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("space.json")
}

fn default_await_timeout_ms() -> u64 {
    5000
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            max_reactive_rounds: default_max_reactive_rounds(),
            storage: StorageConfig::default(),
            config_path: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            await_timeout_ms: default_await_timeout_ms(),
        }
    }
}

impl SpaceConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&contents)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: SpaceConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_reactive_rounds == 0 {
            return Err(ConfigError::Invalid(
                "max_reactive_rounds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Snapshot path, resolved relative to the config file
    pub fn storage_path(&self) -> PathBuf {
        let path = &self.storage.path;
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.config_path.as_ref().and_then(|p| p.parent()) {
            Some(parent) => parent.join(path),
            None => path.to_path_buf(),
        }
    }

    pub fn await_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.await_timeout_ms)
    }
}
