//! Configuration management for dkrcache

pub mod schema;

pub use schema::{BuilderConfig, Config, ListenerConfig};

use crate::error::{DkrError, DkrResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Locates and reads the optional TOML config file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager for the per-user config file
    pub fn new() -> Self {
        Self::with_path(Self::default_config_path())
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    /// `<config_dir>/dkrcache/config.toml`, relative to the working
    /// directory when the platform has no config dir
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dkrcache")
            .join("config.toml")
    }

    /// Read the config file. A missing file yields the defaults.
    pub async fn load(&self) -> DkrResult<Config> {
        let path = &self.config_path;
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(DkrError::io(
                    format!("reading config from {}", path.display()),
                    e,
                ))
            }
        };

        let config = toml::from_str(&content).map_err(|e| DkrError::ConfigInvalid {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
