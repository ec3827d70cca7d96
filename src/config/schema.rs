//! Configuration schema for dkrcache
//!
//! [`ExpensiveTask::load`](crate::ExpensiveTask::load) reads these settings
//! from `<config_dir>/dkrcache/config.toml`. Every section and field is
//! optional.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Image builder settings
    pub builder: BuilderConfig,

    /// Hit-check listener settings
    pub listener: ListenerConfig,
}

/// Image builder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Builder executable (must understand `build`, `run`, `rmi`, `buildx du`)
    pub program: String,

    /// Base image of the generated build stages; must provide `wget` and `cat`
    pub base_image: String,

    /// Network mode for builds, must reach the listener on localhost
    pub network: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            base_image: "busybox:1.36".to_string(),
            network: "host".to_string(),
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address the listener binds to
    pub bind_address: String,

    /// Fixed port shared by every dkrcache caller on this host.
    /// The port is baked into the cache key, so changing it invalidates
    /// every stored outcome.
    pub port: u16,

    /// Delay between bind attempts while another caller holds the port
    pub backoff_ms: u64,
}

impl ListenerConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 41118,
            backoff_ms: 500,
        }
    }
}
