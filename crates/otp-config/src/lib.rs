//! # otp-config: host-binary configuration
//!
//! The core crates (`otp-process`, `otp-supervisor`, `otp-cluster`, ...)
//! read no environment variables and take all their options as explicit
//! arguments to `start`/`spawn`. This crate is the opt-in convenience
//! layer a host binary uses to assemble those arguments from a layered
//! TOML configuration: hierarchical structs, `#[serde(default)]`, a
//! dedicated `ConfigError`.
//!
//! Layering, lowest to highest precedence:
//! 1. [`RuntimeConfig::default`]
//! 2. the user config file (XDG config dir, see [`Paths`])
//! 3. `<project_dir>/otp.toml` (git-tracked)
//! 4. `<project_dir>/otp.local.toml` (gitignored local overrides)

mod error;
mod loader;
mod paths;

pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;
pub use paths::Paths;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration assembled by [`ConfigLoader`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub node: NodeConfig,
    pub supervisor: SupervisorConfig,
    pub cluster: ClusterConfig,
    pub observer: ObserverConfig,
}

/// Local node identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub mailbox_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "otp".to_string(),
            host: "127.0.0.1".to_string(),
            port: 4369,
            mailbox_capacity: 1024,
        }
    }
}

/// Defaults a host binary applies when it does not override a supervisor's
/// restart-intensity window per call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub max_restarts: usize,
    pub restart_within_ms: u64,
    pub default_shutdown_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            restart_within_ms: 5_000,
            default_shutdown_timeout_ms: 5_000,
        }
    }
}

impl SupervisorConfig {
    pub fn restart_within(&self) -> Duration {
        Duration::from_millis(self.restart_within_ms)
    }

    pub fn default_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.default_shutdown_timeout_ms)
    }
}

/// Cluster membership defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub seeds: Vec<String>,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_miss_threshold: u32,
    pub reconnect_backoff_ceiling_ms: u64,
    /// Path to a file holding the HMAC shared secret for handshake
    /// authentication. Never stored inline in the config file itself.
    pub shared_secret_path: Option<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            heartbeat_interval_ms: 1_000,
            heartbeat_miss_threshold: 3,
            reconnect_backoff_ceiling_ms: 30_000,
            shared_secret_path: None,
        }
    }
}

impl ClusterConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_backoff_ceiling(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ceiling_ms)
    }
}

/// Observer polling and alert-manager defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    pub poll_interval_ms: u64,
    pub alert_enabled: bool,
    pub alert_sensitivity_multiplier: f64,
    pub alert_min_samples: usize,
    pub alert_cooldown_ms: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            alert_enabled: true,
            alert_sensitivity_multiplier: 2.0,
            alert_min_samples: 30,
            alert_cooldown_ms: 10_000,
        }
    }
}

impl ObserverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_millis(self.alert_cooldown_ms)
    }
}

impl RuntimeConfig {
    /// Loads configuration from the default location set (user config dir,
    /// `./otp.toml`, `./otp.local.toml`), falling back to built-in defaults
    /// for anything none of the layers set.
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Loads configuration layered on top of `project_dir` rather than the
    /// current directory.
    pub fn load_from_dir(project_dir: impl AsRef<std::path::Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }
}
