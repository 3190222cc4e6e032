//! Explicit `start` options. The runtime reads no environment variables
//! directly; all configuration is passed as explicit arguments to `start`.

use std::time::Duration;

/// Arguments to [`crate::Cluster::start`].
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub node_name: String,
    pub host: String,
    pub port: u16,
    pub seeds: Vec<String>,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_miss_threshold: u32,
    pub reconnect_backoff_ceiling_ms: u64,
    pub shared_secret: Vec<u8>,
}

impl StartOptions {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_backoff_ceiling(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ceiling_ms)
    }
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            node_name: "otp".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            seeds: Vec::new(),
            heartbeat_interval_ms: 1_000,
            heartbeat_miss_threshold: 3,
            reconnect_backoff_ceiling_ms: 30_000,
            shared_secret: Vec::new(),
        }
    }
}
