use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub backend_url: Option<String>,
    pub db_path: Option<String>,
    pub metrics_port: Option<u16>,
    pub http_timeout_sec: Option<u64>,

    // Feature configs
    pub polling: Option<PollingConfig>,
    pub push: Option<PushConfig>,
    pub desktop: Option<DesktopConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub fast_interval_secs: Option<u64>,
    pub slow_interval_secs: Option<u64>,
    pub initial_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PushConfig {
    pub enabled: Option<bool>,
    /// "stomp" or "native"
    pub transport: Option<String>,
    /// Push socket path, "/ws" by default. Use "/ws/websocket" for SockJS backends.
    pub path: Option<String>,
    pub topic: Option<String>,
    pub base_delay_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub heartbeat_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DesktopConfig {
    pub enabled: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
