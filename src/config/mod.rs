mod file_config;

pub use file_config::{DesktopConfig, FileConfig, PollingConfig, PushConfig};

use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

use crate::polling::PollCadence;
use crate::push::ReconnectPolicy;

/// Push channel framing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// STOMP 1.2 over WebSocket
    #[default]
    Stomp,
    /// One JSON payload per WebSocket text frame
    Native,
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub backend_url: Option<String>,
    pub db_path: Option<PathBuf>,
    pub metrics_port: Option<u16>,
    pub http_timeout_sec: Option<u64>,
    pub transport: Option<TransportKind>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub backend_url: String,
    pub db_path: PathBuf,
    pub metrics_port: Option<u16>,
    pub http_timeout_sec: u64,

    // Feature configs (with defaults)
    pub polling: PollingSettings,
    pub push: PushSettings,
    pub desktop: DesktopSettings,
}

pub const DEFAULT_DB_PATH: &str = "order-notifier.db";
pub const DEFAULT_HTTP_TIMEOUT_SEC: u64 = 30;

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let backend_url = file
            .backend_url
            .or_else(|| cli.backend_url.clone())
            .ok_or_else(|| {
                anyhow!("backend_url must be specified via --backend-url or in config file")
            })?;
        let backend_url = backend_url.trim().to_string();
        if !(backend_url.starts_with("http://") || backend_url.starts_with("https://")) {
            bail!("backend_url must be an http(s) URL: {}", backend_url);
        }

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let metrics_port = file.metrics_port.or(cli.metrics_port);
        let http_timeout_sec = file
            .http_timeout_sec
            .or(cli.http_timeout_sec)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SEC);
        if http_timeout_sec == 0 {
            bail!("http_timeout_sec must be greater than zero");
        }

        // Polling settings - merge file config with defaults
        let polling_file = file.polling.unwrap_or_default();
        let polling_defaults = PollingSettings::default();
        let polling = PollingSettings {
            fast_interval_secs: polling_file
                .fast_interval_secs
                .unwrap_or(polling_defaults.fast_interval_secs),
            slow_interval_secs: polling_file
                .slow_interval_secs
                .unwrap_or(polling_defaults.slow_interval_secs),
            initial_delay_ms: polling_file
                .initial_delay_ms
                .unwrap_or(polling_defaults.initial_delay_ms),
        };
        if polling.fast_interval_secs == 0 || polling.slow_interval_secs == 0 {
            bail!("Polling intervals must be greater than zero");
        }
        if polling.fast_interval_secs > polling.slow_interval_secs {
            bail!(
                "polling.fast_interval_secs ({}) must not exceed polling.slow_interval_secs ({})",
                polling.fast_interval_secs,
                polling.slow_interval_secs
            );
        }

        // Push settings - TOML transport wins over --transport
        let push_file = file.push.unwrap_or_default();
        let push_defaults = PushSettings::default();
        let transport = match push_file.transport {
            Some(s) => {
                parse_transport(&s).ok_or_else(|| anyhow!("Unknown push transport: {}", s))?
            }
            None => cli.transport.unwrap_or(push_defaults.transport),
        };
        let push = PushSettings {
            enabled: push_file.enabled.unwrap_or(push_defaults.enabled),
            transport,
            path: push_file.path.unwrap_or(push_defaults.path),
            topic: push_file.topic.unwrap_or(push_defaults.topic),
            base_delay_ms: push_file.base_delay_ms.unwrap_or(push_defaults.base_delay_ms),
            max_reconnect_attempts: push_file
                .max_reconnect_attempts
                .unwrap_or(push_defaults.max_reconnect_attempts),
            heartbeat_ms: push_file.heartbeat_ms.unwrap_or(push_defaults.heartbeat_ms),
        };

        let desktop = DesktopSettings {
            enabled: file
                .desktop
                .and_then(|d| d.enabled)
                .unwrap_or(DesktopSettings::default().enabled),
        };

        Ok(Self {
            backend_url,
            db_path,
            metrics_port,
            http_timeout_sec,
            polling,
            push,
            desktop,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingSettings {
    pub fast_interval_secs: u64,
    pub slow_interval_secs: u64,
    pub initial_delay_ms: u64,
}

impl PollingSettings {
    pub fn cadence(&self) -> PollCadence {
        PollCadence {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            fast: Duration::from_secs(self.fast_interval_secs),
            slow: Duration::from_secs(self.slow_interval_secs),
        }
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            fast_interval_secs: 5,
            slow_interval_secs: 30,
            initial_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSettings {
    pub enabled: bool,
    pub transport: TransportKind,
    /// Path appended to the backend URL for the push socket. A Spring endpoint
    /// registered with SockJS only accepts raw WebSocket on `{path}/websocket`, so
    /// such backends need `/ws/websocket` here.
    pub path: String,
    pub topic: String,
    pub base_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Outgoing STOMP heart-beat period, 0 disables
    pub heartbeat_ms: u64,
}

impl PushSettings {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            transport: TransportKind::Stomp,
            path: "/ws".to_string(),
            topic: "/topic/orders".to_string(),
            base_delay_ms: 3000,
            max_reconnect_attempts: 5,
            heartbeat_ms: 4000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopSettings {
    pub enabled: bool,
}

impl Default for DesktopSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Parses a transport name using clap's ValueEnum, case-insensitively.
fn parse_transport(s: &str) -> Option<TransportKind> {
    TransportKind::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with_backend() -> CliConfig {
        CliConfig {
            backend_url: Some("http://localhost:8080".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_transport() {
        assert_eq!(parse_transport("stomp"), Some(TransportKind::Stomp));
        assert_eq!(parse_transport("NATIVE"), Some(TransportKind::Native));
        assert!(parse_transport("sockjs").is_none());
    }

    #[test]
    fn test_resolve_defaults() {
        let config = AppConfig::resolve(&cli_with_backend(), None).unwrap();

        assert_eq!(config.backend_url, "http://localhost:8080");
        assert_eq!(config.db_path, PathBuf::from("order-notifier.db"));
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.http_timeout_sec, 30);
        assert_eq!(config.polling, PollingSettings::default());
        assert_eq!(config.push, PushSettings::default());
        assert!(config.desktop.enabled);

        let cadence = config.polling.cadence();
        assert_eq!(cadence.initial_delay, Duration::ZERO);
        assert_eq!(cadence.fast, Duration::from_secs(5));
        assert_eq!(cadence.slow, Duration::from_secs(30));
        assert_eq!(config.push.reconnect_policy(), ReconnectPolicy::default());
        assert_eq!(config.push.heartbeat(), Duration::from_secs(4));
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let cli = CliConfig {
            backend_url: Some("http://cli:8080".to_string()),
            db_path: Some(PathBuf::from("/cli/state.db")),
            metrics_port: Some(9091),
            http_timeout_sec: Some(5),
            transport: Some(TransportKind::Native),
        };
        let file_config = FileConfig {
            backend_url: Some("https://toml.example.com".to_string()),
            http_timeout_sec: Some(12),
            push: Some(PushConfig {
                transport: Some("stomp".to_string()),
                max_reconnect_attempts: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.backend_url, "https://toml.example.com");
        assert_eq!(config.http_timeout_sec, 12);
        assert_eq!(config.push.transport, TransportKind::Stomp);
        assert_eq!(config.push.max_reconnect_attempts, 3);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.db_path, PathBuf::from("/cli/state.db"));
        assert_eq!(config.metrics_port, Some(9091));
    }

    #[test]
    fn test_resolve_cli_transport_used_without_toml() {
        let cli = CliConfig {
            transport: Some(TransportKind::Native),
            ..cli_with_backend()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(config.push.transport, TransportKind::Native);
    }

    #[test]
    fn test_resolve_missing_backend_url_error() {
        let result = AppConfig::resolve(&CliConfig::default(), None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("backend_url must be specified"));
    }

    #[test]
    fn test_resolve_rejects_non_http_backend() {
        let cli = CliConfig {
            backend_url: Some("ws://localhost:8080".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("http(s)"));
    }

    #[test]
    fn test_resolve_rejects_bad_intervals() {
        let zero = FileConfig {
            polling: Some(PollingConfig {
                fast_interval_secs: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli_with_backend(), Some(zero)).is_err());

        let inverted = FileConfig {
            polling: Some(PollingConfig {
                fast_interval_secs: Some(60),
                slow_interval_secs: Some(30),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = AppConfig::resolve(&cli_with_backend(), Some(inverted)).unwrap_err();
        assert!(err.to_string().contains("must not exceed"));
    }

    #[test]
    fn test_resolve_unknown_transport_error() {
        let file_config = FileConfig {
            push: Some(PushConfig {
                transport: Some("carrier-pigeon".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = AppConfig::resolve(&cli_with_backend(), Some(file_config)).unwrap_err();
        assert!(err.to_string().contains("Unknown push transport"));
    }

    #[test]
    fn test_resolve_desktop_disabled() {
        let file_config = FileConfig {
            desktop: Some(DesktopConfig {
                enabled: Some(false),
            }),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli_with_backend(), Some(file_config)).unwrap();
        assert!(!config.desktop.enabled);
    }

    #[test]
    fn test_resolve_sockjs_push_path() {
        let cli = CliConfig {
            backend_url: Some("https://shop.example.com/".to_string()),
            ..Default::default()
        };
        let file_config = FileConfig {
            push: Some(PushConfig {
                path: Some("/ws/websocket".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        let endpoint = crate::push::push_endpoint(&config.backend_url, &config.push.path).unwrap();
        assert_eq!(endpoint, "wss://shop.example.com/ws/websocket");
    }
}
