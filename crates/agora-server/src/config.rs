//! Server configuration.
//!
//! Configuration can be loaded from:
//! - The file named by `AGORA_CONFIG`
//! - A TOML file in one of the default locations
//! - Environment variables (`AGORA_HOST`, `AGORA_PORT`) for unset values

use agora_core::HubConfig;
use agora_protocol::codec::DEFAULT_MAX_FRAME_SIZE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Hub tuning.
    #[serde(default)]
    pub hub: HubSection,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Hub configuration, as written in the `[hub]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSection {
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,

    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Read deadline in milliseconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Write deadline in milliseconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    /// Most queued messages coalesced into one write.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("AGORA_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("AGORA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_intake_capacity() -> usize {
    HubConfig::default().intake_capacity
}

fn default_outbound_capacity() -> usize {
    HubConfig::default().outbound_capacity
}

fn default_workers() -> usize {
    HubConfig::default().workers
}

fn default_heartbeat_interval() -> u64 {
    54_000 // 9/10 of the read timeout
}

fn default_read_timeout() -> u64 {
    60_000
}

fn default_write_timeout() -> u64 {
    10_000
}

fn default_max_batch() -> usize {
    HubConfig::default().max_batch
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            hub: HubSection::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            intake_capacity: default_intake_capacity(),
            outbound_capacity: default_outbound_capacity(),
            workers: default_workers(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            read_timeout_ms: default_read_timeout(),
            write_timeout_ms: default_write_timeout(),
            max_batch: default_max_batch(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("AGORA_CONFIG") {
            return Self::from_file(shellexpand::tilde(&path).as_ref());
        }

        let config_paths = [
            "agora.toml",
            "/etc/agora/agora.toml",
            "~/.config/agora/agora.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// The hub configuration described by this file.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            intake_capacity: self.hub.intake_capacity,
            outbound_capacity: self.hub.outbound_capacity,
            workers: self.hub.workers,
            heartbeat_interval: Duration::from_millis(self.hub.heartbeat_interval_ms),
            read_timeout: Duration::from_millis(self.hub.read_timeout_ms),
            write_timeout: Duration::from_millis(self.hub.write_timeout_ms),
            max_frame_size: self.transport.max_message_size,
            max_batch: self.hub.max_batch,
            ..HubConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport.websocket_path, "/ws");
        assert!(config.metrics.enabled);
        assert!(config.hub_config().validate().is_ok());
    }

    #[test]
    fn test_default_hub_matches_core_defaults() {
        let hub = Config::default().hub_config();
        let core = HubConfig::default();
        assert_eq!(hub.heartbeat_interval, core.heartbeat_interval);
        assert_eq!(hub.read_timeout, core.read_timeout);
        assert_eq!(hub.write_timeout, core.write_timeout);
        assert_eq!(hub.max_frame_size, core.max_frame_size);
    }

    #[test]
    fn test_config_bind_addr() {
        let mut config = Config::default();
        config.host = "127.0.0.1".into();
        config.port = 8080;
        assert_eq!(config.bind_addr().unwrap().port(), 8080);

        config.host = "not a host".into();
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [transport]
            max_message_size = 4096

            [hub]
            workers = 8
            read_timeout_ms = 30000
            heartbeat_interval_ms = 27000
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);

        let hub = config.hub_config();
        assert_eq!(hub.workers, 8);
        assert_eq!(hub.max_frame_size, 4096);
        assert_eq!(hub.read_timeout, Duration::from_secs(30));
        assert_eq!(hub.outbound_capacity, HubConfig::default().outbound_capacity);
        assert!(hub.validate().is_ok());
    }

    #[test]
    fn test_invalid_hub_section_fails_validation() {
        let config: Config = toml::from_str("[hub]\nheartbeat_interval_ms = 90000").unwrap();
        assert!(config.hub_config().validate().is_err());
    }
}
