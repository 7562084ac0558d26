//! # Configuration Management Module
//!
//! All bridge settings live in one TOML file that is read once at start-up. Every section
//! has defaults matching a stock deployment, so a missing section falls back cleanly.
//!
//! ## Configuration Structure
//!
//! - [`SerialConfig`] - XBee serial link
//! - [`NetworkConfig`] - network association
//! - [`BrokerConfig`] - MQTT broker endpoint, identity and reconnect policy
//! - [`TlsConfig`] - PEM files for the TLS session
//! - [`TopicsConfig`] - publish and subscribe topics
//! - [`EmitterConfig`] - scripted commands sent to the radio on a timer
//! - [`LoopConfig`] - control loop pacing
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use xbeebridge::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Broker: {}:{}", config.broker.host, config.broker.port);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//!
//! [broker]
//! host = "203.0.113.1"
//! port = 8883
//! client_id = "ESP32_Client"
//!
//! [tls]
//! ca_cert = "certs/ca.pem"
//! client_cert = "certs/client.pem"
//! client_key = "certs/client.key"
//!
//! [topics]
//! reports = "xbee/reports"
//! commands = "esp32/commands"
//! ```

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::xbee::codec::OutboundCommand;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
        }
    }
}

/// Wi-Fi credentials belong to the host OS; a `password` key here is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    /// Network name, logged while waiting for association.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Fixed delay between connection attempts.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Give up after this many consecutive failed attempts. Unset retries forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connect_attempts: Option<u32>,
}

fn default_keep_alive_secs() -> u64 {
    15
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

impl BrokerConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "broker.example.net".to_string(),
            port: 8883,
            client_id: "ESP32_Client".to_string(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            max_connect_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub ca_cert: String,
    pub client_cert: String,
    pub client_key: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ca_cert: "certs/ca.pem".to_string(),
            client_cert: "certs/client.pem".to_string(),
            client_key: "certs/client.key".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsConfig {
    pub reports: String,
    pub commands: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            reports: "xbee/reports".to_string(),
            commands: "esp32/commands".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub interval_ms: u64,
    /// Pause between consecutive commands within one firing.
    pub pause_ms: u64,
    pub commands: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl EmitterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn outbound_commands(&self) -> Result<Vec<OutboundCommand>> {
        self.commands
            .iter()
            .map(|c| OutboundCommand::new(c.as_str()).map_err(|e| anyhow!("emitter: {}", e)))
            .collect()
    }
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 10_000,
            pause_ms: 1_000,
            commands: vec![
                "REPORT:SENSOR_1".to_string(),
                "CAMERA:SENSOR_1:ON".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Idle delay at the end of every loop iteration (ms)
    pub idle_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self { idle_ms: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default)]
    pub emitter: EmitterConfig,
    #[serde(default, rename = "bridge")]
    pub bridge_loop: LoopConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config = Self::from_toml(&content)
            .map_err(|e| anyhow!("Failed to load config file {}: {}", path, e))?;

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.topics.reports.trim().is_empty() || self.topics.commands.trim().is_empty() {
            bail!("topics.reports and topics.commands must be non-empty");
        }
        if self.broker.host.trim().is_empty() {
            bail!("broker.host must be set");
        }
        if self.broker.max_connect_attempts == Some(0) {
            bail!("broker.max_connect_attempts must be at least 1 when set");
        }
        if self.emitter.enabled {
            if self.emitter.interval_ms == 0 {
                bail!("emitter.interval_ms must be greater than zero");
            }
            self.emitter.outbound_commands()?;
        }
        Ok(())
    }
}
