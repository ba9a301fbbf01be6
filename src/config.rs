// src/config.rs

//! Manages server configuration: loading, resolving size values, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

use crate::core::protocol::DEFAULT_MAX_MESSAGE_SIZE;

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    8878
}

/// Configuration for TLS encryption.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cert_path")]
    pub cert_path: String,
    #[serde(default = "default_key_path")]
    pub key_path: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: default_cert_path(),
            key_path: default_key_path(),
        }
    }
}

fn default_cert_path() -> String {
    "tutorlink.crt".to_string()
}
fn default_key_path() -> String {
    "tutorlink.key".to_string()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum MessageSizeConfig {
    Bytes(usize),
    String(String),
}

/// A raw representation of the config file before validation and resolution.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default = "default_max_message_size_config")]
    max_message_size: MessageSizeConfig,
    #[serde(default = "default_outbound_buffer")]
    outbound_buffer: usize,
    #[serde(default)]
    idle_timeout_secs: u64,
    #[serde(default)]
    tls: TlsConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5555
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}
fn default_max_message_size_config() -> MessageSizeConfig {
    MessageSizeConfig::Bytes(DEFAULT_MAX_MESSAGE_SIZE)
}
fn default_outbound_buffer() -> usize {
    256
}

/// Represents the final, validated, and resolved server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Upper bound on concurrently served connections.
    pub max_clients: usize,
    /// Largest accepted frame in bytes, excluding the newline.
    pub max_message_size: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
    /// Close connections silent for this many seconds. `0` disables the check.
    pub idle_timeout_secs: u64,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            outbound_buffer: default_outbound_buffer(),
            idle_timeout_secs: 0,
            tls: TlsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Loads, resolves, and validates the configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config in '{path}'"))
    }

    /// Parses, resolves, and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;

        let config = Config {
            host: raw_config.host,
            port: raw_config.port,
            log_level: raw_config.log_level,
            max_clients: raw_config.max_clients,
            max_message_size: resolve_message_size(raw_config.max_message_size)?,
            outbound_buffer: raw_config.outbound_buffer,
            idle_timeout_secs: raw_config.idle_timeout_secs,
            tls: raw_config.tls,
            metrics: raw_config.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// The idle timeout, or `None` if connections may stay silent forever.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.max_message_size == 0 {
            return Err(anyhow!("max_message_size cannot be 0"));
        }
        if self.outbound_buffer == 0 {
            return Err(anyhow!("outbound_buffer cannot be 0"));
        }
        if self.max_message_size < 1024 {
            warn!(
                "low max_message_size setting: {} bytes. Long chat messages will close connections.",
                self.max_message_size
            );
        }

        if self.tls.enabled {
            if self.tls.cert_path.trim().is_empty() {
                return Err(anyhow!("tls.cert_path cannot be empty when TLS is enabled"));
            }
            if self.tls.key_path.trim().is_empty() {
                return Err(anyhow!("tls.key_path cannot be empty when TLS is enabled"));
            }
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }
        Ok(())
    }
}

/// Resolves the `MessageSizeConfig` into a byte count.
fn resolve_message_size(cfg: MessageSizeConfig) -> Result<usize> {
    match cfg {
        MessageSizeConfig::Bytes(b) => Ok(b),
        MessageSizeConfig::String(s) => {
            let s_lower = s.trim().to_lowercase();
            if let Some(val_str) = s_lower.strip_suffix("mb") {
                parse_size_string(&s, val_str, 1024 * 1024)
            } else if let Some(val_str) = s_lower.strip_suffix('m') {
                parse_size_string(&s, val_str, 1024 * 1024)
            } else if let Some(val_str) = s_lower.strip_suffix("kb") {
                parse_size_string(&s, val_str, 1024)
            } else if let Some(val_str) = s_lower.strip_suffix('k') {
                parse_size_string(&s, val_str, 1024)
            } else {
                s_lower.parse().with_context(|| format!("Invalid max_message_size value '{s}'. Must be a number (bytes) or have a unit (e.g., '64kb')."))
            }
        }
    }
}

/// Parses a string number with a unit (kb, mb) and applies a multiplier.
fn parse_size_string(original_str: &str, value_str: &str, multiplier: u64) -> Result<usize> {
    let value: u64 = value_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in max_message_size config: '{original_str}'"))?;
    let result_u64 = value.saturating_mul(multiplier);
    if result_u64 > (usize::MAX as u64) {
        return Err(anyhow!(
            "max_message_size value '{}' is too large for this system's architecture",
            original_str
        ));
    }
    Ok(result_u64 as usize)
}
