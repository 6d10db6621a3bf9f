//! Configuration file handling
//!
//! Configuration is organized into two sections:
//! - Connection settings (transport, port, timeouts)
//! - Streaming settings (receive buffer, command timeout, status polling)
//!
//! Files are JSON or TOML, chosen by extension.

use crate::error::{SettingsError, SettingsResult};
use grblkit_communication::{ConnectionConfig, ConnectionDriver, ConnectionParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial or TCP
    pub connection_type: ConnectionDriver,
    /// Serial device path
    pub port: String,
    /// Baud rate for serial connections
    pub baud_rate: u32,
    /// Host name for TCP connections
    pub host: String,
    /// TCP port for network connections
    pub tcp_port: u16,
    /// Open/connect timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_type: ConnectionDriver::Serial,
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            host: "localhost".to_string(),
            tcp_port: 23,
            timeout_ms: 2000,
        }
    }
}

/// Streaming and command settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Controller receive buffer in bytes (Grbl default 128)
    pub rx_buffer_size: usize,
    /// Line command timeout in milliseconds
    pub command_timeout_ms: u64,
    /// Status query period in milliseconds, 0 disables polling
    pub status_poll_interval_ms: u64,
    /// Slots per push-message subscriber
    pub push_channel_capacity: usize,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            rx_buffer_size: 128,
            command_timeout_ms: 5000,
            status_poll_interval_ms: 0,
            push_channel_capacity: 64,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSettings,
    pub streaming: StreamingSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(SettingsError::UnsupportedFormat(
            other.unwrap_or("(none)").to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform config location, e.g. `~/.config/grblkit/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("grblkit").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no configuration directory on this platform".to_string())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;
        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };
        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load config from file, or defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        let connection = &self.connection;
        if connection.timeout_ms == 0 {
            return Err(SettingsError::invalid("connection.timeout_ms", "must be greater than 0"));
        }
        match connection.connection_type {
            ConnectionDriver::Serial => {
                if connection.port.trim().is_empty() {
                    return Err(SettingsError::invalid("connection.port", "must not be empty"));
                }
                if connection.baud_rate == 0 {
                    return Err(SettingsError::invalid("connection.baud_rate", "must be greater than 0"));
                }
            }
            ConnectionDriver::Tcp => {
                if connection.host.trim().is_empty() {
                    return Err(SettingsError::invalid("connection.host", "must not be empty"));
                }
                if connection.tcp_port == 0 {
                    return Err(SettingsError::invalid("connection.tcp_port", "must be greater than 0"));
                }
            }
        }

        let streaming = &self.streaming;
        if streaming.rx_buffer_size == 0 {
            return Err(SettingsError::invalid("streaming.rx_buffer_size", "must be greater than 0"));
        }
        if streaming.command_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "streaming.command_timeout_ms",
                "must be greater than 0",
            ));
        }
        if streaming.push_channel_capacity == 0 {
            return Err(SettingsError::invalid(
                "streaming.push_channel_capacity",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Transport parameters for the configured connection
    pub fn connection_params(&self) -> ConnectionParams {
        let connection = &self.connection;
        let mut params = match connection.connection_type {
            ConnectionDriver::Serial => ConnectionParams::serial(&connection.port, connection.baud_rate),
            ConnectionDriver::Tcp => ConnectionParams::tcp(&connection.host, connection.tcp_port),
        };
        params.timeout_ms = connection.timeout_ms;
        params
    }

    /// Connection tuning for the configured streaming settings
    pub fn connection_config(&self) -> ConnectionConfig {
        let streaming = &self.streaming;
        ConnectionConfig {
            rx_buffer_size: streaming.rx_buffer_size,
            status_poll_interval: (streaming.status_poll_interval_ms > 0)
                .then(|| Duration::from_millis(streaming.status_poll_interval_ms)),
            push_channel_capacity: streaming.push_channel_capacity,
            command_timeout: Duration::from_millis(streaming.command_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.streaming.rx_buffer_size, 128);
        assert!(config.connection_config().status_poll_interval.is_none());
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.connection.connection_type = ConnectionDriver::Tcp;
        config.connection.host = "cnc.local".to_string();
        config.streaming.status_poll_interval_ms = 250;
        config.save_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("connection_type = \"tcp\""));
        assert_eq!(Config::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.connection.port = "/dev/ttyACM0".to_string();
        config.save_to_file(&path).unwrap();
        assert_eq!(Config::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[streaming]\nrx_buffer_size = 256\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.streaming.rx_buffer_size, 256);
        assert_eq!(config.connection, ConnectionSettings::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        assert!(matches!(
            Config::default().save_to_file(&path),
            Err(SettingsError::UnsupportedFormat(ext)) if ext == "yaml"
        ));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.streaming.rx_buffer_size = 0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { key, .. }) if key == "streaming.rx_buffer_size"
        ));

        let mut config = Config::default();
        config.connection.connection_type = ConnectionDriver::Tcp;
        config.connection.tcp_port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.connection.baud_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_conversions() {
        let mut config = Config::default();
        config.connection.connection_type = ConnectionDriver::Tcp;
        config.connection.host = "10.0.0.5".to_string();
        config.connection.tcp_port = 8080;
        config.streaming.status_poll_interval_ms = 200;

        let params = config.connection_params();
        assert_eq!(params.driver, ConnectionDriver::Tcp);
        assert_eq!(params.endpoint(), "10.0.0.5:8080");
        assert!(params.validate().is_ok());

        let tuning = config.connection_config();
        assert_eq!(tuning.status_poll_interval, Some(Duration::from_millis(200)));
        assert_eq!(tuning.command_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_default_path() {
        if let Ok(path) = Config::default_path() {
            assert!(path.ends_with("grblkit/config.toml"));
        }
    }
}
