//! Transports
//!
//! The protocol layer sees a transport as a plain bidirectional byte stream.
//! Serial ports and TCP tunnels to a serial bridge both end up as a
//! [`BoxedTransport`].

pub mod serial;
pub mod tcp;

use grblkit_core::{ConnectionError, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

/// Anything usable as a byte stream to the controller
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Owned, type-erased transport
pub type BoxedTransport = Box<dyn Transport>;

/// Connection driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionDriver {
    /// Direct serial/USB connection
    Serial,
    /// TCP socket tunnelling the serial byte stream
    Tcp,
}

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    #[default]
    None,
    Even,
    Odd,
}

/// Parameters for opening a transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Which transport to open
    pub driver: ConnectionDriver,
    /// Serial device path, or host name for TCP
    pub port: String,
    /// TCP port (ignored for serial)
    pub network_port: u16,
    /// Baud rate (ignored for TCP)
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
    /// Open/connect timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            driver: ConnectionDriver::Serial,
            port: "/dev/ttyUSB0".to_string(),
            network_port: 23,
            baud_rate: 115200,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
            timeout_ms: 2000,
        }
    }
}

impl ConnectionParams {
    /// Serial connection at `baud_rate`, 8N1
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            driver: ConnectionDriver::Serial,
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }

    /// TCP connection to `host:network_port`
    pub fn tcp(host: impl Into<String>, network_port: u16) -> Self {
        Self {
            driver: ConnectionDriver::Tcp,
            port: host.into(),
            network_port,
            ..Self::default()
        }
    }

    /// Check the parameters before opening anything
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| -> grblkit_core::Error {
            ConnectionError::InvalidParameters { reason }.into()
        };

        if self.port.trim().is_empty() {
            return Err(invalid("port must not be empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeout must be greater than 0".to_string()));
        }
        match self.driver {
            ConnectionDriver::Serial => {
                if self.baud_rate == 0 {
                    return Err(invalid("baud rate must be greater than 0".to_string()));
                }
                if !(5..=8).contains(&self.data_bits) {
                    return Err(invalid(format!("invalid data bits: {}", self.data_bits)));
                }
                if !(1..=2).contains(&self.stop_bits) {
                    return Err(invalid(format!("invalid stop bits: {}", self.stop_bits)));
                }
            }
            ConnectionDriver::Tcp => {
                if self.network_port == 0 {
                    return Err(invalid("TCP port must be greater than 0".to_string()));
                }
            }
        }
        Ok(())
    }

    /// Human readable endpoint, e.g. `/dev/ttyUSB0@115200` or `cnc.local:23`
    pub fn endpoint(&self) -> String {
        match self.driver {
            ConnectionDriver::Serial => format!("{}@{}", self.port, self.baud_rate),
            ConnectionDriver::Tcp => format!("{}:{}", self.port, self.network_port),
        }
    }
}

/// Open the transport described by `params`
pub async fn open_transport(params: &ConnectionParams) -> Result<BoxedTransport> {
    params.validate()?;
    tracing::info!("Opening {:?} transport {}", params.driver, params.endpoint());
    match params.driver {
        ConnectionDriver::Serial => serial::open(params),
        ConnectionDriver::Tcp => tcp::open(params).await,
    }
}
