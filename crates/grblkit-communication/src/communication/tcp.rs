//! TCP transport
//!
//! For serial-to-network bridges (ser2net, ESP32 telnet bridges and the
//! like) that tunnel Grbl's byte protocol unchanged.

use crate::communication::{BoxedTransport, ConnectionDriver, ConnectionParams};
use grblkit_core::{ConnectionError, Result};
use std::time::Duration;
use tokio::net::TcpStream;

/// Connect to `params.port:params.network_port`
pub async fn open(params: &ConnectionParams) -> Result<BoxedTransport> {
    if params.driver != ConnectionDriver::Tcp {
        return Err(ConnectionError::InvalidParameters {
            reason: "TCP transport requires the Tcp driver".to_string(),
        }
        .into());
    }

    let address = (params.port.as_str(), params.network_port);
    let timeout = Duration::from_millis(params.timeout_ms);
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::warn!("Failed to connect to {}: {}", params.endpoint(), e);
            return Err(ConnectionError::TcpError {
                reason: format!("failed to connect to {}: {}", params.endpoint(), e),
            }
            .into());
        }
        Err(_) => {
            return Err(ConnectionError::TcpError {
                reason: format!(
                    "connecting to {} timed out after {}ms",
                    params.endpoint(),
                    params.timeout_ms
                ),
            }
            .into());
        }
    };

    // Real-time bytes are single unterminated bytes; don't let Nagle hold them.
    stream.set_nodelay(true).map_err(|e| ConnectionError::TcpError {
        reason: format!("failed to set TCP_NODELAY: {}", e),
    })?;

    tracing::info!("Connected to {}", params.endpoint());
    Ok(Box::new(stream))
}
