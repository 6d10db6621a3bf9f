//! Serial port transport
//!
//! `serialport` is blocking, so an open port is bridged onto an in-memory
//! async pipe by two pump threads: one copies port → pipe, the other
//! pipe → port. The caller gets the other end of the pipe.
//!
//! Port enumeration is filtered to names that look like CNC controllers:
//! - Windows: `COM*`
//! - Linux: `/dev/ttyUSB*`, `/dev/ttyACM*`
//! - macOS: `/dev/cu.usbserial-*`, `/dev/cu.usbmodem*`

use crate::communication::{BoxedTransport, ConnectionParams, SerialParity};
use grblkit_core::{ConnectionError, Result};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Read timeout of the blocking port; bounds how long the read pump takes
/// to notice the connection was dropped.
const PUMP_READ_TIMEOUT: Duration = Duration::from_millis(50);

const PIPE_CAPACITY: usize = 4096;

/// An available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Device name, e.g. "/dev/ttyUSB0" or "COM3"
    pub name: String,
    pub description: String,
    /// USB details when the port is a USB device
    pub usb: Option<UsbDetails>,
}

/// USB identification of a serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDetails {
    pub vid: u16,
    pub pid: u16,
    pub manufacturer: Option<String>,
    pub serial_number: Option<String>,
}

/// List serial ports that look like CNC controllers
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::SerialError {
            reason: format!("failed to enumerate ports: {}", e),
        }
    })?;

    Ok(ports
        .into_iter()
        .filter(|port| is_cnc_port_name(&port.port_name))
        .map(|port| {
            let (description, usb) = match port.port_type {
                serialport::SerialPortType::UsbPort(usb) => (
                    format!(
                        "USB {} {}",
                        usb.manufacturer.as_deref().unwrap_or("Device"),
                        usb.product.as_deref().unwrap_or("Serial Port")
                    ),
                    Some(UsbDetails {
                        vid: usb.vid,
                        pid: usb.pid,
                        manufacturer: usb.manufacturer,
                        serial_number: usb.serial_number,
                    }),
                ),
                serialport::SerialPortType::BluetoothPort => ("Bluetooth Serial".to_string(), None),
                serialport::SerialPortType::PciPort => ("PCI Serial".to_string(), None),
                _ => ("Serial Port".to_string(), None),
            };
            SerialPortInfo {
                name: port.port_name,
                description,
                usb,
            }
        })
        .collect())
}

fn is_cnc_port_name(name: &str) -> bool {
    if let Some(number) = name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }
    ["/dev/ttyUSB", "/dev/ttyACM", "/dev/cu.usbserial-", "/dev/cu.usbmodem"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Open a serial port and bridge it onto an async pipe
///
/// Stale bytes in the port's input and output buffers are discarded before
/// the pumps start. Must be called from within a tokio runtime.
pub fn open(params: &ConnectionParams) -> Result<BoxedTransport> {
    let failed = |reason: String| -> grblkit_core::Error {
        ConnectionError::FailedToOpen {
            port: params.port.clone(),
            reason,
        }
        .into()
    };

    let data_bits = match params.data_bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        8 => serialport::DataBits::Eight,
        other => return Err(failed(format!("invalid data bits: {}", other))),
    };
    let stop_bits = match params.stop_bits {
        1 => serialport::StopBits::One,
        2 => serialport::StopBits::Two,
        other => return Err(failed(format!("invalid stop bits: {}", other))),
    };
    let parity = match params.parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    };
    let flow_control = if params.flow_control {
        serialport::FlowControl::Hardware
    } else {
        serialport::FlowControl::None
    };

    let port = serialport::new(&params.port, params.baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .flow_control(flow_control)
        .timeout(PUMP_READ_TIMEOUT)
        .open()
        .map_err(|e| {
            tracing::warn!("Failed to open serial port {}: {}", params.port, e);
            failed(e.to_string())
        })?;

    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| failed(format!("failed to clear buffers: {}", e)))?;

    let writer = port
        .try_clone()
        .map_err(|e| failed(format!("failed to clone port handle: {}", e)))?;

    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| failed(format!("no async runtime: {}", e)))?;

    let (client, bridge) = tokio::io::duplex(PIPE_CAPACITY);
    let (mut bridge_rx, mut bridge_tx) = tokio::io::split(bridge);
    let closed = Arc::new(AtomicBool::new(false));

    let name = params.port.clone();
    let read_closed = closed.clone();
    let read_runtime = runtime.clone();
    let mut reader = port;
    std::thread::Builder::new()
        .name(format!("serial-rx {}", name))
        .spawn(move || {
            let mut buf = [0u8; 512];
            while !read_closed.load(Ordering::SeqCst) {
                match reader.read(&mut buf) {
                    Ok(0) => {}
                    Ok(n) => {
                        if read_runtime.block_on(bridge_tx.write_all(&buf[..n])).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => {
                        tracing::error!("Serial read from {} failed: {}", name, e);
                        break;
                    }
                }
            }
            read_closed.store(true, Ordering::SeqCst);
            let _ = read_runtime.block_on(bridge_tx.shutdown());
            tracing::debug!("Serial read pump for {} stopped", name);
        })
        .map_err(|e| failed(format!("failed to start read pump: {}", e)))?;

    let name = params.port.clone();
    let mut writer = writer;
    std::thread::Builder::new()
        .name(format!("serial-tx {}", name))
        .spawn(move || {
            let mut buf = [0u8; 512];
            loop {
                match runtime.block_on(bridge_rx.read(&mut buf)) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Err(e) = writer.write_all(&buf[..n]).and_then(|_| writer.flush()) {
                            tracing::error!("Serial write to {} failed: {}", name, e);
                            break;
                        }
                    }
                }
            }
            closed.store(true, Ordering::SeqCst);
            tracing::debug!("Serial write pump for {} stopped", name);
        })
        .map_err(|e| failed(format!("failed to start write pump: {}", e)))?;

    tracing::info!("Opened serial port {} at {} baud", params.port, params.baud_rate);
    Ok(Box::new(client))
}
