//! # GrblKit
//!
//! A host-side driver for Grbl 1.1 CNC controllers:
//! - G-code lexing, parsing, compaction and XY rotation
//! - Decoding of every Grbl response and push message
//! - Real-time commands (feed hold, overrides, soft reset, ...)
//! - Character-counting program streaming
//! - Serial and TCP connectivity
//!
//! ## Architecture
//!
//! GrblKit is organized as a workspace with multiple crates:
//!
//! 1. **grblkit-core** - Error taxonomy and push-message broker
//! 2. **grblkit-gcode** - Lexer, parser, blocks and words
//! 3. **grblkit-communication** - Transports, Grbl protocol, streamer, connection
//! 4. **grblkit-settings** - Configuration files
//! 5. **grblkit** - This facade

pub use grblkit_communication::firmware;
pub use grblkit_gcode as gcode;

pub use grblkit_core::{
    Broker, BrokerConfig, ConnectionError, ControllerError, Error, GcodeError, ProtocolError,
    Result, SubscriptionId,
};

pub use grblkit_gcode::{compact, Block, Lexer, ModalState, Parser, Token, TokenKind, Word, XyRotation};

pub use grblkit_communication::{
    list_ports, open_transport, AckLink, BoxedTransport, ConnectionConfig, ConnectionDriver,
    ConnectionParams, GrblConnection, GrblControllerState, Message, ProgramStreamer, PushMessage,
    RealTimeCommand, ResponseMessage, SerialParity, SerialPortInfo, StreamSummary, Transport,
};

pub use grblkit_settings::{Config, ConnectionSettings, SettingsError, StreamingSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, multi-line
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Initialize logging with the default configuration
///
/// Pretty output to stdout at `info`, overridable through `RUST_LOG`.
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with(LogFormat::Pretty)
}

/// Initialize logging with the given output format
///
/// Fails if a global subscriber is already installed.
pub fn init_logging_with(format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    match format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(true)
                .with_level(true)
                .with_thread_names(true)
                .with_line_number(true)
                .pretty();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(true)
                .json();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}
