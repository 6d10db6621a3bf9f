//! Error handling for GrblKit
//!
//! Provides error types for every layer of the driver:
//! - G-Code errors (tokenizing/parsing, recoverable per line)
//! - Protocol errors (a received line did not decode, fatal for the connection)
//! - Connection errors (transport)
//! - Controller errors (command lifecycle, timeouts, desynchronization)
//!
//! Firmware-reported `error:N` and `ALARM:N` lines are data, not errors, and
//! only surface here when a caller asks for a rejected command to fail.

use thiserror::Error;

/// G-Code error type
///
/// Represents G-code text that cannot be sent. Always recoverable per line
/// and never affects connection state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GcodeError {
    /// Invalid G-Code syntax
    #[error("Invalid syntax at line {line_number}: {reason}")]
    InvalidSyntax {
        /// The line number where the syntax error occurred.
        line_number: u32,
        /// The reason for the syntax error.
        reason: String,
    },

    /// A word could not be built from its letter and number
    #[error("Invalid word '{word}': {reason}")]
    InvalidWord {
        /// The offending word text.
        word: String,
        /// The reason the word is invalid.
        reason: String,
    },

    /// Invalid modal state
    #[error("Invalid modal state: {reason}")]
    InvalidModalState {
        /// The reason for the invalid modal state.
        reason: String,
    },

    /// Block writes to EEPROM and cannot be streamed
    #[error("EEPROM command at line {line_number} cannot be streamed: {block}")]
    EepromCommand {
        /// The line number of the offending block.
        line_number: u32,
        /// The block in compact form.
        block: String,
    },

    /// Line cannot fit in the controller's receive buffer
    #[error("Line {line_number} is {length} bytes, larger than the {capacity}-byte receive buffer")]
    LineTooLong {
        /// The line number of the offending block.
        line_number: u32,
        /// Wire length including the newline.
        length: usize,
        /// Receive buffer size in bytes.
        capacity: usize,
    },
}

/// Protocol error type
///
/// Raised when a line received from the firmware does not match the shape of
/// the message it claims to be. Byte alignment on the wire is suspect after
/// one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Line did not match any known message prefix
    #[error("invalid message: {line:?}")]
    UnrecognizedMessage {
        /// The raw line.
        line: String,
    },

    /// A sub-field of a known message failed to parse
    #[error("failed to parse {field} in {line:?}: {reason}")]
    MalformedField {
        /// The field being parsed.
        field: String,
        /// What went wrong.
        reason: String,
        /// The full raw line.
        line: String,
    },
}

impl ProtocolError {
    /// Build a `MalformedField` error
    pub fn malformed(
        field: impl Into<String>,
        reason: impl Into<String>,
        line: impl Into<String>,
    ) -> Self {
        ProtocolError::MalformedField {
            field: field.into(),
            reason: reason.into(),
            line: line.into(),
        }
    }
}

/// Connection error type
///
/// Represents errors related to the transport: serial port or TCP tunnel.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// TCP connection error
    #[error("TCP connection error: {reason}")]
    TcpError {
        /// The reason for the TCP error.
        reason: String,
    },

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Controller error type
///
/// Represents errors in the command lifecycle: single-flight commands,
/// program streaming, and connection state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// Controller is not connected
    #[error("Controller not connected")]
    NotConnected,

    /// Controller is already connected
    #[error("Controller already connected")]
    AlreadyConnected,

    /// Controller operation timed out
    #[error("Controller operation timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Buffer accounting no longer matches the firmware
    #[error("Connection is desynchronized; reconnect or reset the controller")]
    Desynchronized,

    /// Firmware reset while a command was in flight
    #[error("Command aborted by controller reset")]
    CommandAborted,

    /// Command was rejected by controller with `error:N`
    #[error("Command rejected: error:{code} ({description})")]
    CommandRejected {
        /// The firmware error code.
        code: String,
        /// The documented meaning of the code.
        description: String,
    },
}

/// Main error type for GrblKit
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Controller(ControllerError::Timeout { .. }))
    }

    /// Check if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Controller(ControllerError::Cancelled))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a G-Code error
    pub fn is_gcode_error(&self) -> bool {
        matches!(self, Error::Gcode(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
