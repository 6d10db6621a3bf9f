//! Grbl line classification
//!
//! Every line Grbl sends is either a response to the oldest outstanding
//! line command (`ok`, `error:N`) or a push message the host did not
//! directly ask for.

use crate::firmware::grbl::error_decoder::error_description;
use crate::firmware::grbl::push::PushMessage;
use grblkit_core::{ControllerError, ProtocolError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Acknowledgment of a line command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseMessage {
    /// `ok`
    Ok,
    /// `error:N`
    Error { code: u16 },
}

impl ResponseMessage {
    /// Parse `ok` or `error:N`
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        if line == "ok" {
            return Ok(ResponseMessage::Ok);
        }
        let Some(code) = line.strip_prefix("error:") else {
            return Err(ProtocolError::UnrecognizedMessage {
                line: line.to_string(),
            });
        };
        code.parse()
            .map(|code| ResponseMessage::Error { code })
            .map_err(|e| ProtocolError::malformed("error code", e.to_string(), line))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseMessage::Ok)
    }

    /// Documented meaning of an `error:N`, `None` for `ok`
    ///
    /// Undocumented codes render as `unknown (error:N)`.
    pub fn error(&self) -> Option<String> {
        match self {
            ResponseMessage::Ok => None,
            ResponseMessage::Error { code } => Some(
                error_description(*code)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("unknown ({})", self)),
            ),
        }
    }

    /// `Ok(())` for `ok`, `CommandRejected` for `error:N`
    pub fn into_result(self) -> Result<(), ControllerError> {
        match self {
            ResponseMessage::Ok => Ok(()),
            ResponseMessage::Error { code } => Err(ControllerError::CommandRejected {
                code: code.to_string(),
                description: self.error().unwrap_or_default(),
            }),
        }
    }
}

impl fmt::Display for ResponseMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMessage::Ok => f.write_str("ok"),
            ResponseMessage::Error { code } => write!(f, "error:{}", code),
        }
    }
}

/// Any line received from Grbl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Response(ResponseMessage),
    Push(PushMessage),
}

impl Message {
    /// Classify a received line (without its line terminator)
    ///
    /// Responses are tried first. A line with no known prefix becomes
    /// [`PushMessage::Unknown`]; a line with a known prefix but malformed
    /// content is an error.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        if line == "ok" || line.starts_with("error:") {
            return ResponseMessage::parse(line).map(Message::Response);
        }
        match PushMessage::parse(line) {
            Ok(push) => Ok(Message::Push(push)),
            Err(ProtocolError::UnrecognizedMessage { line }) => {
                Ok(Message::Push(PushMessage::Unknown { raw: line }))
            }
            Err(e) => Err(e),
        }
    }
}
