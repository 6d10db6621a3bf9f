//! Push messages
//!
//! Lines Grbl sends that are not `ok`/`error:N` acknowledgments. The
//! dispatcher matches literal prefixes in a fixed order and never guesses:
//! a line with no known prefix is an error here, and only
//! [`Message::parse`](crate::firmware::grbl::Message::parse) turns it into
//! [`PushMessage::Unknown`].

use crate::firmware::grbl::compile_options::CompileTimeOptions;
use crate::firmware::grbl::error_decoder::{alarm_description, setting_description};
use crate::firmware::grbl::gcode_params::GcodeParam;
use crate::firmware::grbl::gcode_state::GcodeState;
use crate::firmware::grbl::message::ResponseMessage;
use crate::firmware::grbl::status_report::StatusReport;
use grblkit_core::ProtocolError;
use serde::{Deserialize, Serialize};

/// Any non-acknowledgment line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PushMessage {
    /// `Grbl 1.1h ['$' for help]`, printed after every reset
    Welcome { raw: String, version: String },
    /// `ALARM:N`
    Alarm { raw: String, code: u16 },
    /// `$N=value` or `$Nx=line`
    Setting { raw: String, key: String, value: String },
    /// `[MSG:...]`
    Feedback { raw: String, message: String },
    /// `[GC:...]`
    GcodeState { raw: String, state: GcodeState },
    /// `[HLP:...]`
    Help { raw: String, commands: Vec<String> },
    /// `[G54:...]`, `[TLO:...]`, `[PRB:...]` and friends
    GcodeParam { raw: String, param: GcodeParam },
    /// `[VER:version:info]`
    Version { raw: String, version: String, info: String },
    /// `[OPT:...]`
    CompileTimeOptions { raw: String, options: CompileTimeOptions },
    /// `>line:ok` or `>line:error:N`
    StartupLineExecution { raw: String, line: String, response: ResponseMessage },
    /// `<...>`
    StatusReport { raw: String, report: StatusReport },
    /// `[echo:...]`
    Echo { raw: String, text: String },
    /// An empty line
    Empty,
    /// A line with no known prefix
    Unknown { raw: String },
}

fn bracketed<'a>(line: &'a str, prefix: &str, field: &str) -> Result<&'a str, ProtocolError> {
    line.strip_prefix(prefix)
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| ProtocolError::malformed(field, "missing closing ']'", line))
}

impl PushMessage {
    /// Decode a push message, strictly
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let raw = line.to_string();

        if let Some(rest) = line.strip_prefix("Grbl ") {
            let version = rest.split_whitespace().next().unwrap_or_default().to_string();
            return Ok(PushMessage::Welcome { raw, version });
        }

        if let Some(code) = line.strip_prefix("ALARM:") {
            let code = code
                .parse()
                .map_err(|e| ProtocolError::malformed("alarm code", format!("{}", e), line))?;
            return Ok(PushMessage::Alarm { raw, code });
        }

        if let Some(setting) = line.strip_prefix('$') {
            let mut parts = setting.split('=');
            let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(ProtocolError::malformed("setting", "expected exactly one '='", line));
            };
            return Ok(PushMessage::Setting {
                raw,
                key: key.to_string(),
                value: value.to_string(),
            });
        }

        if line.starts_with("[MSG:") {
            let message = bracketed(line, "[MSG:", "MSG")?.to_string();
            return Ok(PushMessage::Feedback { raw, message });
        }

        if line.starts_with("[GC:") {
            let state = GcodeState::parse(line)?;
            return Ok(PushMessage::GcodeState { raw, state });
        }

        if line.starts_with("[HLP:") {
            let commands = bracketed(line, "[HLP:", "HLP")?
                .split_whitespace()
                .map(str::to_string)
                .collect();
            return Ok(PushMessage::Help { raw, commands });
        }

        if GcodeParam::PREFIXES.iter().any(|p| line.starts_with(p)) {
            let param = GcodeParam::parse(line)?;
            return Ok(PushMessage::GcodeParam { raw, param });
        }

        if line.starts_with("[VER:") {
            let inner = bracketed(line, "[VER:", "VER")?;
            let (version, info) = inner.split_once(':').unwrap_or((inner, ""));
            return Ok(PushMessage::Version {
                raw,
                version: version.to_string(),
                info: info.to_string(),
            });
        }

        if line.starts_with("[OPT:") {
            let options = CompileTimeOptions::parse(line)?;
            return Ok(PushMessage::CompileTimeOptions { raw, options });
        }

        if let Some(rest) = line.strip_prefix('>') {
            let (startup, response) = split_startup_result(rest)
                .ok_or_else(|| ProtocolError::malformed("startup line", "missing ':ok' or ':error:N'", line))?;
            let response = ResponseMessage::parse(response)
                .map_err(|e| ProtocolError::malformed("startup line result", e.to_string(), line))?;
            return Ok(PushMessage::StartupLineExecution {
                raw,
                line: startup.to_string(),
                response,
            });
        }

        if line.starts_with('<') {
            let report = StatusReport::parse(line)?;
            return Ok(PushMessage::StatusReport { raw, report });
        }

        if line.starts_with("[echo:") {
            let text = bracketed(line, "[echo:", "echo")?.to_string();
            return Ok(PushMessage::Echo { raw, text });
        }

        if line.is_empty() {
            return Ok(PushMessage::Empty);
        }

        Err(ProtocolError::UnrecognizedMessage { line: raw })
    }

    /// The line as received
    pub fn raw(&self) -> &str {
        match self {
            PushMessage::Welcome { raw, .. }
            | PushMessage::Alarm { raw, .. }
            | PushMessage::Setting { raw, .. }
            | PushMessage::Feedback { raw, .. }
            | PushMessage::GcodeState { raw, .. }
            | PushMessage::Help { raw, .. }
            | PushMessage::GcodeParam { raw, .. }
            | PushMessage::Version { raw, .. }
            | PushMessage::CompileTimeOptions { raw, .. }
            | PushMessage::StartupLineExecution { raw, .. }
            | PushMessage::StatusReport { raw, .. }
            | PushMessage::Echo { raw, .. }
            | PushMessage::Unknown { raw } => raw,
            PushMessage::Empty => "",
        }
    }

    /// Documented meaning of an alarm; undocumented codes render as
    /// `unknown (ALARM:N)`
    pub fn alarm(&self) -> Option<String> {
        match self {
            PushMessage::Alarm { raw, code } => Some(
                alarm_description(*code)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("unknown ({})", raw)),
            ),
            _ => None,
        }
    }

    /// Name and unit of a numeric `$N=` setting
    pub fn setting_description(&self) -> Option<&'static str> {
        match self {
            PushMessage::Setting { key, .. } => key.parse().ok().and_then(setting_description),
            _ => None,
        }
    }
}

/// Split `G54G20:ok` / `G0:error:20` into line and result
fn split_startup_result(rest: &str) -> Option<(&str, &str)> {
    if let Some(line) = rest.strip_suffix(":ok") {
        return Some((line, "ok"));
    }
    let idx = rest.rfind(":error:")?;
    Some((&rest[..idx], &rest[idx + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome() {
        let msg = PushMessage::parse("Grbl 1.1h ['$' for help]").unwrap();
        assert_eq!(
            msg,
            PushMessage::Welcome {
                raw: "Grbl 1.1h ['$' for help]".to_string(),
                version: "1.1h".to_string()
            }
        );
    }

    #[test]
    fn test_alarm() {
        let msg = PushMessage::parse("ALARM:9").unwrap();
        assert!(msg.alarm().unwrap().starts_with("Homing fail. Could not find limit switch"));
        assert_eq!(PushMessage::parse("ALARM:42").unwrap().alarm().unwrap(), "unknown (ALARM:42)");
        assert!(PushMessage::parse("ALARM:").is_err());
    }

    #[test]
    fn test_settings() {
        match PushMessage::parse("$110=500.000").unwrap() {
            PushMessage::Setting { key, value, .. } => {
                assert_eq!(key, "110");
                assert_eq!(value, "500.000");
            }
            other => panic!("unexpected {:?}", other),
        }
        let msg = PushMessage::parse("$N0=G54").unwrap();
        assert!(msg.setting_description().is_none());
        assert_eq!(
            PushMessage::parse("$22=1").unwrap().setting_description(),
            Some("Homing cycle enable, boolean")
        );
        assert!(PushMessage::parse("$N0=G0=1").is_err());
        assert!(PushMessage::parse("$$").is_err());
    }

    #[test]
    fn test_feedback_help_echo() {
        assert!(matches!(
            PushMessage::parse("[MSG:'$H'|'$X' to unlock]").unwrap(),
            PushMessage::Feedback { message, .. } if message == "'$H'|'$X' to unlock"
        ));
        match PushMessage::parse("[HLP:$$ $# $G $I $N $x=val $Nx=line $J=line $C $X $H ~ ! ? ctrl-x]").unwrap() {
            PushMessage::Help { commands, .. } => assert_eq!(commands.len(), 15),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            PushMessage::parse("[echo:G1X0]").unwrap(),
            PushMessage::Echo { text, .. } if text == "G1X0"
        ));
        assert!(PushMessage::parse("[MSG:unterminated").is_err());
    }

    #[test]
    fn test_version() {
        match PushMessage::parse("[VER:1.1h.20190825:My mill]").unwrap() {
            PushMessage::Version { version, info, .. } => {
                assert_eq!(version, "1.1h.20190825");
                assert_eq!(info, "My mill");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_startup_line() {
        match PushMessage::parse(">G54G20:ok").unwrap() {
            PushMessage::StartupLineExecution { line, response, .. } => {
                assert_eq!(line, "G54G20");
                assert_eq!(response, ResponseMessage::Ok);
            }
            other => panic!("unexpected {:?}", other),
        }
        match PushMessage::parse(">G1:error:22").unwrap() {
            PushMessage::StartupLineExecution { line, response, .. } => {
                assert_eq!(line, "G1");
                assert_eq!(response, ResponseMessage::Error { code: 22 });
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(PushMessage::parse(">G54").is_err());
    }

    #[test]
    fn test_nested_parsers() {
        assert!(matches!(
            PushMessage::parse("<Idle|MPos:0.000,0.000,0.000|FS:0,0>").unwrap(),
            PushMessage::StatusReport { .. }
        ));
        assert!(matches!(
            PushMessage::parse("[G28:0.000,0.000,0.000]").unwrap(),
            PushMessage::GcodeParam { .. }
        ));
        assert!(matches!(
            PushMessage::parse("[OPT:V,15,128]").unwrap(),
            PushMessage::CompileTimeOptions { .. }
        ));
        assert!(matches!(
            PushMessage::parse("[GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0]").unwrap(),
            PushMessage::GcodeState { .. }
        ));
    }

    #[test]
    fn test_empty_and_unrecognized() {
        assert_eq!(PushMessage::parse("").unwrap(), PushMessage::Empty);
        assert!(matches!(
            PushMessage::parse("[FOO:1]").unwrap_err(),
            ProtocolError::UnrecognizedMessage { .. }
        ));
        assert!(PushMessage::parse("hello").is_err());
    }

    #[test]
    fn test_raw_is_preserved() {
        let line = "[MSG:Pgm End]";
        assert_eq!(PushMessage::parse(line).unwrap().raw(), line);
    }
}
