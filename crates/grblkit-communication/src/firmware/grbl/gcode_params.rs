//! G-code parameters (`$#` output)
//!
//! Grbl prints one parameter per line (`[G54:...]`, `[G28:...]`,
//! `[TLO:...]`, `[PRB:...]`). Each line becomes a [`GcodeParam`] and is
//! merged into a long-lived [`GcodeParameters`] snapshot.

use grblkit_core::ProtocolError;
use serde::{Deserialize, Serialize};

/// An X, Y, Z and optional A coordinate
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: Option<f64>,
}

impl Coordinates {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z, a: None }
    }

    /// Parse 3 or 4 comma separated numbers
    ///
    /// `field` and `line` only feed the error message.
    pub fn parse(field: &str, text: &str, line: &str) -> Result<Self, ProtocolError> {
        let values = text
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProtocolError::malformed(field, e.to_string(), line))?;

        match values.as_slice() {
            [x, y, z] => Ok(Self::new(*x, *y, *z)),
            [x, y, z, a] => Ok(Self {
                x: *x,
                y: *y,
                z: *z,
                a: Some(*a),
            }),
            _ => Err(ProtocolError::malformed(
                field,
                format!("expected 3 or 4 values, got {}", values.len()),
                line,
            )),
        }
    }

    /// Component-wise difference; A is kept only when both have it
    pub fn minus(&self, other: &Coordinates) -> Coordinates {
        Coordinates {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
            a: self.a.zip(other.a).map(|(a, b)| a - b),
        }
    }

    /// Component-wise sum; A is kept only when both have it
    pub fn plus(&self, other: &Coordinates) -> Coordinates {
        Coordinates {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
            a: self.a.zip(other.a).map(|(a, b)| a + b),
        }
    }
}

/// Result of the last probing cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub position: Coordinates,
    pub success: bool,
}

/// A single parameter line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GcodeParam {
    /// `[G54:..]` to `[G59:..]`; `number` is 54-59
    WorkCoordinateSystem { number: u8, offset: Coordinates },
    /// `[G28:..]`
    G28(Coordinates),
    /// `[G30:..]`
    G30(Coordinates),
    /// `[G92:..]`
    G92(Coordinates),
    /// `[TLO:..]`
    ToolLengthOffset(f64),
    /// `[PRB:x,y,z:success]`
    Probe(ProbeResult),
}

impl GcodeParam {
    /// Line prefixes that introduce a parameter
    pub const PREFIXES: [&'static str; 11] = [
        "[G54:", "[G55:", "[G56:", "[G57:", "[G58:", "[G59:", "[G28:", "[G30:", "[G92:", "[TLO:",
        "[PRB:",
    ];

    /// Parse a full `[TYPE:VALUE]` line
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let inner = line
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| ProtocolError::malformed("parameter", "missing brackets", line))?;
        let (kind, value) = inner
            .split_once(':')
            .ok_or_else(|| ProtocolError::malformed("parameter", "missing ':'", line))?;

        match kind {
            "G54" | "G55" | "G56" | "G57" | "G58" | "G59" => {
                let number = kind[1..]
                    .parse()
                    .map_err(|_| ProtocolError::malformed(kind, "invalid system", line))?;
                Ok(GcodeParam::WorkCoordinateSystem {
                    number,
                    offset: Coordinates::parse(kind, value, line)?,
                })
            }
            "G28" => Ok(GcodeParam::G28(Coordinates::parse(kind, value, line)?)),
            "G30" => Ok(GcodeParam::G30(Coordinates::parse(kind, value, line)?)),
            "G92" => Ok(GcodeParam::G92(Coordinates::parse(kind, value, line)?)),
            "TLO" => value
                .trim()
                .parse()
                .map(GcodeParam::ToolLengthOffset)
                .map_err(|e| ProtocolError::malformed("TLO", e.to_string(), line)),
            "PRB" => {
                let (position, success) = value
                    .rsplit_once(':')
                    .ok_or_else(|| ProtocolError::malformed("PRB", "missing success flag", line))?;
                let success = match success {
                    "0" => false,
                    "1" => true,
                    other => {
                        return Err(ProtocolError::malformed(
                            "PRB",
                            format!("invalid success flag {:?}", other),
                            line,
                        ))
                    }
                };
                Ok(GcodeParam::Probe(ProbeResult {
                    position: Coordinates::parse("PRB", position, line)?,
                    success,
                }))
            }
            _ => Err(ProtocolError::UnrecognizedMessage {
                line: line.to_string(),
            }),
        }
    }
}

/// Snapshot of every parameter seen since the last reset
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GcodeParameters {
    /// G54 through G59, in order
    pub work_coordinate_systems: [Option<Coordinates>; 6],
    pub g28: Option<Coordinates>,
    pub g30: Option<Coordinates>,
    pub g92: Option<Coordinates>,
    pub tool_length_offset: Option<f64>,
    pub probe: Option<ProbeResult>,
}

impl GcodeParameters {
    /// Merge one parameter into the snapshot
    pub fn update(&mut self, param: &GcodeParam) {
        match *param {
            GcodeParam::WorkCoordinateSystem { number, offset } => {
                if let Some(slot) = number
                    .checked_sub(54)
                    .and_then(|i| self.work_coordinate_systems.get_mut(i as usize))
                {
                    *slot = Some(offset);
                }
            }
            GcodeParam::G28(c) => self.g28 = Some(c),
            GcodeParam::G30(c) => self.g30 = Some(c),
            GcodeParam::G92(c) => self.g92 = Some(c),
            GcodeParam::ToolLengthOffset(v) => self.tool_length_offset = Some(v),
            GcodeParam::Probe(p) => self.probe = Some(p),
        }
    }

    /// Offset of work coordinate system `number` (54-59)
    pub fn work_coordinate_system(&self, number: u8) -> Option<Coordinates> {
        number
            .checked_sub(54)
            .and_then(|i| self.work_coordinate_systems.get(i as usize))
            .copied()
            .flatten()
    }
}
