//! GRBL Status Report Parsing
//!
//! Format: `<State[:Sub]|Field:Value|Field:Value...>`. The machine state is
//! mandatory; every other field is optional. Fields Grbl may add in future
//! versions are ignored, but a known field with a bad value is an error.

use crate::firmware::grbl::gcode_params::Coordinates;
use grblkit_core::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine state reported first in every status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    Idle,
    Run,
    Hold,
    Jog,
    Alarm,
    Door,
    Check,
    Home,
    Sleep,
}

impl MachineState {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Idle" => MachineState::Idle,
            "Run" => MachineState::Run,
            "Hold" => MachineState::Hold,
            "Jog" => MachineState::Jog,
            "Alarm" => MachineState::Alarm,
            "Door" => MachineState::Door,
            "Check" => MachineState::Check,
            "Home" => MachineState::Home,
            "Sleep" => MachineState::Sleep,
            _ => return None,
        })
    }

    /// Meaning of a substate code for this state
    pub fn sub_state_description(&self, code: u8) -> Option<&'static str> {
        match (self, code) {
            (MachineState::Hold, 0) => Some("Hold complete. Ready to resume."),
            (MachineState::Hold, 1) => Some("Hold in-progress. Reset will throw an alarm."),
            (MachineState::Door, 0) => Some("Door closed. Ready to resume."),
            (MachineState::Door, 1) => Some("Machine stopped. Door still ajar. Can't resume until closed."),
            (MachineState::Door, 2) => {
                Some("Door opened. Hold (or parking retract) in-progress. Reset will throw an alarm.")
            }
            (MachineState::Door, 3) => {
                Some("Door closed and resuming. Restoring from park, if applicable. Reset will throw an alarm.")
            }
            _ => None,
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// `Bf:` planner blocks and RX bytes available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferState {
    pub planner_blocks_available: u32,
    pub rx_bytes_available: u32,
}

/// `FS:` current feed and spindle speed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedSpindle {
    pub feed: f64,
    pub spindle: f64,
}

/// `Ov:` override percentages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    pub feed: f64,
    pub rapid: f64,
    pub spindle: f64,
}

/// `Pn:` input pins currently triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PinState {
    pub x_limit: bool,
    pub y_limit: bool,
    pub z_limit: bool,
    pub probe: bool,
    pub door: bool,
    pub hold: bool,
    pub soft_reset: bool,
    pub cycle_start: bool,
}

/// `A:` accessory outputs; all off when Grbl omits the field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessoryState {
    pub spindle_cw: bool,
    pub spindle_ccw: bool,
    pub flood_coolant: bool,
    pub mist_coolant: bool,
}

/// A decoded status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: MachineState,
    pub sub_state: Option<u8>,
    pub machine_position: Option<Coordinates>,
    pub work_position: Option<Coordinates>,
    pub work_coordinate_offset: Option<Coordinates>,
    pub buffer: Option<BufferState>,
    pub line_number: Option<u32>,
    pub feed: Option<f64>,
    pub feed_spindle: Option<FeedSpindle>,
    pub pins: Option<PinState>,
    pub overrides: Option<Overrides>,
    pub accessories: Option<AccessoryState>,
}

fn numbers<T: std::str::FromStr>(field: &str, text: &str, count: usize, line: &str) -> Result<Vec<T>, ProtocolError>
where
    T::Err: fmt::Display,
{
    let values = text
        .split(',')
        .map(|v| v.trim().parse::<T>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProtocolError::malformed(field, e.to_string(), line))?;
    if values.len() != count {
        return Err(ProtocolError::malformed(
            field,
            format!("expected {} values, got {}", count, values.len()),
            line,
        ));
    }
    Ok(values)
}

impl StatusReport {
    /// Parse a full `<...>` status line
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let inner = line
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .ok_or_else(|| ProtocolError::malformed("status report", "missing angle brackets", line))?;

        let mut fields = inner.split('|');
        let state_field = fields.next().unwrap_or_default();
        let (name, sub) = match state_field.split_once(':') {
            Some((name, sub)) => (name, Some(sub)),
            None => (state_field, None),
        };
        let state = MachineState::from_name(name).ok_or_else(|| {
            ProtocolError::malformed("machine state", format!("unknown state {:?}", name), line)
        })?;
        let sub_state = match sub {
            None => None,
            Some(sub) => {
                let code: u8 = sub
                    .parse()
                    .map_err(|e| ProtocolError::malformed("machine substate", format!("{}", e), line))?;
                if state.sub_state_description(code).is_none() {
                    return Err(ProtocolError::malformed(
                        "machine substate",
                        format!("{} has no substate {}", state, code),
                        line,
                    ));
                }
                Some(code)
            }
        };

        let mut report = StatusReport {
            state,
            sub_state,
            machine_position: None,
            work_position: None,
            work_coordinate_offset: None,
            buffer: None,
            line_number: None,
            feed: None,
            feed_spindle: None,
            pins: None,
            overrides: None,
            accessories: None,
        };

        for field in fields {
            let (key, value) = field.split_once(':').ok_or_else(|| {
                ProtocolError::malformed("status field", format!("{:?} has no value", field), line)
            })?;
            match key {
                "MPos" => report.machine_position = Some(Coordinates::parse(key, value, line)?),
                "WPos" => report.work_position = Some(Coordinates::parse(key, value, line)?),
                "WCO" => report.work_coordinate_offset = Some(Coordinates::parse(key, value, line)?),
                "Bf" => {
                    let v = numbers::<u32>(key, value, 2, line)?;
                    report.buffer = Some(BufferState {
                        planner_blocks_available: v[0],
                        rx_bytes_available: v[1],
                    });
                }
                "Ln" => report.line_number = Some(numbers::<u32>(key, value, 1, line)?[0]),
                "F" => report.feed = Some(numbers::<f64>(key, value, 1, line)?[0]),
                "FS" => {
                    let v = numbers::<f64>(key, value, 2, line)?;
                    report.feed_spindle = Some(FeedSpindle {
                        feed: v[0],
                        spindle: v[1],
                    });
                }
                "Ov" => {
                    let v = numbers::<f64>(key, value, 3, line)?;
                    report.overrides = Some(Overrides {
                        feed: v[0],
                        rapid: v[1],
                        spindle: v[2],
                    });
                }
                "Pn" => report.pins = Some(parse_pins(value, line)?),
                "A" => report.accessories = Some(parse_accessories(value, line)?),
                other => tracing::trace!("Ignoring status field {}", other),
            }
        }

        Ok(report)
    }

    /// Meaning of the substate, if any
    pub fn sub_state_description(&self) -> Option<&'static str> {
        self.sub_state
            .and_then(|code| self.state.sub_state_description(code))
    }
}

fn parse_pins(value: &str, line: &str) -> Result<PinState, ProtocolError> {
    let mut pins = PinState::default();
    for c in value.chars() {
        let pin = match c {
            'X' => &mut pins.x_limit,
            'Y' => &mut pins.y_limit,
            'Z' => &mut pins.z_limit,
            'P' => &mut pins.probe,
            'D' => &mut pins.door,
            'H' => &mut pins.hold,
            'R' => &mut pins.soft_reset,
            'S' => &mut pins.cycle_start,
            other => {
                return Err(ProtocolError::malformed("Pn", format!("unknown pin {:?}", other), line))
            }
        };
        *pin = true;
    }
    Ok(pins)
}

fn parse_accessories(value: &str, line: &str) -> Result<AccessoryState, ProtocolError> {
    let mut accessories = AccessoryState::default();
    for c in value.chars() {
        let flag = match c {
            'S' => &mut accessories.spindle_cw,
            'C' => &mut accessories.spindle_ccw,
            'F' => &mut accessories.flood_coolant,
            'M' => &mut accessories.mist_coolant,
            other => {
                return Err(ProtocolError::malformed("A", format!("unknown accessory {:?}", other), line))
            }
        };
        *flag = true;
    }
    Ok(accessories)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_idle_report() {
        let report = StatusReport::parse("<Idle|MPos:0.000,0.000,0.000|FS:0,0>").unwrap();
        assert_eq!(report.state, MachineState::Idle);
        assert_eq!(report.sub_state, None);
        assert_eq!(report.machine_position, Some(Coordinates::new(0.0, 0.0, 0.0)));
        assert_eq!(report.feed_spindle, Some(FeedSpindle { feed: 0.0, spindle: 0.0 }));
        assert!(report.work_position.is_none());
    }

    #[test]
    fn test_full_report() {
        let report = StatusReport::parse(
            "<Run|WPos:1.000,2.000,3.000,4.000|Bf:15,128|Ln:99|FS:500,8000|WCO:0.000,0.000,-1.000|Pn:XP|Ov:100,50,120|A:SFM>",
        )
        .unwrap();
        assert_eq!(report.state, MachineState::Run);
        assert_eq!(report.work_position.unwrap().a, Some(4.0));
        assert_eq!(
            report.buffer,
            Some(BufferState {
                planner_blocks_available: 15,
                rx_bytes_available: 128
            })
        );
        assert_eq!(report.line_number, Some(99));
        assert_eq!(report.work_coordinate_offset.unwrap().z, -1.0);
        let pins = report.pins.unwrap();
        assert!(pins.x_limit && pins.probe && !pins.door);
        assert_eq!(report.overrides.unwrap().rapid, 50.0);
        let a = report.accessories.unwrap();
        assert!(a.spindle_cw && a.flood_coolant && a.mist_coolant && !a.spindle_ccw);
    }

    #[test]
    fn test_substates() {
        let report = StatusReport::parse("<Hold:1|MPos:0,0,0>").unwrap();
        assert_eq!(report.sub_state, Some(1));
        assert_eq!(
            report.sub_state_description(),
            Some("Hold in-progress. Reset will throw an alarm.")
        );
        assert!(StatusReport::parse("<Door:3|MPos:0,0,0>").is_ok());
        assert!(StatusReport::parse("<Door:4|MPos:0,0,0>").is_err());
        assert!(StatusReport::parse("<Idle:0|MPos:0,0,0>").is_err());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let report = StatusReport::parse("<Idle|MPos:0,0,0|Xyz:whatever>").unwrap();
        assert_eq!(report.state, MachineState::Idle);
    }

    #[test]
    fn test_feed_only() {
        let report = StatusReport::parse("<Idle|MPos:0,0,0|F:250.5>").unwrap();
        assert_eq!(report.feed, Some(250.5));
    }

    #[test]
    fn test_malformed_fields() {
        assert!(StatusReport::parse("<Bogus|MPos:0,0,0>").is_err());
        assert!(StatusReport::parse("<Idle|MPos:0,0>").is_err());
        assert!(StatusReport::parse("<Idle|Bf:15>").is_err());
        assert!(StatusReport::parse("<Idle|Ov:100,100>").is_err());
        assert!(StatusReport::parse("<Idle|Pn:Q>").is_err());
        assert!(StatusReport::parse("<Idle|A:Z>").is_err());
        assert!(StatusReport::parse("<Idle|MPos>").is_err());
        let err = StatusReport::parse("<Idle|MPos:0,0,0").unwrap_err();
        assert!(err.to_string().contains("<Idle|MPos:0,0,0"));
    }
}
