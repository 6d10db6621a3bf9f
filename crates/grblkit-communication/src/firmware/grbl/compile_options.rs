//! Build options report (`[OPT:flags,blocks,rx]`, part of `$I`).

use grblkit_core::ProtocolError;
use serde::{Deserialize, Serialize};

/// Compile-time options of the connected firmware
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileTimeOptions {
    /// Option flag characters in the order reported
    pub flags: Vec<char>,
    /// Planner buffer size in blocks
    pub planner_blocks: u32,
    /// Serial receive buffer size in bytes
    pub serial_rx_buffer_bytes: u32,
}

impl CompileTimeOptions {
    /// Parse a full `[OPT:...]` line
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let inner = line
            .strip_prefix("[OPT:")
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| ProtocolError::malformed("OPT", "missing brackets", line))?;

        let fields: Vec<&str> = inner.split(',').collect();
        let [flags, blocks, rx] = fields.as_slice() else {
            return Err(ProtocolError::malformed(
                "OPT",
                format!("expected 3 fields, got {}", fields.len()),
                line,
            ));
        };

        Ok(Self {
            flags: flags.chars().collect(),
            planner_blocks: blocks
                .trim()
                .parse()
                .map_err(|e| ProtocolError::malformed("OPT planner blocks", format!("{}", e), line))?,
            serial_rx_buffer_bytes: rx
                .trim()
                .parse()
                .map_err(|e| ProtocolError::malformed("OPT rx buffer size", format!("{}", e), line))?,
        })
    }

    /// Descriptions of all flags, in order
    pub fn descriptions(&self) -> Vec<String> {
        self.flags.iter().map(|&c| describe_flag(c)).collect()
    }

    pub fn has(&self, flag: char) -> bool {
        self.flags.contains(&flag)
    }
}

/// Describe one option flag; undocumented flags render as `unknown (c)`
pub fn describe_flag(flag: char) -> String {
    let text = match flag {
        'V' => "Variable spindle enabled",
        'N' => "Line numbers enabled",
        'M' => "Mist coolant enabled",
        'C' => "CoreXY enabled",
        'P' => "Parking motion enabled",
        'Z' => "Homing force origin enabled",
        'H' => "Homing single axis enabled",
        'T' => "Two limit switches on axis enabled",
        'A' => "Allow feed rate overrides in probe cycles",
        'D' => "Use spindle direction as enable pin",
        '0' => "Spindle enable off when speed is zero",
        'S' => "Software limit pin debouncing enabled",
        'R' => "Parking override control enabled",
        '+' => "Safety door input pin enabled",
        '*' => "Restore all EEPROM disabled",
        '$' => "Restore EEPROM $ settings disabled",
        '#' => "Restore EEPROM parameter data disabled",
        'I' => "Build info write user string disabled",
        'E' => "Force sync upon EEPROM write disabled",
        'W' => "Force sync upon work coordinate offset change disabled",
        'L' => "Homing initialization auto-lock disabled",
        '2' => "Dual axis motors enabled",
        other => return format!("unknown ({})", other),
    };
    text.to_string()
}
