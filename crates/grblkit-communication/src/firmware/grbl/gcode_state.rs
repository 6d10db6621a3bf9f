//! Parser state report (`[GC:...]`, answer to `$G`).

use grblkit_core::ProtocolError;
use grblkit_gcode::{DistanceMode, Units, Word};
use serde::{Deserialize, Serialize};

/// Active modal groups as reported by Grbl
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GcodeState {
    /// G0, G1, G2, G3, G38.2-G38.5, G80
    pub motion: Option<Word>,
    /// G17, G18, G19
    pub plane_selection: Option<Word>,
    /// G90, G91
    pub distance_mode: Option<Word>,
    /// G93, G94
    pub feed_rate_mode: Option<Word>,
    /// G20, G21
    pub units: Option<Word>,
    /// G40
    pub cutter_radius_compensation: Option<Word>,
    /// G43.1, G49
    pub tool_length_offset: Option<Word>,
    /// G54-G59
    pub coordinate_system: Option<Word>,
    /// M0, M1, M2, M30
    pub program_stop: Option<Word>,
    /// M3, M4, M5
    pub spindle: Option<Word>,
    /// M7, M8 (both may be active) or M9
    pub coolant: Vec<Word>,
    pub tool: Option<f64>,
    pub feed_rate: Option<f64>,
    pub spindle_speed: Option<f64>,
}

impl GcodeState {
    /// Parse a full `[GC:...]` line
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let inner = line
            .strip_prefix("[GC:")
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| ProtocolError::malformed("GC", "missing brackets", line))?;

        let mut state = GcodeState::default();
        for text in inner.split_whitespace() {
            let word: Word = text
                .parse()
                .map_err(|e: grblkit_core::GcodeError| ProtocolError::malformed("GC word", e.to_string(), line))?;
            state.apply(word, line)?;
        }
        Ok(state)
    }

    fn apply(&mut self, word: Word, line: &str) -> Result<(), ProtocolError> {
        let value = word.value();
        let one_of = |codes: &[f64]| codes.contains(&value);

        let slot = match word.letter() {
            'T' => {
                self.tool = Some(value);
                return Ok(());
            }
            'F' => {
                self.feed_rate = Some(value);
                return Ok(());
            }
            'S' => {
                self.spindle_speed = Some(value);
                return Ok(());
            }
            'G' if one_of(&[0.0, 1.0, 2.0, 3.0, 38.2, 38.3, 38.4, 38.5, 80.0]) => &mut self.motion,
            'G' if one_of(&[17.0, 18.0, 19.0]) => &mut self.plane_selection,
            'G' if one_of(&[90.0, 91.0]) => &mut self.distance_mode,
            'G' if one_of(&[93.0, 94.0]) => &mut self.feed_rate_mode,
            'G' if one_of(&[20.0, 21.0]) => &mut self.units,
            'G' if one_of(&[40.0]) => &mut self.cutter_radius_compensation,
            'G' if one_of(&[43.1, 49.0]) => &mut self.tool_length_offset,
            'G' if one_of(&[54.0, 55.0, 56.0, 57.0, 58.0, 59.0]) => &mut self.coordinate_system,
            'M' if one_of(&[0.0, 1.0, 2.0, 30.0]) => &mut self.program_stop,
            'M' if one_of(&[3.0, 4.0, 5.0]) => &mut self.spindle,
            'M' if one_of(&[7.0, 8.0, 9.0]) => {
                self.coolant.push(word);
                return Ok(());
            }
            _ => {
                return Err(ProtocolError::malformed(
                    "GC word",
                    format!("unknown modal word {}", word),
                    line,
                ))
            }
        };
        *slot = Some(word);
        Ok(())
    }

    /// Units as a typed value
    pub fn units(&self) -> Option<Units> {
        match self.units.as_ref()?.value() {
            v if v == 20.0 => Some(Units::Inches),
            v if v == 21.0 => Some(Units::Millimeters),
            _ => None,
        }
    }

    /// Distance mode as a typed value
    pub fn distance_mode(&self) -> Option<DistanceMode> {
        match self.distance_mode.as_ref()?.value() {
            v if v == 90.0 => Some(DistanceMode::Absolute),
            v if v == 91.0 => Some(DistanceMode::Incremental),
            _ => None,
        }
    }
}
