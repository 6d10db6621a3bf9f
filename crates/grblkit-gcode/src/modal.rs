//! Modal state tracked while parsing.
//!
//! Only the parts of the interpreter state that change how X/Y values must
//! be read: units, distance mode and the last known XY target.

use crate::block::Block;
use serde::{Deserialize, Serialize};

/// Units of measure (G20 / G21)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Units {
    /// G21
    #[default]
    Millimeters,
    /// G20
    Inches,
}

/// Distance mode (G90 / G91)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMode {
    /// G90
    #[default]
    Absolute,
    /// G91
    Incremental,
}

/// Parser-side modal state
///
/// Starts in Grbl's power-on defaults (G21, G90) with an unknown position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModalState {
    pub units: Units,
    pub distance_mode: DistanceMode,
    /// Last programmed X in the current work frame, if known
    pub x: Option<f64>,
    /// Last programmed Y in the current work frame, if known
    pub y: Option<f64>,
}

impl ModalState {
    /// Create state with power-on defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a block's effect on units, distance mode and position
    pub fn apply(&mut self, block: &Block) {
        if block.is_system() {
            return;
        }

        for word in block.words() {
            if word.is('G', 20.0) {
                self.units = Units::Inches;
            } else if word.is('G', 21.0) {
                self.units = Units::Millimeters;
            } else if word.is('G', 90.0) {
                self.distance_mode = DistanceMode::Absolute;
            } else if word.is('G', 91.0) {
                self.distance_mode = DistanceMode::Incremental;
            }
        }

        let x = block.axis('X');
        let y = block.axis('Y');
        let has = |code: f64| block.words().any(|w| w.is('G', code));

        if has(10.0) {
            // Offset tables only; the tool does not move.
        } else if has(92.0) {
            if x.is_some() {
                self.x = x;
            }
            if y.is_some() {
                self.y = y;
            }
        } else if has(28.0) || has(30.0) || has(92.1) {
            self.x = None;
            self.y = None;
        } else if has(53.0) {
            if x.is_some() {
                self.x = None;
            }
            if y.is_some() {
                self.y = None;
            }
        } else {
            self.x = self.advance(self.x, x);
            self.y = self.advance(self.y, y);
        }
    }

    fn advance(&self, current: Option<f64>, value: Option<f64>) -> Option<f64> {
        match (value, self.distance_mode) {
            (None, _) => current,
            (Some(v), DistanceMode::Absolute) => Some(v),
            (Some(v), DistanceMode::Incremental) => current.map(|c| c + v),
        }
    }
}
