//! XY rotation of G-code blocks.

use crate::block::Block;
use crate::modal::{DistanceMode, ModalState, Units};
use crate::word::Word;
use grblkit_core::GcodeError;

/// Rotation about a point in the XY plane
///
/// Counter-clockwise looking down from +Z. The units and distance mode in
/// effect at construction are recorded; rotating a block read under a
/// different mode fails instead of rotating in the wrong frame.
///
/// In absolute mode a rotated target needs both coordinates. The program's
/// first X/Y move must therefore name both X and Y; after that, a move
/// naming one axis takes the other from the tracked position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XyRotation {
    center_x: f64,
    center_y: f64,
    sin: f64,
    cos: f64,
    units: Units,
    distance_mode: DistanceMode,
}

impl XyRotation {
    pub fn new(center_x: f64, center_y: f64, radians: f64, state: &ModalState) -> Self {
        Self {
            center_x,
            center_y,
            sin: radians.sin(),
            cos: radians.cos(),
            units: state.units,
            distance_mode: state.distance_mode,
        }
    }

    pub fn units(&self) -> Units {
        self.units
    }

    pub fn distance_mode(&self) -> DistanceMode {
        self.distance_mode
    }

    /// Rotate a point about the center
    pub fn rotate_point(&self, x: f64, y: f64) -> (f64, f64) {
        let (dx, dy) = self.rotate_vector(x - self.center_x, y - self.center_y);
        (self.center_x + dx, self.center_y + dy)
    }

    /// Rotate a displacement; the center does not matter
    pub fn rotate_vector(&self, dx: f64, dy: f64) -> (f64, f64) {
        (dx * self.cos - dy * self.sin, dx * self.sin + dy * self.cos)
    }
}

fn modal_error(reason: impl Into<String>) -> GcodeError {
    GcodeError::InvalidModalState {
        reason: reason.into(),
    }
}

impl Block {
    /// Rotate the block's X/Y target and I/J arc offsets in place
    ///
    /// `state` is the modal state the block is read under, as returned by
    /// [`Parser::block_context`](crate::Parser::block_context). In absolute
    /// mode a missing X or Y is taken from the tracked position and written
    /// out explicitly; with no position yet tracked for that axis the block
    /// fails with [`GcodeError::InvalidModalState`]. System lines are left
    /// untouched.
    pub fn rotate_xy(&mut self, rotation: &XyRotation, state: &ModalState) -> Result<(), GcodeError> {
        if self.is_system() {
            return Ok(());
        }
        if state.units != rotation.units {
            return Err(modal_error(format!(
                "units changed to {:?} after rotation was set up in {:?}",
                state.units, rotation.units
            )));
        }
        if state.distance_mode != rotation.distance_mode {
            return Err(modal_error(format!(
                "distance mode changed to {:?} after rotation was set up in {:?}",
                state.distance_mode, rotation.distance_mode
            )));
        }

        let (x, y) = (self.axis('X'), self.axis('Y'));
        let (i, j) = (self.axis('I'), self.axis('J'));
        let mut replacements = Vec::new();

        if x.is_some() || y.is_some() {
            for code in [10.0, 28.0, 30.0, 53.0, 92.0] {
                if self.words().any(|w| w.is('G', code)) {
                    return Err(modal_error(format!("cannot rotate X/Y of a G{} block", code)));
                }
            }

            let (nx, ny) = match rotation.distance_mode {
                DistanceMode::Absolute => {
                    let px = x
                        .or(state.x)
                        .ok_or_else(|| modal_error("X position unknown, cannot rotate Y alone"))?;
                    let py = y
                        .or(state.y)
                        .ok_or_else(|| modal_error("Y position unknown, cannot rotate X alone"))?;
                    rotation.rotate_point(px, py)
                }
                DistanceMode::Incremental => {
                    rotation.rotate_vector(x.unwrap_or(0.0), y.unwrap_or(0.0))
                }
            };
            replacements.push(Word::from_value('X', nx)?);
            replacements.push(Word::from_value('Y', ny)?);
        }

        if i.is_some() || j.is_some() {
            let (ni, nj) = rotation.rotate_vector(i.unwrap_or(0.0), j.unwrap_or(0.0));
            replacements.push(Word::from_value('I', ni)?);
            replacements.push(Word::from_value('J', nj)?);
        }

        if replacements.is_empty() {
            return Ok(());
        }

        let mut words = std::mem::take(self).into_words();
        for word in replacements {
            match words.iter_mut().find(|w| w.letter() == word.letter()) {
                Some(slot) => *slot = word,
                None => words.push(word),
            }
        }
        *self = Block::from_words(words);
        Ok(())
    }
}
