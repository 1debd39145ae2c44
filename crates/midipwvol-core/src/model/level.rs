// ── Normalized control levels ──
//
// Every requested value travels through the core as a 0.0–1.0 level and
// is converted to a surface's native scale only when a flush issues the
// call.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest value a 7-bit MIDI data byte can carry.
const MIDI_MAX: u8 = 127;

/// A control value in the normalized `0.0..=1.0` range.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Level(f64);

impl Level {
    pub const MIN: Self = Self(0.0);
    pub const MAX: Self = Self(1.0);

    /// Build a level, clamping into range. NaN maps to zero.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::MIN;
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Map a 7-bit MIDI value (0–127) onto the full range.
    pub fn from_midi(value: u8) -> Self {
        Self::new(f64::from(value.min(MIDI_MAX)) / f64::from(MIDI_MAX))
    }

    pub fn get(self) -> f64 {
        self.0
    }

    /// Linearly remap this level into `[lo, hi]` (both normalized).
    pub fn remap(self, lo: Self, hi: Self) -> Self {
        Self::new(lo.0 + (hi.0 - lo.0) * self.0)
    }

    /// Scale onto an integer range `0..=max`, truncating toward zero.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
    pub fn to_scale(self, max: u16) -> u16 {
        (self.0 * f64::from(max)) as u16
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_values() {
        assert_eq!(Level::new(1.7), Level::MAX);
        assert_eq!(Level::new(-0.2), Level::MIN);
        assert_eq!(Level::new(f64::NAN), Level::MIN);
    }

    #[test]
    fn midi_extremes_map_to_range_ends() {
        assert_eq!(Level::from_midi(0), Level::MIN);
        assert_eq!(Level::from_midi(127), Level::MAX);
    }

    #[test]
    fn to_scale_truncates() {
        // 64 / 127 * 100 = 50.39...
        assert_eq!(Level::from_midi(64).to_scale(100), 50);
        assert_eq!(Level::MAX.to_scale(100), 100);
    }

    #[test]
    fn remap_into_sub_range() {
        let level = Level::new(0.5).remap(Level::new(0.2), Level::new(0.6));
        assert!((level.get() - 0.4).abs() < 1e-9);
    }
}
