//! Common types and fixed constants for automix

use std::fmt;
use std::str::FromStr;

/// Sample rate the beat detector runs at. Sources are resampled to it.
pub const ANALYSIS_SAMPLE_RATE: u32 = 44100;

/// Onset detector FFT window in samples
pub const ANALYSIS_WINDOW: usize = 1024;

/// Onset detector hop in samples
pub const ANALYSIS_HOP: usize = 512;

/// Only every n-th beat of the reference grid is phase-corrected
pub const BEAT_STRIDE: usize = 5;

/// Audio sample type (32-bit float for processing, stored as 16-bit in files)
pub type Sample = f32;

/// One of the two song slots a recipe line can address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackSlot {
    /// `s1`, the first (reference) song
    First,
    /// `s2`, the second (tempo-normalized) song
    Second,
}

impl TrackSlot {
    /// Recipe token for this slot
    pub fn token(&self) -> &'static str {
        match self {
            TrackSlot::First => "s1",
            TrackSlot::Second => "s2",
        }
    }
}

impl FromStr for TrackSlot {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s1" => Ok(TrackSlot::First),
            "s2" => Ok(TrackSlot::Second),
            _ => Err(()),
        }
    }
}

impl fmt::Display for TrackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Convert a gain in decibels to a linear amplitude factor
#[inline]
pub fn db_to_amplitude(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Convert a linear amplitude to decibels (negative infinity for silence)
#[inline]
pub fn amplitude_to_db(amplitude: f64) -> f64 {
    if amplitude > 0.0 {
        20.0 * amplitude.log10()
    } else {
        f64::NEG_INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_tokens() {
        assert_eq!("s1".parse::<TrackSlot>(), Ok(TrackSlot::First));
        assert_eq!("s2".parse::<TrackSlot>(), Ok(TrackSlot::Second));
        assert!("S1".parse::<TrackSlot>().is_err());
        assert_eq!(TrackSlot::Second.to_string(), "s2");
    }

    #[test]
    fn test_db_conversion() {
        assert!((db_to_amplitude(0.0) - 1.0).abs() < 1e-12);
        assert!((db_to_amplitude(20.0) - 10.0).abs() < 1e-9);
        assert!((amplitude_to_db(0.1) + 20.0).abs() < 1e-9);
        assert_eq!(amplitude_to_db(0.0), f64::NEG_INFINITY);
    }
}
