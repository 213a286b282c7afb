//! Final mixdown
//!
//! Pairwise additive overlay: loudness sums, nothing is averaged, limited or
//! clipped. The first track sets the length and format of the mix; other
//! tracks are conformed to it, padded with silence when shorter and cut
//! when longer.

use crate::tempo::TempoError;
use crate::track::AudioTrack;

/// Overlay `b` and then `c` onto `a`
pub fn mix(a: &AudioTrack, b: &AudioTrack, c: &AudioTrack) -> Result<AudioTrack, TempoError> {
    a.overlay(b)?.overlay(c)
}
