//! Beat-locked edit effects
//!
//! Lengths given in seconds are snapped down to whole beats of the reference
//! tempo so edited material stays on the grid.

use crate::tempo::{normalize_tempo, TempoError};
use crate::track::AudioTrack;

/// Longest audio a single `repeat` may produce
pub const MAX_LOOP_S: f64 = 3600.0;

/// Largest whole-beat multiple of `seconds_per_beat` not above `seconds`
fn snap_to_beats(seconds: f64, seconds_per_beat: f64) -> f64 {
    seconds - seconds % seconds_per_beat
}

/// Gain ramp to `gain_db` over `duration_s` from `start_s`, held afterwards
pub fn apply_fade(track: &AudioTrack, duration_s: f64, start_s: f64, gain_db: f64) -> AudioTrack {
    track.fade(gain_db, start_s * 1000.0, duration_s * 1000.0)
}

/// Replace the beat-snapped slice at `start_s` with `count` copies of itself
///
/// The track grows by `(count - 1)` slice lengths; a count of zero removes
/// the slice. `None` when the loop would run longer than [`MAX_LOOP_S`].
pub fn apply_repeat(
    track: &AudioTrack,
    duration_s: f64,
    count: usize,
    start_s: f64,
    bpm: f64,
) -> Option<AudioTrack> {
    let position = start_s * 1000.0;
    let displacement = snap_to_beats(duration_s, 60.0 / bpm) * 1000.0;

    let slice = track.slice_ms(position, position + displacement);
    if slice.duration_seconds() * count as f64 > MAX_LOOP_S {
        return None;
    }
    let looped = slice.repeated(count)?;
    Some(
        track
            .head_ms(position)
            .concat(&looped)
            .concat(&track.tail_ms(position + displacement)),
    )
}

/// Play the slice at `start_s` `factor` times faster
///
/// The slice read from the track spans `duration_s * factor` seconds snapped
/// to beats of the sped tempo, so after resampling it fills whole beats of
/// the reference tempo.
pub fn apply_speed(
    track: &AudioTrack,
    duration_s: f64,
    start_s: f64,
    factor: f64,
    bpm: f64,
) -> Result<AudioTrack, TempoError> {
    let position = start_s * 1000.0;
    let sped_bpm = bpm / factor;
    let displacement = snap_to_beats(duration_s * factor, 60.0 / sped_bpm) * 1000.0;

    let sped = normalize_tempo(&track.slice_ms(position, position + displacement), factor)?;
    Ok(track
        .head_ms(position)
        .concat(&sped)
        .concat(&track.tail_ms(position + displacement)))
}

/// First `end_s` seconds of the track
pub fn apply_slice(track: &AudioTrack, end_s: f64) -> AudioTrack {
    track.head_ms(end_s * 1000.0)
}
