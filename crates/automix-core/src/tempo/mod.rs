//! Tempo normalization by naive resampling
//!
//! A track is sped up by pretending it was recorded at `rate * speed` and
//! then converting it back to `rate`. Duration and pitch change together;
//! there is no independent time-stretch.
//!
//! Sample rate conversion itself goes through rubato's polynomial resampler,
//! driven chunk by chunk and trimmed to the exact expected frame count so
//! lengths stay deterministic.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use thiserror::Error;

use crate::track::AudioTrack;
use crate::types::Sample;

/// Input frames fed to the resampler per call
const CHUNK_FRAMES: usize = 4096;

/// Errors from resampling and tempo changes
#[derive(Error, Debug)]
pub enum TempoError {
    /// Speed factors must be finite and positive
    #[error("Invalid speed factor: {0}")]
    InvalidSpeed(f64),

    /// Speed factor so small the reinterpreted sample rate rounds to zero
    #[error("Speed factor {speed} is too small for a {sample_rate}Hz track")]
    RateUnderflow { speed: f64, sample_rate: u32 },

    #[error("Failed to set up resampler: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),

    #[error("Resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

/// Speed factor that brings a `track_bpm` song to `target_bpm`
///
/// Returns `None` when either tempo is zero or non-finite (no beats were
/// detected); callers treat that as a fatal precondition.
pub fn ratio_from_bpm(track_bpm: f64, target_bpm: f64) -> Option<f64> {
    let valid = |bpm: f64| bpm.is_finite() && bpm > 0.0;
    if valid(track_bpm) && valid(target_bpm) {
        Some(target_bpm / track_bpm)
    } else {
        None
    }
}

/// Play `track` `speed` times faster (`speed > 1` shortens it)
///
/// The output keeps the input's sample rate and channel count and lasts
/// `duration / speed`.
pub fn normalize_tempo(track: &AudioTrack, speed: f64) -> Result<AudioTrack, TempoError> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(TempoError::InvalidSpeed(speed));
    }
    let rate = track.sample_rate();
    let reinterpreted = (rate as f64 * speed).floor() as u32;
    if reinterpreted == 0 {
        return Err(TempoError::RateUnderflow {
            speed,
            sample_rate: rate,
        });
    }

    log::debug!(
        "normalize_tempo: speed {:.4}, reading {}Hz material as {}Hz",
        speed,
        rate,
        reinterpreted
    );

    track.clone().with_sample_rate(reinterpreted).resampled(rate)
}

/// Resample planar channel data by `ratio` (output rate / input rate)
///
/// The output has exactly `round(frames * ratio)` frames per channel; the
/// resampler's startup delay is trimmed off and the tail is flushed.
pub fn resample_channels(
    channels: &[Vec<Sample>],
    ratio: f64,
) -> Result<Vec<Vec<Sample>>, TempoError> {
    let frames_in = channels.first().map_or(0, Vec::len);
    let expected = (frames_in as f64 * ratio).round() as usize;
    if frames_in == 0 || channels.is_empty() {
        return Ok(vec![Vec::new(); channels.len()]);
    }

    let mut resampler = FastFixedIn::<Sample>::new(
        ratio,
        1.0,
        PolynomialDegree::Cubic,
        CHUNK_FRAMES,
        channels.len(),
    )?;
    let delay = resampler.output_delay();
    let wanted = expected + delay;
    let mut output: Vec<Vec<Sample>> = vec![Vec::with_capacity(wanted); channels.len()];

    let mut position = 0;
    while position + resampler.input_frames_next() <= frames_in {
        let needed = resampler.input_frames_next();
        let chunk: Vec<&[Sample]> = channels
            .iter()
            .map(|ch| &ch[position..position + needed])
            .collect();
        append(&mut output, resampler.process(chunk.as_slice(), None)?);
        position += needed;
    }

    if position < frames_in {
        let rest: Vec<&[Sample]> = channels.iter().map(|ch| &ch[position..]).collect();
        append(&mut output, resampler.process_partial(Some(rest.as_slice()), None)?);
    }

    // Push silence through until the delayed tail has come out
    while output[0].len() < wanted {
        let flushed = resampler.process_partial(None::<&[Vec<Sample>]>, None)?;
        if flushed.first().map_or(true, Vec::is_empty) {
            break;
        }
        append(&mut output, flushed);
    }

    for channel in &mut output {
        channel.drain(..delay.min(channel.len()));
        channel.resize(expected, 0.0);
    }
    Ok(output)
}

fn append(output: &mut [Vec<Sample>], produced: Vec<Vec<Sample>>) {
    for (dst, src) in output.iter_mut().zip(produced) {
        dst.extend_from_slice(&src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_calculation() {
        // 100 BPM song brought to 120 BPM plays 1.2x faster
        let ratio = ratio_from_bpm(100.0, 120.0).unwrap();
        assert!((ratio - 1.2).abs() < 1e-12);

        assert_eq!(ratio_from_bpm(0.0, 120.0), None);
        assert_eq!(ratio_from_bpm(120.0, 0.0), None);
        assert_eq!(ratio_from_bpm(f64::NAN, 120.0), None);
    }

    #[test]
    fn test_normalize_changes_duration() {
        let track = AudioTrack::from_mono(vec![0.25; 44100 * 2], 44100);
        let faster = normalize_tempo(&track, 1.25).unwrap();
        assert_eq!(faster.sample_rate(), 44100);
        assert!((faster.duration_ms() - 1600.0).abs() < 1.0);

        let slower = normalize_tempo(&track, 0.8).unwrap();
        assert!((slower.duration_ms() - 2500.0).abs() < 1.0);
    }

    #[test]
    fn test_normalize_round_trip_duration() {
        let track = AudioTrack::from_interleaved(vec![0.1; 44100 * 2 * 3], 44100, 2);
        let there = normalize_tempo(&track, 1.25).unwrap();
        let back = normalize_tempo(&there, 0.8).unwrap();
        assert_eq!(back.channels(), 2);
        assert!((back.duration_ms() - track.duration_ms()).abs() < 1.0);
    }

    #[test]
    fn test_resample_preserves_level() {
        let channels = vec![vec![0.5; 20000]];
        let out = resample_channels(&channels, 0.75).unwrap();
        assert_eq!(out[0].len(), 15000);
        // Constant input stays constant away from the edges
        assert!((out[0][7500] - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_invalid_speed_rejected() {
        let track = AudioTrack::from_mono(vec![0.0; 100], 44100);
        assert!(matches!(
            normalize_tempo(&track, 0.0),
            Err(TempoError::InvalidSpeed(_))
        ));
        assert!(matches!(
            normalize_tempo(&track, f64::INFINITY),
            Err(TempoError::InvalidSpeed(_))
        ));
    }

    #[test]
    fn test_resample_empty_input() {
        let out = resample_channels(&[Vec::new(), Vec::new()], 2.0).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].is_empty());
    }
}
