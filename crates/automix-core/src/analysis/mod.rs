//! Beat analysis
//!
//! Provides tempo estimation and beat lookup for songs and intermediate
//! renders.
//!
//! ## Detection
//!
//! The built-in [`SpectralBeatEstimator`] runs a spectral-difference onset
//! detector (1024-sample window, 512-sample hop, 44.1 kHz) over the whole
//! track and tracks beats on the resulting envelope within the configured
//! tempo range. Every source is downmixed and resampled to 44.1 kHz first.
//!
//! ## Sources
//!
//! Estimators work on files. In-memory tracks are passed as
//! [`BeatSource::Track`] and rendered to a scoped temporary WAV inside the
//! estimator, deleted again on every exit path; callers never see the file.

pub mod beatgrid;
pub mod onset;

pub use beatgrid::{track_beats, BeatGrid};
pub use onset::{onset_envelope, OnsetDetector};

use std::path::Path;

use thiserror::Error;

use crate::audio_file::{self, AudioFileError};
use crate::config::BpmConfig;
use crate::tempo::TempoError;
use crate::track::AudioTrack;
use crate::types::ANALYSIS_SAMPLE_RATE;

/// Errors from beat analysis
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Audio(#[from] AudioFileError),

    /// Conversion to the analysis sample rate failed
    #[error("Failed to prepare audio for analysis: {0}")]
    Resample(#[from] TempoError),

    #[error("FFT failed: {0}")]
    Fft(#[from] realfft::FftError),
}

/// Audio handed to a [`BeatEstimator`]
#[derive(Debug, Clone, Copy)]
pub enum BeatSource<'a> {
    /// An audio file on disk
    File(&'a Path),
    /// An in-memory track (materialized by the estimator as needed)
    Track(&'a AudioTrack),
}

impl<'a> From<&'a Path> for BeatSource<'a> {
    fn from(path: &'a Path) -> Self {
        BeatSource::File(path)
    }
}

impl<'a> From<&'a AudioTrack> for BeatSource<'a> {
    fn from(track: &'a AudioTrack) -> Self {
        BeatSource::Track(track)
    }
}

/// Trait for beat estimators
///
/// Implementors only provide [`beat_grid`](Self::beat_grid); tempo and beat
/// lookups derive from it.
pub trait BeatEstimator {
    /// Detect all beats of `source`
    fn beat_grid(&self, source: BeatSource<'_>) -> Result<BeatGrid, AnalysisError>;

    /// Median tempo in BPM, `0.0` when fewer than two beats were found
    fn estimate_tempo(&self, source: BeatSource<'_>) -> Result<f64, AnalysisError> {
        Ok(self.beat_grid(source)?.bpm())
    }

    /// Timestamp of the n-th beat in milliseconds (1-indexed, `0` means the
    /// first beat); `None` when the track ends first
    fn beat_timestamp(&self, source: BeatSource<'_>, n: usize) -> Result<Option<f64>, AnalysisError> {
        Ok(self.beat_grid(source)?.beat_timestamp(n))
    }
}

/// Spectral-difference beat estimator
#[derive(Debug, Clone, Default)]
pub struct SpectralBeatEstimator {
    bpm_config: BpmConfig,
}

impl SpectralBeatEstimator {
    /// Create an estimator searching the given tempo range
    pub fn new(bpm_config: BpmConfig) -> Self {
        Self { bpm_config }
    }

    pub fn bpm_config(&self) -> &BpmConfig {
        &self.bpm_config
    }

    fn analyze_file(&self, path: &Path) -> Result<BeatGrid, AnalysisError> {
        let track = audio_file::decode(path)?;
        let mono = AudioTrack::from_mono(track.to_mono(), track.sample_rate())
            .resampled(ANALYSIS_SAMPLE_RATE)?;

        let envelope = onset_envelope(mono.samples())?;
        let grid = track_beats(&envelope, &self.bpm_config);
        log::debug!(
            "beat_grid: {:?} -> {} beats, {:.2} BPM",
            path,
            grid.len(),
            grid.bpm()
        );
        Ok(grid)
    }
}

impl BeatEstimator for SpectralBeatEstimator {
    fn beat_grid(&self, source: BeatSource<'_>) -> Result<BeatGrid, AnalysisError> {
        match source {
            BeatSource::File(path) => self.analyze_file(path),
            BeatSource::Track(track) => {
                let render = audio_file::render_temp_wav(track, "automix_beats_")?;
                let result = self.analyze_file(render.path());
                audio_file::release_temp_file(render);
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::click_track;

    #[test]
    fn test_estimates_click_track_tempo() {
        let estimator = SpectralBeatEstimator::default();
        for bpm in [100.0, 120.0, 140.0] {
            let track = click_track(bpm, 50.0, 20.0, 44100);
            let detected = estimator.estimate_tempo(BeatSource::Track(&track)).unwrap();
            assert!(
                (detected - bpm).abs() < 3.0,
                "expected {} BPM, detected {}",
                bpm,
                detected
            );
        }
    }

    #[test]
    fn test_beat_timestamps_follow_clicks() {
        let estimator = SpectralBeatEstimator::default();
        let track = click_track(120.0, 250.0, 10.0, 44100);
        let grid = estimator.beat_grid(BeatSource::Track(&track)).unwrap();

        let first = grid.beat_timestamp(1).unwrap();
        assert!((first - 250.0).abs() < 15.0, "first beat at {}", first);
        let sixth = grid.beat_timestamp(6).unwrap();
        assert!((sixth - 2750.0).abs() < 15.0, "sixth beat at {}", sixth);

        // Past the end of a 10 s track at 120 BPM
        assert_eq!(grid.beat_timestamp(100), None);
    }

    #[test]
    fn test_other_sample_rates_are_conformed() {
        let estimator = SpectralBeatEstimator::default();
        let track = click_track(120.0, 0.0, 10.0, 22050).with_channels(2);
        let detected = estimator.estimate_tempo(BeatSource::Track(&track)).unwrap();
        assert!((detected - 120.0).abs() < 3.0, "detected {}", detected);
    }

    #[test]
    fn test_single_click_and_silence_have_no_tempo() {
        let estimator = SpectralBeatEstimator::default();

        let silence = AudioTrack::silent(5000.0, 44100, 1);
        assert_eq!(estimator.estimate_tempo(BeatSource::Track(&silence)).unwrap(), 0.0);

        let single = click_track(120.0, 100.0, 0.5, 44100)
            .concat(&AudioTrack::silent(4000.0, 44100, 1));
        assert_eq!(estimator.estimate_tempo(BeatSource::Track(&single)).unwrap(), 0.0);
    }

    #[test]
    fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clicks.wav");
        audio_file::write_wav(&click_track(110.0, 0.0, 15.0, 44100), &path).unwrap();

        let estimator = SpectralBeatEstimator::default();
        let detected = estimator.estimate_tempo(BeatSource::File(&path)).unwrap();
        assert!((detected - 110.0).abs() < 3.0, "detected {}", detected);
    }
}
