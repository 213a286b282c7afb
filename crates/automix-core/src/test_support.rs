//! Synthetic fixtures shared by the unit tests

use std::cell::Cell;

use crate::analysis::{AnalysisError, BeatEstimator, BeatGrid, BeatSource};
use crate::track::AudioTrack;
use crate::types::Sample;

/// Length of one click burst
const CLICK_MS: f64 = 10.0;

/// Mono click track: a 10 ms decaying 1 kHz burst on every beat
///
/// Beats fall at `offset_ms + k * 60000 / bpm` for every position inside
/// `duration_s`.
pub fn click_track(bpm: f64, offset_ms: f64, duration_s: f64, sample_rate: u32) -> AudioTrack {
    let frames = (duration_s * sample_rate as f64).round() as usize;
    let mut samples: Vec<Sample> = vec![0.0; frames];
    let burst = (CLICK_MS * sample_rate as f64 / 1000.0) as usize;
    let beat_ms = 60000.0 / bpm;

    let mut position_ms = offset_ms;
    while position_ms < duration_s * 1000.0 {
        let start = (position_ms * sample_rate as f64 / 1000.0).round() as usize;
        for i in 0..burst {
            let Some(sample) = samples.get_mut(start + i) else {
                break;
            };
            let t = i as f64 / sample_rate as f64;
            let envelope = (-(i as f64) / (burst as f64 / 4.0)).exp();
            *sample = (0.8 * envelope * (2.0 * std::f64::consts::PI * 1000.0 * t).sin()) as Sample;
        }
        position_ms += beat_ms;
    }
    AudioTrack::from_mono(samples, sample_rate)
}

/// Estimator that reports a fixed grid for every source and counts calls
pub struct FixedGridEstimator {
    grid: BeatGrid,
    calls: Cell<usize>,
}

impl FixedGridEstimator {
    pub fn new(beats_ms: Vec<f64>) -> Self {
        Self {
            grid: BeatGrid::from_beats(beats_ms),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl BeatEstimator for FixedGridEstimator {
    fn beat_grid(&self, _source: BeatSource<'_>) -> Result<BeatGrid, AnalysisError> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.grid.clone())
    }
}
