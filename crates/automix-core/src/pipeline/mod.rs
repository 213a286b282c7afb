//! End-to-end remix pipeline
//!
//! ```text
//! decode + normalize ─┬─ first song ── truncate ──────────────┐
//!                     ├─ second song ─ tempo normalize ─ align ┼─ recipe ─ mixdown
//!                     └─ drums (synthesized at first tempo) ─┘
//! ```
//!
//! [`Remixer::prepare`] runs everything up to and including alignment and
//! returns the three aligned parts; [`PreparedMix::mixdown`] applies the
//! optional recipe and overlays them. [`Remixer::mix_songs`] does both.

use std::path::Path;

use crate::align::{align, number_of_beats, AlignmentState, AlignmentStep};
use crate::analysis::{BeatEstimator, BeatGrid, BeatSource, SpectralBeatEstimator};
use crate::audio_file;
use crate::config::MixConfig;
use crate::error::{require_tempo, MixError, Result};
use crate::mixdown;
use crate::recipe::{apply_recipe, Recipe};
use crate::synth::{create_synth, DrumRequest, DrumSynth};
use crate::tempo::{normalize_tempo, ratio_from_bpm};
use crate::track::AudioTrack;

/// The three aligned parts of a remix, ready for the recipe and mixdown
#[derive(Debug, Clone)]
pub struct PreparedMix {
    /// Reference song, truncated to the song length
    pub first: AudioTrack,
    /// Second song at the reference tempo, aligned to the reference beats
    pub second: AudioTrack,
    /// Drum track aligned to the reference beats
    pub drums: AudioTrack,
    pub reference_bpm: f64,
    pub second_bpm: f64,
    /// Corrections accumulated during alignment
    pub offsets: AlignmentState,
    pub steps: Vec<AlignmentStep>,
}

impl PreparedMix {
    /// Apply `recipe` (if any) to the songs and overlay everything
    pub fn mixdown(self, recipe: Option<Recipe>) -> Result<AudioTrack> {
        let mixed = match recipe {
            Some(recipe) => apply_recipe(self.first, self.second, recipe, self.reference_bpm)?
                .overlay(&self.drums)?,
            None => mixdown::mix(&self.first, &self.second, &self.drums)?,
        };
        log::info!("mixdown: {:.1}s remix", mixed.duration_seconds());
        Ok(mixed)
    }
}

/// Runs the remix pipeline with a beat estimator and a drum renderer
pub struct Remixer<E: BeatEstimator = SpectralBeatEstimator> {
    estimator: E,
    synth: Box<dyn DrumSynth>,
    target_dbfs: f64,
}

impl Remixer<SpectralBeatEstimator> {
    /// Spectral beat tracking and the configured drum backend
    pub fn from_config(config: &MixConfig) -> Self {
        Self::with_estimator(
            SpectralBeatEstimator::new(config.analysis.bpm.clone()),
            create_synth(&config.drums),
            config.target_dbfs,
        )
    }
}

impl<E: BeatEstimator> Remixer<E> {
    pub fn with_estimator(estimator: E, synth: Box<dyn DrumSynth>, target_dbfs: f64) -> Self {
        Self {
            estimator,
            synth,
            target_dbfs,
        }
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Render and decode a drum track at `bpm` lasting `track_length_s`
    ///
    /// The render lives in a scratch directory removed before returning.
    pub fn prepare_drums(&self, bpm: f64, track_length_s: f64) -> Result<AudioTrack> {
        let request = DrumRequest::new(bpm, track_length_s);
        let workdir = tempfile::Builder::new()
            .prefix("automix_")
            .tempdir()
            .map_err(MixError::WorkDir)?;
        let output = workdir.path().join("drums.wav");

        log::info!(
            "prepare_drums: {} beats at {:.2} BPM via {}",
            request.number_of_beats(),
            bpm,
            self.synth.name()
        );
        self.synth.render(&request, &output)?;
        let drums = audio_file::decode(&output)?;

        if let Err(e) = workdir.close() {
            log::warn!("prepare_drums: failed to remove scratch directory: {}", e);
        }
        Ok(drums)
    }

    /// Decode, normalize, synthesize drums, match tempo and align
    ///
    /// `song_length_s` truncates the first song (`None` keeps all of it).
    /// Fails if either song has no detectable tempo, or if drum synthesis
    /// fails, before any alignment work is done.
    pub fn prepare(
        &self,
        first_path: &Path,
        second_path: &Path,
        song_length_s: Option<f64>,
    ) -> Result<PreparedMix> {
        log::info!("prepare: {:?} + {:?}", first_path, second_path);

        let reference_grid = self.estimator.beat_grid(BeatSource::File(first_path))?;
        let reference_bpm = require_tempo(reference_grid.bpm(), &first_path.display().to_string())?;
        let second_bpm = require_tempo(
            self.estimator.estimate_tempo(BeatSource::File(second_path))?,
            &second_path.display().to_string(),
        )?;

        let first = audio_file::decode(first_path)?;
        let drums = self.prepare_drums(reference_bpm, first.duration_seconds())?;

        let first = first.normalized(self.target_dbfs);
        let second = audio_file::decode(second_path)?.normalized(self.target_dbfs);
        let drums = drums.normalized(self.target_dbfs);

        let first = match song_length_s {
            Some(seconds) => first.head_ms(seconds * 1000.0),
            None => first,
        };

        let speed = ratio_from_bpm(second_bpm, reference_bpm)
            .ok_or_else(|| MixError::no_tempo(second_path.display().to_string()))?;
        log::info!(
            "prepare: reference {:.2} BPM, second {:.2} BPM, speed factor {:.4}",
            reference_bpm,
            second_bpm,
            speed
        );
        let second = normalize_tempo(&second, speed)?;

        let alignment = align(&self.estimator, &first, &reference_grid, second, drums)?;

        Ok(PreparedMix {
            first,
            second: alignment.second,
            drums: alignment.drums,
            reference_bpm,
            second_bpm,
            offsets: alignment.state,
            steps: alignment.steps,
        })
    }

    /// Full pipeline: prepare, then recipe and mixdown
    pub fn mix_songs(
        &self,
        first_path: &Path,
        second_path: &Path,
        song_length_s: Option<f64>,
        recipe: Option<Recipe>,
    ) -> Result<AudioTrack> {
        self.prepare(first_path, second_path, song_length_s)?
            .mixdown(recipe)
    }

    /// Beat times of the finished remix for the presenter
    ///
    /// Beats `1..number_of_beats` of the remix's own grid; empty when the
    /// remix has no detectable tempo.
    pub fn beats_for_presentation(&self, remix: &AudioTrack) -> Result<Vec<f64>> {
        let grid: BeatGrid = self.estimator.beat_grid(BeatSource::Track(remix))?;
        if !grid.has_tempo() {
            return Ok(Vec::new());
        }
        let count = number_of_beats(grid.bpm(), remix);
        Ok((1..count).filter_map(|n| grid.beat_timestamp(n)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::MetronomeSynth;
    use crate::test_support::{click_track, FixedGridEstimator};

    /// First `seconds` of `track`, RMS level
    fn rms_within(track: &AudioTrack, seconds: f64) -> f64 {
        track.head_ms(seconds * 1000.0).rms()
    }

    #[test]
    fn test_two_click_tracks_and_drums_mix_to_song_length() {
        let dir = tempfile::tempdir().unwrap();
        let first_path = dir.path().join("first.wav");
        let second_path = dir.path().join("second.wav");
        audio_file::write_wav(&click_track(120.0, 0.0, 60.0, 44100), &first_path).unwrap();
        audio_file::write_wav(&click_track(100.0, 0.0, 60.0, 44100), &second_path).unwrap();

        let remixer = Remixer::with_estimator(
            SpectralBeatEstimator::default(),
            Box::new(MetronomeSynth::default()),
            -20.0,
        );
        let prepared = remixer.prepare(&first_path, &second_path, Some(30.0)).unwrap();

        assert!((prepared.reference_bpm - 120.0).abs() < 3.0);
        assert!((prepared.second_bpm - 100.0).abs() < 3.0);
        // Second song sped up to the reference tempo: 60s / 1.2
        assert!((prepared.second.duration_seconds() - 50.0).abs() < 3.0);
        assert_eq!(prepared.steps.len(), 12);

        // Every part carries energy inside the output window
        for part in [&prepared.first, &prepared.second, &prepared.drums] {
            assert!(rms_within(part, 30.0) > 0.01);
        }

        let first_rms = prepared.first.rms();
        let remix = prepared.mixdown(None).unwrap();
        assert_eq!(remix.frames(), 30 * 44100);
        assert_eq!(remix.duration_ms(), 30000.0);
        assert!(remix.rms() > first_rms);

        let beats = remixer.beats_for_presentation(&remix).unwrap();
        assert!(!beats.is_empty());
        assert!(beats.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_recipe_runs_before_drums_are_added() {
        let dir = tempfile::tempdir().unwrap();
        let first_path = dir.path().join("first.wav");
        let second_path = dir.path().join("second.wav");
        audio_file::write_wav(&click_track(120.0, 0.0, 20.0, 44100), &first_path).unwrap();
        audio_file::write_wav(&click_track(120.0, 250.0, 20.0, 44100), &second_path).unwrap();

        let remixer = Remixer::with_estimator(
            SpectralBeatEstimator::default(),
            Box::new(MetronomeSynth::default()),
            -20.0,
        );
        let recipe = Recipe::parse("slice s1 8\nfade s2 2 OUT 0 40\n");
        let remix = remixer
            .mix_songs(&first_path, &second_path, None, Some(recipe))
            .unwrap();
        assert_eq!(remix.duration_ms(), 8000.0);
    }

    #[test]
    fn test_zero_tempo_aborts_before_drums() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        audio_file::write_wav(&AudioTrack::silent(2000.0, 44100, 1), &path).unwrap();

        // A renderer that must never be reached
        struct Unreachable;
        impl DrumSynth for Unreachable {
            fn render(&self, _: &DrumRequest, _: &Path) -> std::result::Result<(), crate::synth::SynthError> {
                panic!("drums rendered for a song without tempo");
            }
            fn name(&self) -> &'static str {
                "unreachable"
            }
        }

        let remixer = Remixer::with_estimator(FixedGridEstimator::new(vec![]), Box::new(Unreachable), -20.0);
        let result = remixer.prepare(&path, &path, Some(30.0));
        assert!(matches!(result, Err(MixError::NoTempo { .. })));
    }

    #[test]
    fn test_presentation_beats_skip_first_and_stop_at_count() {
        let beats: Vec<f64> = (0..10).map(|k| k as f64 * 500.0).collect();
        let remixer = Remixer::with_estimator(
            FixedGridEstimator::new(beats),
            Box::new(MetronomeSynth::default()),
            -20.0,
        );
        // 4 seconds at 120 BPM: 8 beats, presented as beats 1..8
        let remix = AudioTrack::silent(4000.0, 1000, 1);
        let presented = remixer.beats_for_presentation(&remix).unwrap();
        assert_eq!(presented.len(), 7);
        assert_eq!(presented[0], 0.0);
        assert_eq!(presented[6], 3000.0);
    }

    #[test]
    fn test_prepare_drums_decodes_render() {
        let remixer = Remixer::with_estimator(
            SpectralBeatEstimator::default(),
            Box::new(MetronomeSynth::default()),
            -20.0,
        );
        let drums = remixer.prepare_drums(120.0, 5.0).unwrap();
        assert_eq!(drums.sample_rate(), 44100);
        assert_eq!(drums.frames(), 5 * 44100);
    }
}
