//! Built-in metronome backend
//!
//! One synthetic kick per beat: a sine sweeping down from 150 Hz to 50 Hz
//! under an exponential decay. Beat `k` starts exactly at `k * 60 / bpm`.

use std::path::Path;

use crate::audio_file::write_wav;
use crate::track::AudioTrack;
use crate::types::{Sample, ANALYSIS_SAMPLE_RATE};

use super::{DrumRequest, DrumSynth, SynthError};

/// In-process drum renderer
#[derive(Debug, Clone)]
pub struct MetronomeSynth {
    pub sample_rate: u32,
    pub kick_ms: f64,
    pub amplitude: Sample,
}

impl Default for MetronomeSynth {
    fn default() -> Self {
        Self {
            sample_rate: ANALYSIS_SAMPLE_RATE,
            kick_ms: 120.0,
            amplitude: 0.9,
        }
    }
}

impl MetronomeSynth {
    /// One kick, `kick_ms` long
    fn kick(&self) -> Vec<Sample> {
        let rate = self.sample_rate as f64;
        let frames = (self.kick_ms * rate / 1000.0) as usize;
        let decay = frames as f64 / 5.0;
        let mut phase = 0.0f64;
        (0..frames)
            .map(|i| {
                let progress = i as f64 / frames as f64;
                let freq = 150.0 - 100.0 * progress;
                phase += 2.0 * std::f64::consts::PI * freq / rate;
                (self.amplitude as f64 * (-(i as f64) / decay).exp() * phase.sin()) as Sample
            })
            .collect()
    }

    /// Render the drum track in memory
    pub fn synthesize(&self, request: &DrumRequest) -> Result<AudioTrack, SynthError> {
        request.validate()?;
        let rate = self.sample_rate as f64;
        let frames = (request.track_length_s * rate).round() as usize;
        let mut samples = vec![0.0; frames];
        let kick = self.kick();

        for beat in 0..request.number_of_beats() {
            let start = (beat as f64 * 60.0 / request.bpm * rate).round() as usize;
            if start >= frames {
                break;
            }
            let end = (start + kick.len()).min(frames);
            for (dst, &src) in samples[start..end].iter_mut().zip(&kick) {
                *dst += src;
            }
        }

        Ok(AudioTrack::from_mono(samples, self.sample_rate))
    }
}

impl DrumSynth for MetronomeSynth {
    fn render(&self, request: &DrumRequest, output: &Path) -> Result<(), SynthError> {
        let track = self.synthesize(request)?;
        log::info!(
            "MetronomeSynth: {} beats at {:.2} BPM, {:.1}s",
            request.number_of_beats(),
            request.bpm,
            track.duration_seconds()
        );
        write_wav(&track, output)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "builtin"
    }
}
