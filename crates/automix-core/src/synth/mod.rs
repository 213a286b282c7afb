//! Percussion track synthesis
//!
//! The drum track is rendered at the reference tempo for the full length of
//! the first song, so its beats lie on an exact metronomic grid starting at
//! zero. Two backends implement [`DrumSynth`]:
//!
//! - [`CsoundRenderer`]: fills a `.csd` template and runs the external
//!   `csound` command-line renderer
//! - [`MetronomeSynth`]: an in-process kick on every beat
//!
//! Use [`create_synth`] to get the backend selected in [`DrumConfig`].

mod csound;
mod metronome;

pub use csound::CsoundRenderer;
pub use metronome::MetronomeSynth;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::audio_file::AudioFileError;
use crate::config::{DrumBackend, DrumConfig};

/// Errors from drum synthesis
#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Failed to read drum template {path:?}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write Csound score: {0}")]
    Score(#[source] std::io::Error),

    /// The renderer process couldn't be started
    #[error("Failed to launch {binary}: {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Csound ran but reported failure
    #[error("Csound failed with exit code {code:?}: {stderr}")]
    CompileFailed { code: Option<i32>, stderr: String },

    /// The renderer finished without producing its output file
    #[error("Drum renderer produced no output at {0:?}")]
    MissingOutput(PathBuf),

    #[error("Drum tempo must be positive, got {0}")]
    InvalidTempo(f64),

    #[error(transparent)]
    Audio(#[from] AudioFileError),
}

/// What to render
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrumRequest {
    pub bpm: f64,
    /// Length of the song the drums accompany
    pub track_length_s: f64,
}

impl DrumRequest {
    pub fn new(bpm: f64, track_length_s: f64) -> Self {
        Self { bpm, track_length_s }
    }

    /// `floor(bpm * minutes)`
    pub fn number_of_beats(&self) -> usize {
        (self.bpm * self.track_length_s / 60.0).floor().max(0.0) as usize
    }

    /// Milliseconds between beats
    pub fn beat_interval_ms(&self) -> f64 {
        60000.0 / self.bpm
    }

    fn validate(&self) -> Result<(), SynthError> {
        if self.bpm.is_finite() && self.bpm > 0.0 {
            Ok(())
        } else {
            Err(SynthError::InvalidTempo(self.bpm))
        }
    }
}

/// Trait for drum track renderers
pub trait DrumSynth {
    /// Render the drum track for `request` to a WAV file at `output`
    fn render(&self, request: &DrumRequest, output: &Path) -> Result<(), SynthError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Create the renderer selected in the configuration
pub fn create_synth(config: &DrumConfig) -> Box<dyn DrumSynth> {
    match config.backend {
        DrumBackend::Builtin => Box::new(MetronomeSynth::default()),
        DrumBackend::Csound => Box::new(CsoundRenderer::new(
            config.template.clone(),
            config.csound_binary.clone(),
        )),
    }
}

/// Substitute `{output_file}`, `{bpm}` and `{number_of_beats}` in a template
pub fn fill_template(template: &str, output: &Path, request: &DrumRequest) -> String {
    template
        .replace("{output_file}", &output.to_string_lossy())
        .replace("{bpm}", &request.bpm.to_string())
        .replace("{number_of_beats}", &request.number_of_beats().to_string())
}
