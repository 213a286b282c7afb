//! Top-level error type for the remix pipeline

use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::audio_file::AudioFileError;
use crate::recipe::RecipeError;
use crate::synth::SynthError;
use crate::tempo::TempoError;

/// Errors that abort a remix
#[derive(Error, Debug)]
pub enum MixError {
    #[error(transparent)]
    Audio(#[from] AudioFileError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Tempo(#[from] TempoError),

    #[error(transparent)]
    Synth(#[from] SynthError),

    #[error(transparent)]
    Recipe(#[from] RecipeError),

    /// The detector found fewer than two beats, so the tempo is zero and
    /// anything divided by it would be non-finite
    #[error("No beats found in {track}: tempo is undefined")]
    NoTempo { track: String },

    /// Scratch directory for drum renders could not be created
    #[error("Failed to create working directory: {0}")]
    WorkDir(#[source] std::io::Error),
}

impl MixError {
    pub(crate) fn no_tempo(track: impl Into<String>) -> Self {
        MixError::NoTempo { track: track.into() }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, MixError>;

/// Fail with [`MixError::NoTempo`] unless `bpm` is a usable divisor
pub(crate) fn require_tempo(bpm: f64, track: &str) -> Result<f64> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(bpm)
    } else {
        Err(MixError::no_tempo(track))
    }
}
