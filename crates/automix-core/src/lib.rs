//! Automix Core - beat-synchronous remixing of two songs and a drum track
//!
//! The pipeline runs strictly in order:
//!
//! ```text
//! decode -> beat analysis -> tempo normalization -> alignment -> recipe -> mixdown
//! ```
//!
//! Every stage takes [`AudioTrack`] values and returns new ones, so later
//! stages can still reason about the track as it was before a step.

pub mod align;
pub mod analysis;
pub mod audio_file;
pub mod config;
pub mod error;
pub mod library;
pub mod mixdown;
pub mod pipeline;
pub mod recipe;
pub mod synth;
pub mod tempo;
pub mod track;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{MixError, Result};
pub use track::AudioTrack;
pub use types::*;
