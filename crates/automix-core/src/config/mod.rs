//! Configuration for automix
//!
//! Stored as YAML. Default location: `~/Music/automix/config.yaml`.
//! Every section is `#[serde(default)]`, so a partial file only overrides
//! what it names.
//!
//! ```yaml
//! music_dir: /home/me/Music/automix/music
//! song_length_s: 30
//! analysis:
//!   bpm:
//!     min_tempo: 70
//!     max_tempo: 180
//! drums:
//!   backend: csound
//!   template: /home/me/Music/automix/drum_file.csd
//! ```

mod io;
mod paths;

pub use io::{load_config, read_config, save_config};
pub use paths::{default_automix_dir, default_config_path, default_music_dir, default_recipe_dir};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    /// Directory songs are listed from and resolved against
    pub music_dir: PathBuf,
    /// Directory recipe scripts are listed from and resolved against
    pub recipe_dir: PathBuf,
    /// File extension of songs in `music_dir` (matched case-insensitively)
    pub track_extension: String,
    /// Seconds of the first song to keep; 0 keeps all of it
    pub song_length_s: u32,
    /// Loudness every input track is normalized to before mixing
    pub target_dbfs: f64,
    pub analysis: AnalysisConfig,
    pub drums: DrumConfig,
    /// Where `automix mix` writes the remix unless told otherwise
    pub output: PathBuf,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            music_dir: default_music_dir(),
            recipe_dir: default_recipe_dir(),
            track_extension: String::from("mp3"),
            song_length_s: 60,
            target_dbfs: -20.0,
            analysis: AnalysisConfig::default(),
            drums: DrumConfig::default(),
            output: PathBuf::from("out.wav"),
        }
    }
}

impl MixConfig {
    /// Load from `path` (defaults when missing) and clamp out-of-range values
    pub fn load(path: &Path) -> Self {
        let mut config: MixConfig = load_config(path);
        config.analysis.bpm.validate();
        log::info!(
            "MixConfig::load: BPM range {}-{}, song length {}s, drums via {:?}",
            config.analysis.bpm.min_tempo,
            config.analysis.bpm.max_tempo,
            config.song_length_s,
            config.drums.backend
        );
        config
    }

    /// Song length in seconds, `None` when the whole song is kept
    pub fn song_length(&self) -> Option<f64> {
        (self.song_length_s > 0).then_some(self.song_length_s as f64)
    }
}

/// Analysis configuration section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Tempo search range of the beat tracker
    pub bpm: BpmConfig,
}

/// Beat tracker tempo range
///
/// - min_tempo: slowest tempo considered (40-180)
/// - max_tempo: fastest tempo considered (60-250)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BpmConfig {
    pub min_tempo: i32,
    pub max_tempo: i32,
}

impl Default for BpmConfig {
    fn default() -> Self {
        Self {
            min_tempo: 40,
            max_tempo: 208,
        }
    }
}

impl BpmConfig {
    /// Clamp to the supported range, keeping at least 20 BPM between the bounds
    pub fn validate(&mut self) {
        self.min_tempo = self.min_tempo.clamp(40, 180);
        self.max_tempo = self.max_tempo.clamp(60, 250);
        if self.min_tempo >= self.max_tempo {
            self.max_tempo = (self.min_tempo + 20).min(250);
        }
    }

    /// Validated range for a known genre (e.g. DnB: 160-190)
    pub fn for_range(min: i32, max: i32) -> Self {
        let mut config = Self {
            min_tempo: min,
            max_tempo: max,
        };
        config.validate();
        config
    }
}

/// How the percussion track is synthesized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrumBackend {
    /// In-process metronome kick
    #[default]
    Builtin,
    /// External Csound render of a `.csd` template
    Csound,
}

/// Percussion synthesis section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrumConfig {
    pub backend: DrumBackend,
    /// Csound template with `{output_file}`, `{bpm}` and `{number_of_beats}`
    pub template: PathBuf,
    /// Csound executable, looked up on `PATH` when not absolute
    pub csound_binary: String,
}

impl Default for DrumConfig {
    fn default() -> Self {
        Self {
            backend: DrumBackend::Builtin,
            template: default_automix_dir().join("drum_file.csd"),
            csound_binary: String::from("csound"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MixConfig::default();
        assert_eq!(config.track_extension, "mp3");
        assert_eq!(config.song_length_s, 60);
        assert_eq!(config.target_dbfs, -20.0);
        assert_eq!(config.analysis.bpm, BpmConfig::default());
        assert_eq!(config.drums.backend, DrumBackend::Builtin);
        assert_eq!(config.song_length(), Some(60.0));
    }

    #[test]
    fn test_zero_length_keeps_whole_song() {
        let config = MixConfig {
            song_length_s: 0,
            ..MixConfig::default()
        };
        assert_eq!(config.song_length(), None);
    }

    #[test]
    fn test_bpm_validation() {
        let bpm = BpmConfig::for_range(10, 400);
        assert_eq!(bpm.min_tempo, 40);
        assert_eq!(bpm.max_tempo, 250);

        let bpm = BpmConfig::for_range(170, 100);
        assert_eq!(bpm.min_tempo, 170);
        assert_eq!(bpm.max_tempo, 190);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "song_length_s: 30\ndrums:\n  backend: csound\nanalysis:\n  bpm:\n    min_tempo: 20\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, yaml).unwrap();

        let config = MixConfig::load(&path);
        assert_eq!(config.song_length_s, 30);
        assert_eq!(config.drums.backend, DrumBackend::Csound);
        assert_eq!(config.drums.csound_binary, "csound");
        assert_eq!(config.track_extension, "mp3");
        // Clamped on load
        assert_eq!(config.analysis.bpm.min_tempo, 40);
        assert_eq!(config.analysis.bpm.max_tempo, 208);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("automix").join("config.yaml");
        let config = MixConfig {
            target_dbfs: -14.0,
            track_extension: String::from("flac"),
            ..MixConfig::default()
        };

        save_config(&config, &path).unwrap();
        let loaded = MixConfig::load(&path);
        assert_eq!(loaded.target_dbfs, -14.0);
        assert_eq!(loaded.track_extension, "flac");
    }
}
