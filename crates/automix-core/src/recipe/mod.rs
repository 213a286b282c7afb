//! Recipe interpreter
//!
//! A recipe is a small line-oriented script of edits applied to the two
//! songs before mixdown (see [`command`] for the syntax). Lines run in file
//! order. A line that fails to parse is reported as a syntax error and
//! skipped; the rest of the recipe still runs.

pub mod command;
pub mod effects;

pub use command::{parse_line, CommandKind, RecipeCommand, SyntaxError};

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::tempo::TempoError;
use crate::track::AudioTrack;
use crate::types::TrackSlot;

/// Errors that stop a recipe from running
#[derive(Error, Debug)]
pub enum RecipeError {
    #[error("Failed to read recipe {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Beat-locked effects need a usable reference tempo
    #[error("Recipe needs a positive reference tempo, got {0}")]
    InvalidTempo(f64),

    #[error("Speed effect failed: {0}")]
    Tempo(#[from] TempoError),
}

/// A syntax error together with its 1-based line number
#[derive(Debug, Clone, PartialEq)]
pub struct LineError {
    pub line: usize,
    pub error: SyntaxError,
}

/// A parsed recipe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recipe {
    commands: Vec<RecipeCommand>,
    errors: Vec<LineError>,
}

impl Recipe {
    /// Parse a script, logging each syntax error
    pub fn parse(script: &str) -> Self {
        let mut recipe = Recipe::default();
        for (index, line) in script.lines().enumerate() {
            match parse_line(line) {
                None => {}
                Some(Ok(command)) => recipe.commands.push(command),
                Some(Err(error)) => {
                    log::warn!("Syntax Error (line {}): {}", index + 1, error);
                    recipe.errors.push(LineError {
                        line: index + 1,
                        error,
                    });
                }
            }
        }
        recipe
    }

    /// Read and parse a recipe file
    pub fn from_file(path: &Path) -> Result<Self, RecipeError> {
        let script = std::fs::read_to_string(path).map_err(|source| RecipeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let recipe = Self::parse(&script);
        log::info!(
            "Recipe::from_file: {:?} -> {} commands, {} skipped",
            path,
            recipe.commands.len(),
            recipe.errors.len()
        );
        Ok(recipe)
    }

    /// Commands in file order
    pub fn commands(&self) -> &[RecipeCommand] {
        &self.commands
    }

    /// Lines that were skipped
    pub fn errors(&self) -> &[LineError] {
        &self.errors
    }

    /// Run every command against the two songs, returning both edited songs
    pub fn apply(
        self,
        first: AudioTrack,
        second: AudioTrack,
        bpm: f64,
    ) -> Result<(AudioTrack, AudioTrack), RecipeError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(RecipeError::InvalidTempo(bpm));
        }

        let mut tracks = [first, second];
        for command in self.commands {
            let slot = match command {
                RecipeCommand::Slice { .. } => TrackSlot::First,
                _ => command.target(),
            };
            let index = match slot {
                TrackSlot::First => 0,
                TrackSlot::Second => 1,
            };
            let track = &tracks[index];

            let edited = match command {
                RecipeCommand::Fade {
                    duration_s,
                    start_s,
                    gain_db,
                    ..
                } => effects::apply_fade(track, duration_s, start_s, gain_db),
                RecipeCommand::Repeat {
                    duration_s,
                    count,
                    start_s,
                    ..
                } => match effects::apply_repeat(track, duration_s, count, start_s, bpm) {
                    Some(looped) => looped,
                    None => {
                        log::warn!(
                            "repeat {} {} {} {}: loop longer than {}s, line skipped",
                            slot,
                            duration_s,
                            count,
                            start_s,
                            effects::MAX_LOOP_S
                        );
                        continue;
                    }
                },
                RecipeCommand::Speed {
                    duration_s,
                    start_s,
                    factor,
                    ..
                } => effects::apply_speed(track, duration_s, start_s, factor, bpm)?,
                RecipeCommand::Slice { target, end_s } => {
                    if target != TrackSlot::First {
                        log::warn!(
                            "slice {} {}: slice always cuts s1, ignoring target {}",
                            target,
                            end_s,
                            target
                        );
                    }
                    effects::apply_slice(track, end_s)
                }
            };
            log::debug!(
                "Recipe::apply: {} on {} -> {:.0}ms",
                command.kind(),
                slot,
                edited.duration_ms()
            );
            tracks[index] = edited;
        }

        let [first, second] = tracks;
        Ok((first, second))
    }
}

/// Apply `recipe` to both songs and overlay the second onto the first
pub fn apply_recipe(
    first: AudioTrack,
    second: AudioTrack,
    recipe: Recipe,
    bpm: f64,
) -> Result<AudioTrack, RecipeError> {
    let (first, second) = recipe.apply(first, second, bpm)?;
    Ok(first.overlay(&second)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(seconds: f64, level: f32) -> AudioTrack {
        AudioTrack::from_mono(vec![level; (seconds * 1000.0) as usize], 1000)
    }

    #[test]
    fn test_fade_in_ramps_ten_db() {
        let track = constant(10.0, 0.1);
        let recipe = Recipe::parse("fade s1 2 IN 5\n");
        let (first, _) = recipe.apply(track.clone(), constant(10.0, 0.0), 120.0).unwrap();

        let s = first.samples();
        assert_eq!(s[4999], 0.1);
        assert_eq!(s[5000], 0.1);
        // +10 dB is a factor of ~3.162 once the ramp has finished
        let gain_db = 20.0 * (s[7500] as f64 / 0.1).log10();
        assert!((gain_db - 10.0).abs() < 1e-3, "gain {} dB", gain_db);
        let mid_gain = s[6000] / 0.1;
        assert!(mid_gain > 1.0 && mid_gain < 3.17);
    }

    #[test]
    fn test_bogus_line_is_skipped() {
        let recipe = Recipe::parse("bogus s1 1 2\n");
        assert!(recipe.commands().is_empty());
        assert_eq!(
            recipe.errors(),
            &[LineError {
                line: 1,
                error: SyntaxError::UnknownCommand("bogus".to_string()),
            }]
        );

        let track = constant(3.0, 0.2);
        let (first, second) = recipe.apply(track.clone(), track.clone(), 120.0).unwrap();
        assert_eq!(first, track);
        assert_eq!(second, track);
    }

    #[test]
    fn test_bad_lines_do_not_stop_the_recipe() {
        let script = "\
# speed up the second song, then cut the mix
fade s3 2 IN 5
repeat s2 1 3 0

slice s2 4
";
        let recipe = Recipe::parse(script);
        assert_eq!(recipe.commands().len(), 2);
        assert_eq!(recipe.errors()[0].line, 2);

        let (first, second) = recipe
            .apply(constant(10.0, 0.1), constant(10.0, 0.1), 120.0)
            .unwrap();
        // Slice named s2 but cut s1
        assert_eq!(first.duration_ms(), 4000.0);
        // One second at 120 BPM looped three times
        assert_eq!(second.duration_ms(), 12000.0);
    }

    #[test]
    fn test_oversized_repeat_is_skipped() {
        let script = "repeat s1 1 18446744073709551615 0\nslice s1 2\n";
        let recipe = Recipe::parse(script);
        assert_eq!(recipe.commands().len(), 2);

        let (first, _) = recipe
            .apply(constant(10.0, 0.1), constant(10.0, 0.1), 120.0)
            .unwrap();
        // The repeat left the track alone and the slice still ran
        assert_eq!(first.duration_ms(), 2000.0);
    }

    #[test]
    fn test_slice_reads_last_of_three_arguments() {
        let recipe = Recipe::parse("slice s1 0 0 5");
        let (first, _) = recipe
            .apply(constant(10.0, 0.1), constant(10.0, 0.1), 120.0)
            .unwrap();
        assert_eq!(first.duration_ms(), 5000.0);
    }

    #[test]
    fn test_apply_recipe_overlays_onto_first() {
        let recipe = Recipe::parse("slice s1 2");
        let mixed = apply_recipe(constant(5.0, 0.25), constant(5.0, 0.5), recipe, 100.0).unwrap();
        assert_eq!(mixed.duration_ms(), 2000.0);
        assert!(mixed.samples().iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_recipe_requires_tempo() {
        let track = constant(1.0, 0.1);
        let result = Recipe::parse("").apply(track.clone(), track, 0.0);
        assert!(matches!(result, Err(RecipeError::InvalidTempo(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simple_recipe.dj");
        std::fs::write(&path, "speed s2 4 FAST 8\nfade s1 2 OUT 1 6\n").unwrap();

        let recipe = Recipe::from_file(&path).unwrap();
        assert_eq!(recipe.commands().len(), 2);
        assert_eq!(recipe.commands()[0].kind(), CommandKind::Speed);

        assert!(matches!(
            Recipe::from_file(&dir.path().join("missing.dj")),
            Err(RecipeError::Read { .. })
        ));
    }
}
