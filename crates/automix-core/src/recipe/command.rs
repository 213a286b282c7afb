//! Recipe line parsing
//!
//! One command per line, whitespace separated:
//!
//! ```text
//! # comment
//! fade   s1 <duration_s> <IN|OUT> <start_s> [dB]
//! repeat s2 <duration_s> <count> <start_s>
//! speed  s1 <duration_s> <FAST|SLOW> <start_s> [factor]
//! slice  s1 <end_s>
//! slice  s1 _ _ <end_s>
//! ```
//!
//! Command names and direction flags are case-insensitive, targets are not.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::types::TrackSlot;

/// Fade gain when a line gives none
pub const DEFAULT_FADE_DB: f64 = 10.0;

/// Speed factor for `FAST` (and its reciprocal for anything else)
pub const DEFAULT_SPEED_FACTOR: f64 = 1.5;

/// Why a recipe line was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyntaxError {
    #[error("{0} is not a valid command")]
    UnknownCommand(String),

    #[error("{0} is not a valid object")]
    InvalidTarget(String),

    #[error("{command} needs a target (s1 or s2)")]
    MissingTarget { command: CommandKind },

    #[error("{command} is missing its {argument} argument")]
    MissingArgument {
        command: CommandKind,
        argument: &'static str,
    },

    #[error("{value} is not a valid {argument} for {command}")]
    InvalidArgument {
        command: CommandKind,
        argument: &'static str,
        value: String,
    },
}

/// The four recipe commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Fade,
    Repeat,
    Speed,
    Slice,
}

impl FromStr for CommandKind {
    type Err = SyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fade" => Ok(CommandKind::Fade),
            "repeat" => Ok(CommandKind::Repeat),
            "speed" => Ok(CommandKind::Speed),
            "slice" => Ok(CommandKind::Slice),
            _ => Err(SyntaxError::UnknownCommand(s.to_string())),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandKind::Fade => "fade",
            CommandKind::Repeat => "repeat",
            CommandKind::Speed => "speed",
            CommandKind::Slice => "slice",
        })
    }
}

/// A parsed recipe line
#[derive(Debug, Clone, PartialEq)]
pub enum RecipeCommand {
    /// Ramp to `gain_db` over `duration_s` starting at `start_s`
    Fade {
        target: TrackSlot,
        duration_s: f64,
        start_s: f64,
        gain_db: f64,
    },
    /// Loop the beat-snapped slice at `start_s` `count` times
    Repeat {
        target: TrackSlot,
        duration_s: f64,
        count: usize,
        start_s: f64,
    },
    /// Resample the beat-snapped slice at `start_s` by `factor`
    Speed {
        target: TrackSlot,
        duration_s: f64,
        start_s: f64,
        factor: f64,
    },
    /// Cut the first song after `end_s`
    ///
    /// Always applies to the first song; `target` is kept only to report a
    /// mismatch.
    Slice { target: TrackSlot, end_s: f64 },
}

impl RecipeCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            RecipeCommand::Fade { .. } => CommandKind::Fade,
            RecipeCommand::Repeat { .. } => CommandKind::Repeat,
            RecipeCommand::Speed { .. } => CommandKind::Speed,
            RecipeCommand::Slice { .. } => CommandKind::Slice,
        }
    }

    /// Slot the line names
    pub fn target(&self) -> TrackSlot {
        match *self {
            RecipeCommand::Fade { target, .. }
            | RecipeCommand::Repeat { target, .. }
            | RecipeCommand::Speed { target, .. }
            | RecipeCommand::Slice { target, .. } => target,
        }
    }
}

/// Parse one line; `None` for blank lines and comments
pub fn parse_line(line: &str) -> Option<Result<RecipeCommand, SyntaxError>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(parse_tokens(&line.split_whitespace().collect::<Vec<_>>()))
}

fn parse_tokens(tokens: &[&str]) -> Result<RecipeCommand, SyntaxError> {
    let command: CommandKind = tokens[0].parse()?;
    let target = match tokens.get(1) {
        None => return Err(SyntaxError::MissingTarget { command }),
        Some(token) => token
            .parse::<TrackSlot>()
            .map_err(|()| SyntaxError::InvalidTarget(token.to_string()))?,
    };
    let args = Args {
        command,
        tokens: &tokens[2..],
    };

    Ok(match command {
        CommandKind::Fade => {
            let sign = if args.flag(1, "direction", "IN")? { 1.0 } else { -1.0 };
            RecipeCommand::Fade {
                target,
                duration_s: args.seconds(0, "duration")?,
                start_s: args.seconds(2, "start")?,
                gain_db: sign * args.optional_number(3, "gain")?.unwrap_or(DEFAULT_FADE_DB),
            }
        }
        CommandKind::Repeat => RecipeCommand::Repeat {
            target,
            duration_s: args.seconds(0, "duration")?,
            count: args.count(1, "count")?,
            start_s: args.seconds(2, "start")?,
        },
        CommandKind::Speed => {
            let fast = args.flag(1, "direction", "FAST")?;
            let factor = match args.optional_number(3, "factor")? {
                Some(factor) if factor > 0.0 => factor,
                Some(_) => return Err(args.invalid(3, "factor")),
                None if fast => DEFAULT_SPEED_FACTOR,
                None => 1.0 / DEFAULT_SPEED_FACTOR,
            };
            RecipeCommand::Speed {
                target,
                duration_s: args.seconds(0, "duration")?,
                start_s: args.seconds(2, "start")?,
                factor,
            }
        }
        CommandKind::Slice => {
            // `slice s1 <end_s>` or `slice s1 _ _ <end_s>`
            let end_index = if args.tokens.len() >= 3 { 2 } else { 0 };
            RecipeCommand::Slice {
                target,
                end_s: args.seconds(end_index, "end")?,
            }
        }
    })
}

/// Positional arguments after the target
struct Args<'a> {
    command: CommandKind,
    tokens: &'a [&'a str],
}

impl Args<'_> {
    fn get(&self, index: usize, argument: &'static str) -> Result<&str, SyntaxError> {
        self.tokens
            .get(index)
            .copied()
            .ok_or(SyntaxError::MissingArgument {
                command: self.command,
                argument,
            })
    }

    fn invalid(&self, index: usize, argument: &'static str) -> SyntaxError {
        SyntaxError::InvalidArgument {
            command: self.command,
            argument,
            value: self.tokens.get(index).copied().unwrap_or_default().to_string(),
        }
    }

    /// Non-negative, finite number of seconds
    fn seconds(&self, index: usize, argument: &'static str) -> Result<f64, SyntaxError> {
        match self.get(index, argument)?.parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
            _ => Err(self.invalid(index, argument)),
        }
    }

    fn count(&self, index: usize, argument: &'static str) -> Result<usize, SyntaxError> {
        self.get(index, argument)?
            .parse::<usize>()
            .map_err(|_| self.invalid(index, argument))
    }

    /// Whether the direction flag equals `expected` (anything else is the opposite)
    fn flag(&self, index: usize, argument: &'static str, expected: &str) -> Result<bool, SyntaxError> {
        Ok(self.get(index, argument)?.eq_ignore_ascii_case(expected))
    }

    fn optional_number(&self, index: usize, argument: &'static str) -> Result<Option<f64>, SyntaxError> {
        match self.tokens.get(index) {
            None => Ok(None),
            Some(token) => match token.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(Some(value)),
                _ => Err(self.invalid(index, argument)),
            },
        }
    }
}
