//! Command-line parsing and subcommand dispatch

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use automix_core::audio_file;
use automix_core::config::{default_config_path, MixConfig};
use automix_core::library;
use automix_core::pipeline::Remixer;
use automix_core::recipe::Recipe;

use crate::presenter;

#[derive(Parser, Debug)]
#[command(name = "automix")]
#[command(about = "Beat-synchronous remix of two songs and a drum track", long_about = None)]
pub struct Cli {
    /// Configuration file (default: ~/Music/automix/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mix two songs and a drum track, export and play the remix
    Mix(MixArgs),

    /// List songs in the music directory
    Tracks,

    /// List recipes in the recipe directory
    Recipes,
}

#[derive(Args, Debug)]
pub struct MixArgs {
    /// Reference song: a path, a file in the music directory or its number in `tracks`
    pub first: String,

    /// Song aligned to the reference, given the same way
    pub second: String,

    /// Recipe: a path, a file in the recipe directory or its number in `recipes`
    #[arg(short, long)]
    pub recipe: Option<String>,

    /// Seconds of the first song to keep, 0 keeps all of it (default: from config)
    #[arg(short, long)]
    pub length: Option<u32>,

    /// WAV file to export the remix to (default: from config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Export only, skip playback
    #[arg(long)]
    pub no_play: bool,
}

pub fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = MixConfig::load(&config_path);

    match cli.command {
        Command::Mix(args) => run_mix(&config, args),
        Command::Tracks => run_tracks(&config),
        Command::Recipes => run_recipes(&config),
    }
}

fn run_mix(config: &MixConfig, args: MixArgs) -> Result<()> {
    let list_songs = || library::list_tracks(&config.music_dir, &config.track_extension);
    let first = resolve_entry(&config.music_dir, &args.first, list_songs)
        .context("Failed to find the first song")?;
    let second = resolve_entry(&config.music_dir, &args.second, list_songs)
        .context("Failed to find the second song")?;
    ensure_distinct(&first, &second)?;

    let recipe = match &args.recipe {
        Some(name) => {
            let path = resolve_entry(&config.recipe_dir, name, || library::list_recipes(&config.recipe_dir))
                .context("Failed to find the recipe")?;
            Some(Recipe::from_file(&path)?)
        }
        None => None,
    };

    let song_length = match args.length {
        Some(seconds) => (seconds > 0).then_some(seconds as f64),
        None => config.song_length(),
    };

    let remixer = Remixer::from_config(config);
    let remix = remixer
        .mix_songs(&first, &second, song_length, recipe)
        .context("Remix failed")?;

    let output = args.output.unwrap_or_else(|| config.output.clone());
    audio_file::write_wav(&remix, &output)
        .with_context(|| format!("Failed to export remix to {:?}", output))?;
    println!("Remix written to {} ({:.1}s)", output.display(), remix.duration_seconds());

    if args.no_play {
        return Ok(());
    }

    let beats = remixer
        .beats_for_presentation(&remix)
        .context("Failed to analyze the remix")?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the playback runtime")?;
    runtime.block_on(presenter::run(remix, beats))
}

fn run_tracks(config: &MixConfig) -> Result<()> {
    let names = library::list_tracks(&config.music_dir, &config.track_extension)?;
    if names.is_empty() {
        println!("No .{} files in {}", config.track_extension, config.music_dir.display());
    }
    for (index, name) in names.iter().enumerate() {
        let tags = library::read_tags(&config.music_dir.join(name));
        println!("{:>3}. {}", index + 1, library::display_name(name, &tags));
    }
    Ok(())
}

fn run_recipes(config: &MixConfig) -> Result<()> {
    let names = library::list_recipes(&config.recipe_dir)?;
    if names.is_empty() {
        println!("No recipes in {}", config.recipe_dir.display());
    }
    for (index, name) in names.iter().enumerate() {
        println!("{:>3}. {}", index + 1, name);
    }
    Ok(())
}

/// Resolve a path, a file name in `dir`, or a 1-based number into `listing`
///
/// Existing paths win over numbers, so a file literally named `3` is still
/// found.
fn resolve_entry<F>(dir: &Path, name: &str, listing: F) -> Result<PathBuf>
where
    F: FnOnce() -> std::result::Result<Vec<String>, library::LibraryError>,
{
    if let Ok(number) = name.parse::<usize>() {
        if !Path::new(name).exists() && !dir.join(name).exists() {
            let entries = listing()?;
            let entry = number
                .checked_sub(1)
                .and_then(|index| entries.get(index))
                .with_context(|| format!("No entry {} in {} ({} listed)", number, dir.display(), entries.len()))?;
            return Ok(dir.join(entry));
        }
    }
    Ok(library::resolve(dir, name)?)
}

/// The two songs of a mix must be different files
fn ensure_distinct(first: &Path, second: &Path) -> Result<()> {
    let canonical = |path: &Path| path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if canonical(first) == canonical(second) {
        anyhow::bail!("{} was chosen as both songs; pick two different songs", first.display());
    }
    Ok(())
}
