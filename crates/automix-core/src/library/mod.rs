//! Track and recipe discovery
//!
//! Lists songs and recipes from their configured directories and reads
//! artist/title tags for display. Tag reading is best-effort: unreadable
//! files simply have no tags.

use std::path::{Path, PathBuf};

use lofty::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Failed to list {path:?}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{name:?} not found in {dir:?}")]
    NotFound { name: String, dir: PathBuf },
}

/// Artist and title, when the file carries them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub artist: Option<String>,
    pub title: Option<String>,
}

/// Sorted file names in `dir` ending in `.{extension}` (case-insensitive)
pub fn list_tracks(dir: &Path, extension: &str) -> Result<Vec<String>, LibraryError> {
    let wanted = extension.trim_start_matches('.').to_ascii_lowercase();
    list_files(dir, |path| {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.to_ascii_lowercase() == wanted)
    })
}

/// Sorted file names of every recipe in `dir`
pub fn list_recipes(dir: &Path) -> Result<Vec<String>, LibraryError> {
    list_files(dir, |_| true)
}

fn list_files<F>(dir: &Path, keep: F) -> Result<Vec<String>, LibraryError>
where
    F: Fn(&Path) -> bool,
{
    let read_dir_error = |source| LibraryError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_dir_error)? {
        let path = entry.map_err(read_dir_error)?.path();
        if !path.is_file() || !keep(&path) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort_by_key(|name| name.to_lowercase());
    Ok(names)
}

/// Read artist and title tags from an audio file
pub fn read_tags(path: &Path) -> TrackTags {
    let tagged = match lofty::read_from_path(path) {
        Ok(tagged) => tagged,
        Err(e) => {
            log::debug!("read_tags: no tags for {:?}: {}", path, e);
            return TrackTags::default();
        }
    };

    let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
        return TrackTags::default();
    };
    let clean = |value: Option<std::borrow::Cow<'_, str>>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    TrackTags {
        artist: clean(tag.artist()),
        title: clean(tag.title()),
    }
}

/// "title by artist" when both tags exist, else the file name
pub fn display_name(file_name: &str, tags: &TrackTags) -> String {
    match (&tags.title, &tags.artist) {
        (Some(title), Some(artist)) => format!("{} by {}", title, artist),
        _ => file_name.to_string(),
    }
}

/// Resolve a user-given name: an existing path as is, otherwise a file in `dir`
pub fn resolve(dir: &Path, name: &str) -> Result<PathBuf, LibraryError> {
    let direct = PathBuf::from(name);
    if direct.is_file() {
        return Ok(direct);
    }
    let in_dir = dir.join(name);
    if in_dir.is_file() {
        return Ok(in_dir);
    }
    Err(LibraryError::NotFound {
        name: name.to_string(),
        dir: dir.to_path_buf(),
    })
}
