//! Default locations under the user's music folder

use std::path::PathBuf;

/// `~/Music/automix`
pub fn default_automix_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Music")
        .join("automix")
}

/// `~/Music/automix/config.yaml`
pub fn default_config_path() -> PathBuf {
    default_automix_dir().join("config.yaml")
}

/// `~/Music/automix/music`, where songs are picked from
pub fn default_music_dir() -> PathBuf {
    default_automix_dir().join("music")
}

/// `~/Music/automix/recipes`
pub fn default_recipe_dir() -> PathBuf {
    default_automix_dir().join("recipes")
}
