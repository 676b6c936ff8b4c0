//! Voice catalog backed by a directory of reference recordings
//!
//! Each `.wav` file directly inside the voices directory is one voice; its
//! file stem is the voice id. The directory is re-read on every call so that
//! files dropped in at runtime show up immediately.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Settings;

/// Extension of reference recordings
const VOICE_EXTENSION: &str = "wav";

/// URL prefix the server mounts the voices directory under
pub const VOICES_URL_PREFIX: &str = "/voices";

/// A selectable voice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub file_url: String,
}

/// List all voices, sorted by file name. Missing or unreadable directories
/// yield an empty list.
pub fn list_voices(settings: &Settings) -> Vec<Voice> {
    voice_files(&settings.voices_dir)
        .into_iter()
        .filter_map(|path| {
            let id = stem(&path)?;
            let file_name = path.file_name()?.to_string_lossy().to_string();
            Some(Voice {
                name: id.clone(),
                id,
                file_url: format!("{}/{}", VOICES_URL_PREFIX, file_name),
            })
        })
        .collect()
}

/// Resolve a voice id to its reference file.
///
/// Without an id the first voice in sorted order is the default.
pub fn resolve_voice(voice_id: Option<&str>, settings: &Settings) -> Option<PathBuf> {
    let files = voice_files(&settings.voices_dir);

    match voice_id {
        Some(id) => files
            .into_iter()
            .find(|path| stem(path).as_deref() == Some(id)),
        None => files.into_iter().next(),
    }
}

/// Regular `.wav` files directly inside `dir`, sorted by file name.
/// Symlinks are skipped so resolved paths never leave the directory.
fn voice_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Voices directory {:?} unavailable: {}", dir, e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(VOICE_EXTENSION))
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}

fn stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().to_string())
}
