// File utilities for Diarization API
//
// This module contains utility functions for the scratch files used while a job runs.
// It handles creating unique scratch paths and removing them once the job is finished.

use log::{debug, error};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::defaults;

/// Generate a unique scratch path for an audio download
///
/// # Arguments
///
/// * `scratch_dir` - Directory holding scratch files
/// * `audio_url` - Source URL, used only to pick the file extension
///
/// # Returns
///
/// * `PathBuf` - `<scratch_dir>/<uuid>.<ext>`, where `ext` is the URL's extension when it
///   is a known audio extension and `wav` otherwise
pub fn unique_scratch_path(scratch_dir: &Path, audio_url: &str) -> PathBuf {
    let extension = audio_extension(audio_url);
    scratch_dir.join(format!("{}.{}", Uuid::new_v4(), extension))
}

/// Known audio extension of the last URL path segment, if any
fn audio_extension(audio_url: &str) -> &'static str {
    let path = audio_url
        .split(['?', '#'])
        .next()
        .unwrap_or(audio_url);
    let file_name = path.rsplit('/').next().unwrap_or(path);

    file_name
        .rsplit_once('.')
        .and_then(|(_, ext)| {
            defaults::AUDIO_EXTENSIONS
                .iter()
                .find(|known| known.eq_ignore_ascii_case(ext))
                .copied()
        })
        .unwrap_or(defaults::FALLBACK_AUDIO_EXTENSION)
}

/// Remove a scratch file
///
/// # Arguments
///
/// * `path` - Path to the file to remove
///
/// This function logs errors but doesn't return them to the caller. A file that is
/// already gone is not an error.
pub fn remove_scratch_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed scratch file: {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => error!("Failed to remove scratch file {}: {}", path.display(), e),
    }
}

/// Owns a scratch file for the duration of one job; the file is removed on drop
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        remove_scratch_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scratch_path_keeps_known_extension() {
        let dir = Path::new("/tmp/scratch");
        let path = unique_scratch_path(dir, "https://cdn.example.com/audio/session.MP3?sig=abc");
        assert_eq!(path.parent(), Some(dir));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp3"));
    }

    #[test]
    fn test_scratch_path_falls_back_to_wav() {
        let dir = Path::new("/tmp/scratch");
        for url in [
            "https://example.com/stream",
            "https://example.com/file.exe",
            "https://example.com.br/",
        ] {
            let path = unique_scratch_path(dir, url);
            assert_eq!(path.extension().and_then(|e| e.to_str()), Some("wav"), "{}", url);
        }
    }

    #[test]
    fn test_scratch_paths_are_unique() {
        let dir = Path::new("/tmp/scratch");
        let a = unique_scratch_path(dir, "https://example.com/a.wav");
        let b = unique_scratch_path(dir, "https://example.com/a.wav");
        assert_ne!(a, b);
    }

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("audio.wav");
        fs::write(&path, b"RIFF").expect("write scratch");

        {
            let scratch = ScratchFile::new(path.clone());
            assert!(scratch.path().exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_scratch_file_is_ignored() {
        let dir = TempDir::new().expect("tempdir");
        remove_scratch_file(&dir.path().join("never-created.wav"));
        drop(ScratchFile::new(dir.path().join("also-missing.wav")));
    }
}
