//! Path utilities for audio files and output naming.
//!
//! [`unique_target_path`] implements the collision rule used when a job is
//! submitted: `<stem>.<ext>`, then `<stem>_1.<ext>`, `<stem>_2.<ext>`, ...
//! until a candidate is neither on disk nor reserved by the caller.

use std::path::{Path, PathBuf};

/// List of audio file extensions recognised as conversion sources.
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "ogg", "m4a", "aac", "aiff", "aif", "wma", "opus", "alac",
];

/// Check if a path has an audio file extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use tagforged_common::paths::is_audio_file;
///
/// assert!(is_audio_file(Path::new("track.MP3")));
/// assert!(is_audio_file(Path::new("/music/album/01.flac")));
/// assert!(!is_audio_file(Path::new("cover.jpg")));
/// ```
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Get the list of audio file extensions.
pub fn audio_extensions() -> &'static [&'static str] {
    AUDIO_EXTENSIONS
}

/// Pick the first free `<dir>/<stem>[_n].<ext>` path.
///
/// A candidate is taken when it exists on disk or when `is_reserved`
/// returns true for it.
///
/// # Examples
///
/// ```
/// use std::path::{Path, PathBuf};
/// use tagforged_common::paths::unique_target_path;
///
/// let dir = Path::new("/nonexistent/out");
/// let taken = [dir.join("a.flac")];
/// let path = unique_target_path(dir, "a", "flac", |p| taken.iter().any(|t| t == p));
/// assert_eq!(path, PathBuf::from("/nonexistent/out/a_1.flac"));
/// ```
pub fn unique_target_path(
    dir: &Path,
    stem: &str,
    extension: &str,
    is_reserved: impl Fn(&Path) -> bool,
) -> PathBuf {
    let mut candidate = dir.join(format!("{stem}.{extension}"));
    let mut suffix: u32 = 1;
    while candidate.exists() || is_reserved(&candidate) {
        candidate = dir.join(format!("{stem}_{suffix}.{extension}"));
        suffix += 1;
    }
    candidate
}
