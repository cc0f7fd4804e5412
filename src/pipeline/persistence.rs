// Per-track session files. Loaded when a track is opened, saved before the
// track is replaced and on quit.
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::session::SessionState;
use crate::error::Result;

const SESSION_EXT: &str = "json";
const PATH_TAG_LEN: usize = 12; // hex chars of the path hash kept in the name

// <session_dir>/<track file name>.<path hash>.json
//
// The hash is over the canonical path, so two takes with the same file name
// in different folders get separate sessions. Paths that can't be
// canonicalised (already deleted, say) hash as given.
pub fn session_file_path(session_dir: &Path, track_path: &Path) -> PathBuf {
    let name = track_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled".into());
    let full = std::fs::canonicalize(track_path).unwrap_or_else(|_| track_path.to_path_buf());
    let digest = format!("{:x}", Sha256::digest(full.as_os_str().as_encoded_bytes()));
    let tag = &digest[..PATH_TAG_LEN];
    session_dir.join(format!("{name}.{tag}.{SESSION_EXT}"))
}

// A missing or unreadable file just means "start fresh"
pub fn load_session(session_dir: &Path, track_path: &Path) -> Option<SessionState> {
    let path = session_file_path(session_dir, track_path);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<SessionState>(&data) {
        Ok(state) => {
            tracing::info!(path = %path.display(), marks = state.marks.len(), "loaded session");
            Some(state)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring unreadable session file: {e}");
            None
        }
    }
}

// Save the session to disk, making the directory if it doesn't exist already
pub fn save_session(session_dir: &Path, track_path: &Path, state: &SessionState) -> Result<()> {
    let path = session_file_path(session_dir, track_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(&path, json)?;
    tracing::info!(path = %path.display(), marks = state.marks.len(), "saved session");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_keeps_track_name() {
        let p = session_file_path(Path::new("/tmp/s"), Path::new("/music/etude 3.wav"));
        assert_eq!(p.parent(), Some(Path::new("/tmp/s")));
        let name = p.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("etude 3.wav."), "{name}");
        assert!(name.ends_with(".json"), "{name}");
        assert_eq!(name.len(), "etude 3.wav.".len() + PATH_TAG_LEN + ".json".len());
    }

    #[test]
    fn same_name_in_different_folders_gets_separate_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (Path::new("/lessons/a/take.wav"), Path::new("/lessons/b/take.wav"));
        assert_ne!(session_file_path(dir.path(), a), session_file_path(dir.path(), b));
        assert_eq!(session_file_path(dir.path(), a), session_file_path(dir.path(), a));

        let state = SessionState {
            marks: vec![crate::pipeline::MarkRecord { position: 7, label: "a".into() }],
            ..SessionState::default()
        };
        save_session(dir.path(), a, &state).unwrap();
        assert!(load_session(dir.path(), b).is_none());
        assert_eq!(load_session(dir.path(), a), Some(state));
    }

    #[test]
    fn corrupt_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let track = Path::new("broken.wav");
        std::fs::write(session_file_path(dir.path(), track), "{ not json").unwrap();
        assert!(load_session(dir.path(), track).is_none());
    }

    #[test]
    fn save_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        save_session(&nested, Path::new("x.wav"), &SessionState::default()).unwrap();
        assert!(load_session(&nested, Path::new("x.wav")).is_some());
    }
}
