use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::host::Session;

const SESSION_VERSION: u32 = 1;

/// Serializable session file
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionFile {
    pub version: u32,
    pub session: Session,
}

impl SessionFile {
    pub fn from_session(session: &Session) -> Self {
        Self {
            version: SESSION_VERSION,
            session: session.clone(),
        }
    }
}

/// Save a session to a JSON file
pub fn save_session(session: &Session, path: &Path) -> Result<()> {
    let file = SessionFile::from_session(session);
    let json = serde_json::to_string_pretty(&file).context("Failed to serialize session")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Load a session from a JSON file.
///
/// A file without a `version` field is read as a bare session object, the
/// form used for hand-written fixtures.
pub fn load_session(path: &Path) -> Result<Session> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    // Peek at version to determine format
    let raw: Value = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let mut session = match raw.get("version").and_then(|v| v.as_u64()) {
        None => serde_json::from_value::<Session>(raw)
            .with_context(|| format!("Failed to parse bare session {}", path.display()))?,
        Some(version) if version > SESSION_VERSION as u64 => {
            bail!(
                "Session version {} is newer than supported version {}",
                version,
                SESSION_VERSION
            );
        }
        Some(_) => {
            let file: SessionFile = serde_json::from_value(raw)
                .with_context(|| format!("Failed to parse session {}", path.display()))?;
            file.session
        }
    };
    session.normalize();
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ClipId, ClipKind, Host};
    use crate::notation::TimeSignature;

    #[test]
    fn save_then_load_restores_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.json");

        let mut session = Session::new(TimeSignature::new(7, 8).unwrap());
        let track = session.add_track("Keys", ClipKind::Midi);
        let clip = session.add_clip(track, 0.0, 7.0);
        session.add_note(&clip, 64, 0.5, 0.5, 80.0);
        session.add_slot_clip(track, 2, 4.0);

        save_session(&session, &path).unwrap();
        let loaded = load_session(&path).unwrap();

        assert_eq!(loaded, session);
        assert_eq!(loaded.get_notes(&clip).unwrap().len(), 1);
    }

    #[test]
    fn newer_versions_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");
        std::fs::write(&path, r#"{ "version": 99, "session": {} }"#).unwrap();

        let err = load_session(&path).unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn bare_sessions_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.json");
        std::fs::write(
            &path,
            r#"{
                "tracks": [{
                    "name": "Drums",
                    "kind": "midi",
                    "arrangement": [
                        {
                            "id": "5", "kind": "midi", "start_time": 4.0, "end_time": 8.0,
                            "loop_start": 0.0, "loop_end": 4.0,
                            "start_marker": 0.0, "end_marker": 4.0
                        },
                        {
                            "id": "2", "kind": "midi", "start_time": 0.0, "end_time": 4.0,
                            "loop_start": 0.0, "loop_end": 4.0,
                            "start_marker": 0.0, "end_marker": 4.0
                        }
                    ]
                }]
            }"#,
        )
        .unwrap();

        let session = load_session(&path).unwrap();
        let track = session.resolve_track(0).unwrap();
        let ids = session.list_arrangement_clips(track).unwrap();
        assert_eq!(ids, vec![ClipId::new("2"), ClipId::new("5")]);

        // fresh ids never collide with loaded ones
        let mut session = session;
        let copy = session.duplicate_clip_to_arrangement(&ids[0], 16.0).unwrap();
        assert!(!ids.contains(&copy));
    }

    #[test]
    fn missing_files_report_the_path() {
        let err = load_session(Path::new("/nonexistent/session.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/session.json"));
    }
}
