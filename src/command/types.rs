use serde::{Deserialize, Serialize};

use crate::host::{ClipId, ClipKind, ClipProperty, PropertyValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandSource {
    Cli,
    Mcp,
}

/// A mutating call made against the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    DuplicateClip {
        clip: ClipId,
        dest: f64,
        created: ClipId,
    },
    CreateBlankClip {
        track: usize,
        kind: ClipKind,
        start: f64,
        length: f64,
        created: ClipId,
    },
    DeleteClip(ClipId),
    SetClipProperty {
        clip: ClipId,
        property: ClipProperty,
        value: PropertyValue,
    },
    ApplyNotes {
        clip: ClipId,
        count: usize,
    },
    LoadSession {
        path: String,
    },
}

impl Command {
    /// True for calls that only exist to stage or trim content
    pub fn is_scratch(&self, holding_offset: f64) -> bool {
        match self {
            Command::DuplicateClip { dest, .. } => *dest >= holding_offset,
            Command::CreateBlankClip { .. } => true,
            _ => false,
        }
    }

    /// Human-readable description of the command
    pub fn description(&self) -> String {
        match self {
            Command::DuplicateClip {
                clip,
                dest,
                created,
            } => format!("Duplicate clip {} to {:.3} as {}", clip, dest, created),
            Command::CreateBlankClip {
                track,
                kind,
                start,
                length,
                created,
            } => format!(
                "Create blank {} clip {} on track {} at {:.3} ({:.3} beats)",
                kind.name(),
                created,
                track,
                start,
                length
            ),
            Command::DeleteClip(clip) => format!("Delete clip {}", clip),
            Command::SetClipProperty {
                clip,
                property,
                value,
            } => {
                let value = match value {
                    PropertyValue::Bool(b) => b.to_string(),
                    PropertyValue::Number(n) => format!("{:.3}", n),
                    PropertyValue::Text(s) => format!("'{}'", s),
                };
                format!("Set clip {} {} to {}", clip, property.name(), value)
            }
            Command::ApplyNotes { clip, count } => {
                format!("Rewrite {} notes in clip {}", count, clip)
            }
            Command::LoadSession { path } => format!("Load session '{}'", path),
        }
    }
}
