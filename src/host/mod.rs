//! The narrow host capability set the transform engine is written against.
//!
//! Clips are addressed by [`ClipId`] values only. A mutating call may move,
//! trim or remove other clips, so callers re-resolve through the host right
//! before every use instead of holding on to clip state.

pub mod journal;
pub mod session;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notation::TimeSignature;

pub use journal::JournaledHost;
pub use session::Session;

/// Lightweight clip handle, resolved on demand
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(pub String);

impl ClipId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRef {
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipKind {
    Midi,
    Audio,
}

impl ClipKind {
    pub fn name(&self) -> &'static str {
        match self {
            ClipKind::Midi => "midi",
            ClipKind::Audio => "audio",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipProperty {
    Name,
    StartTime,
    EndTime,
    Looping,
    LoopStart,
    LoopEnd,
    StartMarker,
    EndMarker,
    Warping,
    Gain,
    PitchCoarse,
    PitchFine,
    IsArrangementClip,
    IsMidiClip,
    TrackIndex,
}

impl ClipProperty {
    pub fn name(&self) -> &'static str {
        match self {
            ClipProperty::Name => "name",
            ClipProperty::StartTime => "start_time",
            ClipProperty::EndTime => "end_time",
            ClipProperty::Looping => "looping",
            ClipProperty::LoopStart => "loop_start",
            ClipProperty::LoopEnd => "loop_end",
            ClipProperty::StartMarker => "start_marker",
            ClipProperty::EndMarker => "end_marker",
            ClipProperty::Warping => "warping",
            ClipProperty::Gain => "gain",
            ClipProperty::PitchCoarse => "pitch_coarse",
            ClipProperty::PitchFine => "pitch_fine",
            ClipProperty::IsArrangementClip => "is_arrangement_clip",
            ClipProperty::IsMidiClip => "is_midi_clip",
            ClipProperty::TrackIndex => "track_index",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl PropertyValue {
    pub fn as_f64(&self, property: ClipProperty) -> Result<f64, HostError> {
        match self {
            PropertyValue::Number(n) => Ok(*n),
            _ => Err(HostError::TypeMismatch {
                property: property.name(),
                expected: "number",
            }),
        }
    }

    pub fn as_bool(&self, property: ClipProperty) -> Result<bool, HostError> {
        match self {
            PropertyValue::Bool(b) => Ok(*b),
            _ => Err(HostError::TypeMismatch {
                property: property.name(),
                expected: "bool",
            }),
        }
    }

    pub fn as_text(&self, property: ClipProperty) -> Result<&str, HostError> {
        match self {
            PropertyValue::Text(s) => Ok(s),
            _ => Err(HostError::TypeMismatch {
                property: property.name(),
                expected: "text",
            }),
        }
    }
}

/// A MIDI note; times are in clip-content beats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: u64,
    pub pitch: u8,
    pub start_time: f64,
    pub duration: f64,
    pub velocity: f64,
    #[serde(default)]
    pub velocity_deviation: f64,
    #[serde(default = "default_probability")]
    pub probability: f64,
}

fn default_probability() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("no clip with id {0}")]
    NoSuchClip(ClipId),
    #[error("no track at index {0}")]
    NoSuchTrack(usize),
    #[error("property {0} is read-only")]
    ReadOnly(&'static str),
    #[error("property {0} can only be changed while looping is enabled")]
    MarkersLocked(&'static str),
    #[error("property {property} does not apply to {kind} clips")]
    NotApplicable {
        property: &'static str,
        kind: &'static str,
    },
    #[error("property {property} expects a {expected} value")]
    TypeMismatch {
        property: &'static str,
        expected: &'static str,
    },
    #[error("invalid value for {property}: {message}")]
    InvalidValue {
        property: &'static str,
        message: String,
    },
    #[error("clip {0} is not a MIDI clip")]
    NotMidi(ClipId),
}

/// Capabilities the DAW host exposes to the engine. Every call is synchronous.
pub trait Host {
    fn time_signature(&self) -> TimeSignature;

    fn resolve_track(&self, index: usize) -> Result<TrackRef, HostError>;

    /// Arrangement clip ids of a track, ordered by start time
    fn list_arrangement_clips(&self, track: TrackRef) -> Result<Vec<ClipId>, HostError>;

    fn clip_exists(&self, clip: &ClipId) -> bool;

    /// Copy a whole clip onto its own track's arrangement at `dest` beats
    fn duplicate_clip_to_arrangement(&mut self, clip: &ClipId, dest: f64)
        -> Result<ClipId, HostError>;

    fn create_blank_clip(
        &mut self,
        track: TrackRef,
        kind: ClipKind,
        start: f64,
        length: f64,
    ) -> Result<ClipId, HostError>;

    fn delete_clip(&mut self, clip: &ClipId) -> Result<(), HostError>;

    fn get_clip_property(&self, clip: &ClipId, property: ClipProperty)
        -> Result<PropertyValue, HostError>;

    fn set_clip_property(
        &mut self,
        clip: &ClipId,
        property: ClipProperty,
        value: PropertyValue,
    ) -> Result<(), HostError>;

    fn get_notes(&self, clip: &ClipId) -> Result<Vec<Note>, HostError>;

    /// Replace the notes of a clip in one batch, matched by note id
    fn apply_note_modifications(&mut self, clip: &ClipId, notes: &[Note]) -> Result<(), HostError>;
}

/// Point-in-time copy of the clip properties the engine reasons about.
/// Only valid until the next mutating host call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipSnapshot {
    pub id: ClipId,
    pub name: String,
    pub kind: ClipKind,
    pub track: TrackRef,
    pub is_arrangement_clip: bool,
    pub start_time: f64,
    pub end_time: f64,
    pub looping: bool,
    pub loop_start: f64,
    pub loop_end: f64,
    pub start_marker: f64,
    pub end_marker: f64,
    pub warping: bool,
    pub gain: Option<f64>,
    pub pitch_coarse: Option<f64>,
    pub pitch_fine: Option<f64>,
}

impl ClipSnapshot {
    /// Read the snapshot through the property interface
    pub fn read<H: Host + ?Sized>(host: &H, id: &ClipId) -> Result<Self, HostError> {
        let number = |p: ClipProperty| host.get_clip_property(id, p)?.as_f64(p);
        let flag = |p: ClipProperty| host.get_clip_property(id, p)?.as_bool(p);

        let kind = if flag(ClipProperty::IsMidiClip)? {
            ClipKind::Midi
        } else {
            ClipKind::Audio
        };
        let audio_only = |p: ClipProperty| -> Result<Option<f64>, HostError> {
            match kind {
                ClipKind::Audio => number(p).map(Some),
                ClipKind::Midi => Ok(None),
            }
        };

        Ok(Self {
            id: id.clone(),
            name: host
                .get_clip_property(id, ClipProperty::Name)?
                .as_text(ClipProperty::Name)?
                .to_string(),
            kind,
            track: TrackRef {
                index: number(ClipProperty::TrackIndex)? as usize,
            },
            is_arrangement_clip: flag(ClipProperty::IsArrangementClip)?,
            start_time: number(ClipProperty::StartTime)?,
            end_time: number(ClipProperty::EndTime)?,
            looping: flag(ClipProperty::Looping)?,
            loop_start: number(ClipProperty::LoopStart)?,
            loop_end: number(ClipProperty::LoopEnd)?,
            start_marker: number(ClipProperty::StartMarker)?,
            end_marker: number(ClipProperty::EndMarker)?,
            warping: match kind {
                ClipKind::Audio => flag(ClipProperty::Warping)?,
                ClipKind::Midi => true,
            },
            gain: audio_only(ClipProperty::Gain)?,
            pitch_coarse: audio_only(ClipProperty::PitchCoarse)?,
            pitch_fine: audio_only(ClipProperty::PitchFine)?,
        })
    }

    pub fn length(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Content position heard `offset` beats after the visible start
    pub fn content_position(&self, offset: f64) -> f64 {
        content_position(
            self.start_marker,
            (self.loop_start, self.loop_end),
            self.looping,
            offset,
        )
    }
}

/// Content position heard `offset` beats after a clip's visible start.
/// Looping clips wrap back into `(loop_start, loop_end)`.
pub fn content_position(
    start_marker: f64,
    (loop_start, loop_end): (f64, f64),
    looping: bool,
    offset: f64,
) -> f64 {
    const EPS: f64 = 1e-9;
    let pos = start_marker + offset;
    let span = loop_end - loop_start;
    if looping && span > EPS && pos >= loop_end - EPS {
        let wrapped = loop_start + (pos - loop_end).rem_euclid(span);
        if (wrapped - loop_end).abs() < EPS {
            loop_start
        } else {
            wrapped
        }
    } else {
        pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looping_content_wraps_into_the_loop() {
        assert_eq!(content_position(0.0, (0.0, 4.0), true, 6.0), 2.0);
        assert_eq!(content_position(1.0, (0.0, 4.0), true, 3.0), 0.0);
        assert_eq!(content_position(2.0, (1.0, 3.0), true, 5.0), 1.0);
    }

    #[test]
    fn non_looping_content_runs_on() {
        assert_eq!(content_position(1.0, (0.0, 4.0), false, 6.0), 7.0);
    }
}
