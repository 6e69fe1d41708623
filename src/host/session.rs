use serde::{Deserialize, Serialize};

use super::{
    ClipId, ClipKind, ClipProperty, Host, HostError, Note, PropertyValue, TrackRef,
};
use crate::notation::TimeSignature;

/// Tolerance for comparing beat positions
const EPS: f64 = 1e-9;

/// +24 dB, the loudest clip gain the host accepts
pub const MAX_GAIN: f64 = 15.848_931_924_611_133;

pub const PITCH_COARSE_RANGE: (f64, f64) = (-48.0, 48.0);
pub const PITCH_FINE_RANGE: (f64, f64) = (-50.0, 50.0);

fn default_true() -> bool {
    true
}

fn unity() -> f64 {
    1.0
}

/// A clip as stored by the in-memory host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipData {
    pub id: ClipId,
    pub kind: ClipKind,
    #[serde(default)]
    pub name: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub looping: bool,
    pub loop_start: f64,
    pub loop_end: f64,
    pub start_marker: f64,
    pub end_marker: f64,
    #[serde(default = "default_true")]
    pub warping: bool,
    #[serde(default = "unity")]
    pub gain: f64,
    #[serde(default)]
    pub pitch_coarse: f64,
    #[serde(default)]
    pub pitch_fine: f64,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl ClipData {
    /// Non-looping clip whose content window matches its visible length
    pub fn new(id: ClipId, kind: ClipKind, start: f64, length: f64) -> Self {
        Self {
            id,
            kind,
            name: String::new(),
            start_time: start,
            end_time: start + length,
            looping: false,
            loop_start: 0.0,
            loop_end: length,
            start_marker: 0.0,
            end_marker: length,
            warping: true,
            gain: 1.0,
            pitch_coarse: 0.0,
            pitch_fine: 0.0,
            notes: Vec::new(),
        }
    }

    pub fn length(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Content position heard `offset` beats after the clip's visible start
    pub fn content_position(&self, offset: f64) -> f64 {
        super::content_position(
            self.start_marker,
            (self.loop_start, self.loop_end),
            self.looping,
            offset,
        )
    }

    /// Length a copy of this clip gets when duplicated into the arrangement
    fn duplicate_length(&self) -> f64 {
        if self.kind == ClipKind::Audio && !self.warping && !self.looping {
            self.end_marker - self.start_marker
        } else {
            self.length()
        }
    }

    /// Move the visible start to `new_start`, keeping the audible content in place
    fn trim_head(&mut self, new_start: f64) {
        let shift = new_start - self.start_time;
        self.start_marker = self.content_position(shift);
        self.start_time = new_start;
        if !self.looping && self.start_marker > self.end_marker {
            self.end_marker = self.start_marker;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackData {
    pub name: String,
    pub kind: ClipKind,
    /// Sorted by start time, never overlapping
    #[serde(default)]
    pub arrangement: Vec<ClipData>,
    /// Session view clip slots
    #[serde(default)]
    pub slots: Vec<Option<ClipData>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Arrangement(usize),
    Slot(usize),
}

/// In-memory host with the overlap behavior of a DAW arrangement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub time_signature: TimeSignature,
    #[serde(default)]
    pub tracks: Vec<TrackData>,
    #[serde(default)]
    next_clip_id: u64,
    #[serde(default)]
    next_note_id: u64,
}

impl Session {
    pub fn new(time_signature: TimeSignature) -> Self {
        Self {
            time_signature,
            tracks: Vec::new(),
            next_clip_id: 1,
            next_note_id: 1,
        }
    }

    /// Restore invariants after deserializing: sorted arrangements and id
    /// counters past every id in use
    pub fn normalize(&mut self) {
        let mut max_clip = 0;
        let mut max_note = 0;
        for track in &mut self.tracks {
            track
                .arrangement
                .sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
            let clips = track.arrangement.iter().chain(track.slots.iter().flatten());
            for clip in clips {
                if let Ok(n) = clip.id.as_str().parse::<u64>() {
                    max_clip = max_clip.max(n);
                }
                for note in &clip.notes {
                    max_note = max_note.max(note.id);
                }
            }
        }
        self.next_clip_id = self.next_clip_id.max(max_clip + 1);
        self.next_note_id = self.next_note_id.max(max_note + 1);
    }

    #[cfg(test)]
    pub fn add_track(&mut self, name: &str, kind: ClipKind) -> usize {
        self.tracks.push(TrackData {
            name: name.to_string(),
            kind,
            arrangement: Vec::new(),
            slots: Vec::new(),
        });
        self.tracks.len() - 1
    }

    #[cfg(test)]
    /// Add a non-looping arrangement clip. Panics on an unknown track.
    pub fn add_clip(&mut self, track: usize, start: f64, length: f64) -> ClipId {
        let id = self.alloc_clip_id();
        let kind = self.tracks[track].kind;
        let clip = ClipData::new(id.clone(), kind, start, length);
        self.place(track, clip);
        id
    }

    #[cfg(test)]
    /// Add a session view clip into a slot. Panics on an unknown track.
    pub fn add_slot_clip(&mut self, track: usize, slot: usize, length: f64) -> ClipId {
        let id = self.alloc_clip_id();
        let kind = self.tracks[track].kind;
        let clip = ClipData::new(id.clone(), kind, 0.0, length);
        let slots = &mut self.tracks[track].slots;
        if slots.len() <= slot {
            slots.resize(slot + 1, None);
        }
        slots[slot] = Some(clip);
        id
    }

    #[cfg(test)]
    /// Add a note to a MIDI clip, returning its id
    pub fn add_note(
        &mut self,
        clip: &ClipId,
        pitch: u8,
        start_time: f64,
        duration: f64,
        velocity: f64,
    ) -> Option<u64> {
        let id = self.next_note_id;
        let data = self.clip_mut(clip)?;
        data.notes.push(Note {
            id,
            pitch,
            start_time,
            duration,
            velocity,
            velocity_deviation: 0.0,
            probability: 1.0,
        });
        self.next_note_id += 1;
        Some(id)
    }

    pub fn clip(&self, id: &ClipId) -> Option<&ClipData> {
        let (track, location) = self.locate(id)?;
        let track = &self.tracks[track];
        match location {
            Location::Arrangement(i) => track.arrangement.get(i),
            Location::Slot(i) => track.slots.get(i).and_then(Option::as_ref),
        }
    }

    pub fn clip_mut(&mut self, id: &ClipId) -> Option<&mut ClipData> {
        let (track, location) = self.locate(id)?;
        let track = &mut self.tracks[track];
        match location {
            Location::Arrangement(i) => track.arrangement.get_mut(i),
            Location::Slot(i) => track.slots.get_mut(i).and_then(Option::as_mut),
        }
    }

    /// Arrangement clips of a track in timeline order
    pub fn arrangement(&self, track: usize) -> &[ClipData] {
        self.tracks
            .get(track)
            .map(|t| t.arrangement.as_slice())
            .unwrap_or(&[])
    }

    fn locate(&self, id: &ClipId) -> Option<(usize, Location)> {
        for (t, track) in self.tracks.iter().enumerate() {
            if let Some(i) = track.arrangement.iter().position(|c| &c.id == id) {
                return Some((t, Location::Arrangement(i)));
            }
            let slot = track
                .slots
                .iter()
                .position(|s| s.as_ref().is_some_and(|c| &c.id == id));
            if let Some(i) = slot {
                return Some((t, Location::Slot(i)));
            }
        }
        None
    }

    fn lookup(&self, id: &ClipId) -> Result<(usize, &ClipData), HostError> {
        let (track, _) = self
            .locate(id)
            .ok_or_else(|| HostError::NoSuchClip(id.clone()))?;
        let clip = self
            .clip(id)
            .ok_or_else(|| HostError::NoSuchClip(id.clone()))?;
        Ok((track, clip))
    }

    fn lookup_mut(&mut self, id: &ClipId) -> Result<&mut ClipData, HostError> {
        self.clip_mut(id)
            .ok_or_else(|| HostError::NoSuchClip(id.clone()))
    }

    fn alloc_clip_id(&mut self) -> ClipId {
        let id = ClipId(self.next_clip_id.to_string());
        self.next_clip_id += 1;
        id
    }

    /// Insert a clip into a track's arrangement, clearing whatever it covers
    fn place(&mut self, track: usize, clip: ClipData) {
        self.clear_region(track, clip.start_time, clip.end_time);
        let arrangement = &mut self.tracks[track].arrangement;
        let index = arrangement
            .iter()
            .position(|c| c.start_time > clip.start_time)
            .unwrap_or(arrangement.len());
        arrangement.insert(index, clip);
    }

    /// Delete, trim or split existing clips so that `[start, end)` is empty
    fn clear_region(&mut self, track: usize, start: f64, end: f64) {
        let existing = std::mem::take(&mut self.tracks[track].arrangement);
        let mut kept = Vec::with_capacity(existing.len() + 1);

        for mut clip in existing {
            if clip.end_time <= start + EPS || clip.start_time >= end - EPS {
                kept.push(clip);
                continue;
            }
            let head_covered = clip.start_time >= start - EPS;
            let tail_covered = clip.end_time <= end + EPS;
            match (head_covered, tail_covered) {
                (true, true) => {}
                (true, false) => {
                    clip.trim_head(end);
                    kept.push(clip);
                }
                (false, true) => {
                    clip.end_time = start;
                    kept.push(clip);
                }
                (false, false) => {
                    let mut tail = clip.clone();
                    tail.id = self.alloc_clip_id();
                    tail.trim_head(end);
                    clip.end_time = start;
                    kept.push(clip);
                    kept.push(tail);
                }
            }
        }

        self.tracks[track].arrangement = kept;
    }

    fn require_looping(clip: &ClipData, property: ClipProperty) -> Result<(), HostError> {
        if clip.looping {
            Ok(())
        } else {
            Err(HostError::MarkersLocked(property.name()))
        }
    }

    fn require_audio(clip: &ClipData, property: ClipProperty) -> Result<(), HostError> {
        match clip.kind {
            ClipKind::Audio => Ok(()),
            ClipKind::Midi => Err(HostError::NotApplicable {
                property: property.name(),
                kind: ClipKind::Midi.name(),
            }),
        }
    }
}

fn finite(property: ClipProperty, value: &PropertyValue) -> Result<f64, HostError> {
    let n = value.as_f64(property)?;
    if n.is_finite() {
        Ok(n)
    } else {
        Err(HostError::InvalidValue {
            property: property.name(),
            message: format!("{} is not finite", n),
        })
    }
}

fn ordered(property: ClipProperty, low: f64, high: f64) -> Result<(), HostError> {
    if low < high - EPS {
        Ok(())
    } else {
        Err(HostError::InvalidValue {
            property: property.name(),
            message: format!("start {} must be before end {}", low, high),
        })
    }
}

fn in_range(property: ClipProperty, value: f64, (min, max): (f64, f64)) -> Result<(), HostError> {
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(HostError::InvalidValue {
            property: property.name(),
            message: format!("{} is outside {}..{}", value, min, max),
        })
    }
}

impl Host for Session {
    fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    fn resolve_track(&self, index: usize) -> Result<TrackRef, HostError> {
        if index < self.tracks.len() {
            Ok(TrackRef { index })
        } else {
            Err(HostError::NoSuchTrack(index))
        }
    }

    fn list_arrangement_clips(&self, track: TrackRef) -> Result<Vec<ClipId>, HostError> {
        let data = self
            .tracks
            .get(track.index)
            .ok_or(HostError::NoSuchTrack(track.index))?;
        Ok(data.arrangement.iter().map(|c| c.id.clone()).collect())
    }

    fn clip_exists(&self, clip: &ClipId) -> bool {
        self.locate(clip).is_some()
    }

    fn duplicate_clip_to_arrangement(
        &mut self,
        clip: &ClipId,
        dest: f64,
    ) -> Result<ClipId, HostError> {
        let (track, source) = self.lookup(clip)?;
        let mut copy = source.clone();
        let length = source.duplicate_length();
        if !(length > EPS) || !dest.is_finite() {
            return Err(HostError::InvalidValue {
                property: "start_time",
                message: format!("cannot place a {} beat copy at {}", length, dest),
            });
        }
        copy.id = self.alloc_clip_id();
        copy.start_time = dest;
        copy.end_time = dest + length;
        let id = copy.id.clone();
        self.place(track, copy);
        Ok(id)
    }

    fn create_blank_clip(
        &mut self,
        track: TrackRef,
        kind: ClipKind,
        start: f64,
        length: f64,
    ) -> Result<ClipId, HostError> {
        let data = self
            .tracks
            .get(track.index)
            .ok_or(HostError::NoSuchTrack(track.index))?;
        if data.kind != kind {
            return Err(HostError::InvalidValue {
                property: "kind",
                message: format!(
                    "cannot create a {} clip on a {} track",
                    kind.name(),
                    data.kind.name()
                ),
            });
        }
        if !(length > EPS) || !start.is_finite() {
            return Err(HostError::InvalidValue {
                property: "end_time",
                message: format!("invalid blank clip {} + {}", start, length),
            });
        }
        let id = self.alloc_clip_id();
        self.place(track.index, ClipData::new(id.clone(), kind, start, length));
        Ok(id)
    }

    fn delete_clip(&mut self, clip: &ClipId) -> Result<(), HostError> {
        let (track, location) = self
            .locate(clip)
            .ok_or_else(|| HostError::NoSuchClip(clip.clone()))?;
        let data = &mut self.tracks[track];
        match location {
            Location::Arrangement(i) => {
                data.arrangement.remove(i);
            }
            Location::Slot(i) => data.slots[i] = None,
        }
        Ok(())
    }

    fn get_clip_property(
        &self,
        clip: &ClipId,
        property: ClipProperty,
    ) -> Result<PropertyValue, HostError> {
        let (track, data) = self.lookup(clip)?;
        let arranged = matches!(self.locate(clip), Some((_, Location::Arrangement(_))));
        let audio = |value: f64| match data.kind {
            ClipKind::Audio => Ok(PropertyValue::Number(value)),
            ClipKind::Midi => Err(HostError::NotApplicable {
                property: property.name(),
                kind: ClipKind::Midi.name(),
            }),
        };
        match property {
            ClipProperty::Name => Ok(PropertyValue::Text(data.name.clone())),
            ClipProperty::StartTime => Ok(PropertyValue::Number(data.start_time)),
            ClipProperty::EndTime => Ok(PropertyValue::Number(data.end_time)),
            ClipProperty::Looping => Ok(PropertyValue::Bool(data.looping)),
            ClipProperty::LoopStart => Ok(PropertyValue::Number(data.loop_start)),
            ClipProperty::LoopEnd => Ok(PropertyValue::Number(data.loop_end)),
            ClipProperty::StartMarker => Ok(PropertyValue::Number(data.start_marker)),
            ClipProperty::EndMarker => Ok(PropertyValue::Number(data.end_marker)),
            ClipProperty::Warping => match data.kind {
                ClipKind::Audio => Ok(PropertyValue::Bool(data.warping)),
                ClipKind::Midi => Err(HostError::NotApplicable {
                    property: property.name(),
                    kind: ClipKind::Midi.name(),
                }),
            },
            ClipProperty::Gain => audio(data.gain),
            ClipProperty::PitchCoarse => audio(data.pitch_coarse),
            ClipProperty::PitchFine => audio(data.pitch_fine),
            ClipProperty::IsArrangementClip => Ok(PropertyValue::Bool(arranged)),
            ClipProperty::IsMidiClip => Ok(PropertyValue::Bool(data.kind == ClipKind::Midi)),
            ClipProperty::TrackIndex => Ok(PropertyValue::Number(track as f64)),
        }
    }

    fn set_clip_property(
        &mut self,
        clip: &ClipId,
        property: ClipProperty,
        value: PropertyValue,
    ) -> Result<(), HostError> {
        let data = self.lookup_mut(clip)?;
        match property {
            ClipProperty::StartTime
            | ClipProperty::EndTime
            | ClipProperty::IsArrangementClip
            | ClipProperty::IsMidiClip
            | ClipProperty::TrackIndex => return Err(HostError::ReadOnly(property.name())),
            ClipProperty::Name => data.name = value.as_text(property)?.to_string(),
            ClipProperty::Looping => {
                let looping = value.as_bool(property)?;
                if looping && !data.looping && data.loop_end <= data.loop_start + EPS {
                    data.loop_start = data.start_marker;
                    data.loop_end = data.end_marker;
                }
                data.looping = looping;
            }
            ClipProperty::LoopStart => {
                Session::require_looping(data, property)?;
                let v = finite(property, &value)?;
                ordered(property, v, data.loop_end)?;
                data.loop_start = v;
            }
            ClipProperty::LoopEnd => {
                Session::require_looping(data, property)?;
                let v = finite(property, &value)?;
                ordered(property, data.loop_start, v)?;
                data.loop_end = v;
            }
            ClipProperty::StartMarker => {
                Session::require_looping(data, property)?;
                let v = finite(property, &value)?;
                ordered(property, v, data.end_marker)?;
                data.start_marker = v;
            }
            ClipProperty::EndMarker => {
                Session::require_looping(data, property)?;
                let v = finite(property, &value)?;
                ordered(property, data.start_marker, v)?;
                data.end_marker = v;
            }
            ClipProperty::Warping => {
                Session::require_audio(data, property)?;
                data.warping = value.as_bool(property)?;
            }
            ClipProperty::Gain => {
                Session::require_audio(data, property)?;
                let v = finite(property, &value)?;
                data.gain = v.clamp(0.0, MAX_GAIN);
            }
            ClipProperty::PitchCoarse => {
                Session::require_audio(data, property)?;
                let v = finite(property, &value)?;
                if v.fract() != 0.0 {
                    return Err(HostError::InvalidValue {
                        property: property.name(),
                        message: format!("{} is not a whole semitone", v),
                    });
                }
                in_range(property, v, PITCH_COARSE_RANGE)?;
                data.pitch_coarse = v;
            }
            ClipProperty::PitchFine => {
                Session::require_audio(data, property)?;
                let v = finite(property, &value)?;
                in_range(property, v, PITCH_FINE_RANGE)?;
                data.pitch_fine = v;
            }
        }
        Ok(())
    }

    fn get_notes(&self, clip: &ClipId) -> Result<Vec<Note>, HostError> {
        let (_, data) = self.lookup(clip)?;
        if data.kind != ClipKind::Midi {
            return Err(HostError::NotMidi(clip.clone()));
        }
        Ok(data.notes.clone())
    }

    fn apply_note_modifications(&mut self, clip: &ClipId, notes: &[Note]) -> Result<(), HostError> {
        let data = self.lookup_mut(clip)?;
        if data.kind != ClipKind::Midi {
            return Err(HostError::NotMidi(clip.clone()));
        }
        for note in notes {
            let invalid = |message: String| HostError::InvalidValue {
                property: "notes",
                message,
            };
            if note.pitch > 127 {
                return Err(invalid(format!("pitch {} out of range", note.pitch)));
            }
            if !(0.0..=127.0).contains(&note.velocity) {
                return Err(invalid(format!("velocity {} out of range", note.velocity)));
            }
            if !(0.0..=1.0).contains(&note.probability) {
                return Err(invalid(format!("probability {} out of range", note.probability)));
            }
            if !(note.duration > 0.0) {
                return Err(invalid(format!("duration {} must be positive", note.duration)));
            }
            if !data.notes.iter().any(|n| n.id == note.id) {
                return Err(invalid(format!("no note with id {}", note.id)));
            }
        }
        for note in notes {
            if let Some(existing) = data.notes.iter_mut().find(|n| n.id == note.id) {
                *existing = note.clone();
            }
        }
        Ok(())
    }
}
