use parking_lot::RwLock;

use super::{ClipId, ClipKind, ClipProperty, Host, HostError, Note, PropertyValue, TrackRef};
use crate::command::{Command, CommandSource};
use crate::event::EventLog;
use crate::notation::TimeSignature;

/// Host wrapper that records every successful mutating call in the event log
pub struct JournaledHost<'a, H: Host> {
    inner: &'a mut H,
    log: &'a RwLock<EventLog>,
    source: CommandSource,
}

impl<'a, H: Host> JournaledHost<'a, H> {
    pub fn new(inner: &'a mut H, log: &'a RwLock<EventLog>, source: CommandSource) -> Self {
        Self { inner, log, source }
    }

    fn record(&self, command: Command) {
        self.log.write().record(command, self.source);
    }
}

impl<H: Host> Host for JournaledHost<'_, H> {
    fn time_signature(&self) -> TimeSignature {
        self.inner.time_signature()
    }

    fn resolve_track(&self, index: usize) -> Result<TrackRef, HostError> {
        self.inner.resolve_track(index)
    }

    fn list_arrangement_clips(&self, track: TrackRef) -> Result<Vec<ClipId>, HostError> {
        self.inner.list_arrangement_clips(track)
    }

    fn clip_exists(&self, clip: &ClipId) -> bool {
        self.inner.clip_exists(clip)
    }

    fn duplicate_clip_to_arrangement(
        &mut self,
        clip: &ClipId,
        dest: f64,
    ) -> Result<ClipId, HostError> {
        let created = self.inner.duplicate_clip_to_arrangement(clip, dest)?;
        self.record(Command::DuplicateClip {
            clip: clip.clone(),
            dest,
            created: created.clone(),
        });
        Ok(created)
    }

    fn create_blank_clip(
        &mut self,
        track: TrackRef,
        kind: ClipKind,
        start: f64,
        length: f64,
    ) -> Result<ClipId, HostError> {
        let created = self.inner.create_blank_clip(track, kind, start, length)?;
        self.record(Command::CreateBlankClip {
            track: track.index,
            kind,
            start,
            length,
            created: created.clone(),
        });
        Ok(created)
    }

    fn delete_clip(&mut self, clip: &ClipId) -> Result<(), HostError> {
        self.inner.delete_clip(clip)?;
        self.record(Command::DeleteClip(clip.clone()));
        Ok(())
    }

    fn get_clip_property(
        &self,
        clip: &ClipId,
        property: ClipProperty,
    ) -> Result<PropertyValue, HostError> {
        self.inner.get_clip_property(clip, property)
    }

    fn set_clip_property(
        &mut self,
        clip: &ClipId,
        property: ClipProperty,
        value: PropertyValue,
    ) -> Result<(), HostError> {
        self.inner.set_clip_property(clip, property, value.clone())?;
        self.record(Command::SetClipProperty {
            clip: clip.clone(),
            property,
            value,
        });
        Ok(())
    }

    fn get_notes(&self, clip: &ClipId) -> Result<Vec<Note>, HostError> {
        self.inner.get_notes(clip)
    }

    fn apply_note_modifications(&mut self, clip: &ClipId, notes: &[Note]) -> Result<(), HostError> {
        self.inner.apply_note_modifications(clip, notes)?;
        self.record(Command::ApplyNotes {
            clip: clip.clone(),
            count: notes.len(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Session;

    #[test]
    fn records_successful_mutations_only() {
        let mut session = Session::new(TimeSignature::default());
        let track = session.add_track("Keys", ClipKind::Midi);
        let clip = session.add_clip(track, 0.0, 4.0);
        let log = RwLock::new(EventLog::new());

        let mut host = JournaledHost::new(&mut session, &log, CommandSource::Cli);
        let copy = host.duplicate_clip_to_arrangement(&clip, 8.0).unwrap();
        assert!(host
            .set_clip_property(&copy, ClipProperty::StartTime, PropertyValue::Number(1.0))
            .is_err());
        host.delete_clip(&copy).unwrap();

        let events = log.read().events_since(0);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].command, Command::DuplicateClip { .. }));
        assert_eq!(events[1].command, Command::DeleteClip(copy));
        assert_eq!(events[1].source, CommandSource::Cli);
    }
}
