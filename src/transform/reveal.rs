//! Host tricks that stand in for a missing "cut clip" primitive.
//!
//! The host can only duplicate whole clips, create blank clips and delete
//! clips. Everything the cutting engines need is built here on top of that:
//! staging copies in the holding area, revealing a window of content on a
//! copy, trimming a copy with a temporary blank ("shortener") clip, and
//! placing a copy while guarding the neighbors.

use log::debug;

use super::{TransformError, Warnings};
use crate::config::EngineConfig;
use crate::host::{ClipId, ClipKind, ClipProperty, ClipSnapshot, Host, PropertyValue, TrackRef};

/// Tolerance for beat comparisons inside the engine
pub const EPS: f64 = 1e-6;

/// Scratch timeline region far past the musical content. Every reservation
/// gets its own span so stagings for different clips never collide.
pub struct HoldingArea {
    cursor: f64,
    gap: f64,
}

impl HoldingArea {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            cursor: config.holding_offset,
            gap: config.holding_gap,
        }
    }

    /// Reserve `length` beats and return the start of the reservation
    pub fn reserve(&mut self, length: f64) -> f64 {
        let start = self.cursor;
        self.cursor += length.max(0.0) + self.gap;
        start
    }

    /// Duplicate a clip into a fresh reservation sized after the copy the host made
    pub fn stage<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        clip: &ClipId,
    ) -> Result<ClipId, TransformError> {
        let dest = self.cursor;
        let staged = host.duplicate_clip_to_arrangement(clip, dest)?;
        let end = number(host, &staged, ClipProperty::EndTime)?;
        self.cursor = end.max(dest) + self.gap;
        debug!("staged clip {} as {} at {:.3}", clip, staged, dest);
        Ok(staged)
    }

    #[cfg(test)]
    pub fn cursor(&self) -> f64 {
        self.cursor
    }
}

fn number<H: Host + ?Sized>(
    host: &H,
    clip: &ClipId,
    property: ClipProperty,
) -> Result<f64, TransformError> {
    Ok(host.get_clip_property(clip, property)?.as_f64(property)?)
}

/// Set a start/end property pair in an order the host accepts
fn set_span<H: Host + ?Sized>(
    host: &mut H,
    clip: &ClipId,
    (start_prop, end_prop): (ClipProperty, ClipProperty),
    start: f64,
    end: f64,
) -> Result<(), TransformError> {
    let current_end = number(host, clip, end_prop)?;
    if start >= current_end - EPS {
        host.set_clip_property(clip, end_prop, PropertyValue::Number(end))?;
        host.set_clip_property(clip, start_prop, PropertyValue::Number(start))?;
    } else {
        host.set_clip_property(clip, start_prop, PropertyValue::Number(start))?;
        host.set_clip_property(clip, end_prop, PropertyValue::Number(end))?;
    }
    Ok(())
}

/// Make `clip` start playing the content it used to play `offset` beats in,
/// limited to `length` beats of content when it does not loop.
///
/// Markers are locked on non-looping clips, so looping is switched on for the
/// edit and restored afterwards. Values are absolute, so repeating the call
/// after a partial failure converges on the same state.
pub fn reveal_window<H: Host + ?Sized>(
    host: &mut H,
    clip: &ClipId,
    offset: f64,
    length: f64,
) -> Result<(), TransformError> {
    let snap = ClipSnapshot::read(host, clip)?;
    let start = snap.content_position(offset);

    if snap.looping {
        let end = if snap.end_marker > start + EPS {
            snap.end_marker
        } else {
            snap.loop_end
        };
        set_span(
            host,
            clip,
            (ClipProperty::StartMarker, ClipProperty::EndMarker),
            start,
            end,
        )?;
        return Ok(());
    }

    let end = start + length;
    host.set_clip_property(clip, ClipProperty::Looping, PropertyValue::Bool(true))?;
    set_span(
        host,
        clip,
        (ClipProperty::LoopStart, ClipProperty::LoopEnd),
        start,
        end,
    )?;
    set_span(
        host,
        clip,
        (ClipProperty::StartMarker, ClipProperty::EndMarker),
        start,
        end,
    )?;
    host.set_clip_property(clip, ClipProperty::Looping, PropertyValue::Bool(false))?;
    Ok(())
}

/// Blank out `[start, end)` on a track with a temporary clip
pub fn blank_out<H: Host + ?Sized>(
    host: &mut H,
    track: TrackRef,
    kind: ClipKind,
    start: f64,
    end: f64,
) -> Result<(), TransformError> {
    if end - start <= EPS {
        return Ok(());
    }
    let shortener = host.create_blank_clip(track, kind, start, end - start)?;
    host.delete_clip(&shortener)?;
    debug!("blanked {:.3}..{:.3} on track {}", start, end, track.index);
    Ok(())
}

/// Shorten a clip from its end so it is at most `length` beats long
pub fn trim_to<H: Host + ?Sized>(
    host: &mut H,
    clip: &ClipId,
    length: f64,
) -> Result<(), TransformError> {
    let snap = ClipSnapshot::read(host, clip)?;
    if snap.length() > length + EPS {
        blank_out(
            host,
            snap.track,
            snap.kind,
            snap.start_time + length,
            snap.end_time,
        )?;
    }
    Ok(())
}

/// Duplicate a prepared copy to `dest` and cut off anything the host revealed
/// past `dest + length`. The shortener never reaches past `limit`, which is
/// where content that is not ours may start.
pub fn place<H: Host + ?Sized>(
    host: &mut H,
    prepared: &ClipId,
    dest: f64,
    length: f64,
    limit: f64,
    warnings: &mut Warnings,
) -> Result<ClipId, TransformError> {
    let placed = host.duplicate_clip_to_arrangement(prepared, dest)?;
    let snap = ClipSnapshot::read(host, &placed)?;
    let expected_end = dest + length;

    if snap.end_time > expected_end + EPS {
        let stop = snap.end_time.min(limit);
        blank_out(host, snap.track, snap.kind, expected_end, stop)?;
        if snap.end_time > limit + EPS {
            warnings.push(format!(
                "clip {} revealed content up to beat {:.3}, past the boundary at {:.3}",
                placed, snap.end_time, limit
            ));
        }
    }
    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Session;
    use crate::notation::TimeSignature;
    use approx::assert_abs_diff_eq;

    fn config() -> EngineConfig {
        EngineConfig::with_holding_offset(1000.0)
    }

    #[test]
    fn reservations_never_overlap() {
        let mut area = HoldingArea::new(&config());
        let a = area.reserve(8.0);
        let b = area.reserve(4.0);
        assert_eq!(a, 1000.0);
        assert!(b >= a + 8.0);
    }

    #[test]
    fn staging_advances_past_the_real_copy() {
        let mut session = Session::new(TimeSignature::default());
        let track = session.add_track("Vox", ClipKind::Audio);
        let clip = session.add_clip(track, 0.0, 4.0);
        {
            let data = session.clip_mut(&clip).unwrap();
            data.warping = false;
            data.end_marker = 10.0;
        }
        let mut area = HoldingArea::new(&config());
        let staged = area.stage(&mut session, &clip).unwrap();
        assert_eq!(session.clip(&staged).unwrap().end_time, 1010.0);
        assert!(area.cursor() >= 1010.0);
    }

    #[test]
    fn reveal_uses_the_looping_workaround_on_plain_clips() {
        let mut session = Session::new(TimeSignature::default());
        let track = session.add_track("Keys", ClipKind::Midi);
        let clip = session.add_clip(track, 0.0, 16.0);

        reveal_window(&mut session, &clip, 8.0, 4.0).unwrap();

        let data = session.clip(&clip).unwrap();
        assert!(!data.looping);
        assert_eq!(data.start_marker, 8.0);
        assert_eq!(data.end_marker, 12.0);
    }

    #[test]
    fn reveal_moves_only_the_start_of_looping_clips() {
        let mut session = Session::new(TimeSignature::default());
        let track = session.add_track("Keys", ClipKind::Midi);
        let clip = session.add_clip(track, 0.0, 16.0);
        {
            let data = session.clip_mut(&clip).unwrap();
            data.looping = true;
            data.loop_end = 6.0;
            data.end_marker = 6.0;
        }
        reveal_window(&mut session, &clip, 8.0, 4.0).unwrap();
        let data = session.clip(&clip).unwrap();
        assert!(data.looping);
        assert_abs_diff_eq!(data.start_marker, 2.0);
        assert_eq!(data.loop_end, 6.0);
    }

    #[test]
    fn trim_to_shortens_from_the_end() {
        let mut session = Session::new(TimeSignature::default());
        let track = session.add_track("Keys", ClipKind::Midi);
        let clip = session.add_clip(track, 1000.0, 16.0);
        trim_to(&mut session, &clip, 4.0).unwrap();
        let data = session.clip(&clip).unwrap();
        assert_eq!(data.end_time, 1004.0);
        assert_eq!(session.arrangement(track).len(), 1);
    }

    #[test]
    fn place_cuts_overflow_at_the_expected_boundary() {
        let mut session = Session::new(TimeSignature::default());
        let track = session.add_track("Vox", ClipKind::Audio);
        let prepared = session.add_clip(track, 1000.0, 4.0);
        {
            let data = session.clip_mut(&prepared).unwrap();
            data.warping = false;
            data.end_marker = 6.0;
        }
        let neighbor = session.add_clip(track, 8.0, 4.0);
        let mut warnings = Warnings::default();

        let placed = place(&mut session, &prepared, 0.0, 4.0, 8.0, &mut warnings).unwrap();

        assert_eq!(session.clip(&placed).unwrap().end_time, 4.0);
        let n = session.clip(&neighbor).unwrap();
        assert_eq!((n.start_time, n.end_time), (8.0, 12.0));
        assert!(warnings.is_empty());
    }

    #[test]
    fn place_never_blanks_past_the_limit() {
        let mut session = Session::new(TimeSignature::default());
        let track = session.add_track("Vox", ClipKind::Audio);
        let prepared = session.add_clip(track, 1000.0, 4.0);
        {
            let data = session.clip_mut(&prepared).unwrap();
            data.warping = false;
            data.end_marker = 6.0;
        }
        let far = session.add_clip(track, 20.0, 4.0);
        let mut warnings = Warnings::default();

        place(&mut session, &prepared, 0.0, 4.0, 5.0, &mut warnings).unwrap();

        // blanked 4..5 only; the overflow past the limit is reported
        assert_eq!(warnings.len(), 1);
        assert!(session.clip_exists(&far));
        let clips: Vec<(f64, f64)> = session
            .arrangement(track)
            .iter()
            .filter(|c| c.start_time < 100.0)
            .map(|c| (c.start_time, c.end_time))
            .collect();
        assert_eq!(clips, vec![(0.0, 4.0), (5.0, 6.0), (20.0, 24.0)]);
    }
}
