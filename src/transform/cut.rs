use log::info;

use super::reveal::{place, reveal_window, trim_to, HoldingArea, EPS};
use super::{TransformError, Warnings};
use crate::host::{ClipId, ClipSnapshot, Host};

/// Consecutive `(start, end)` spans, relative to the clip start, produced by
/// cutting a clip of `length` beats at `cuts`
pub fn segments(length: f64, cuts: &[f64]) -> Vec<(f64, f64)> {
    let mut bounds = Vec::with_capacity(cuts.len() + 2);
    bounds.push(0.0);
    bounds.extend(cuts.iter().copied().filter(|c| *c > EPS && *c < length - EPS));
    bounds.push(length);
    bounds.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Cut one arrangement clip at `cuts` (offsets from the clip start, ascending)
/// and return the pieces in timeline order. The source clip is gone afterwards.
///
/// Per piece: a working copy of the holding copy is revealed at the piece's
/// content offset, trimmed in the holding area, then duplicated into place.
/// Nothing is ever written past the source's original end.
pub fn cut_clip<H: Host + ?Sized>(
    host: &mut H,
    clip: &ClipId,
    cuts: &[f64],
    area: &mut HoldingArea,
    warnings: &mut Warnings,
) -> Result<Vec<ClipId>, TransformError> {
    let source = ClipSnapshot::read(host, clip)?;
    let spans = segments(source.length(), cuts);
    if spans.len() < 2 {
        return Ok(vec![clip.clone()]);
    }

    let holding = area.stage(host, clip)?;
    let holding_length = ClipSnapshot::read(host, &holding)?.length();
    let working_slot = area.reserve(holding_length);

    let mut pieces = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        let length = end - start;
        let working = host.duplicate_clip_to_arrangement(&holding, working_slot)?;
        reveal_window(host, &working, start, length)?;
        trim_to(host, &working, length)?;
        let piece = place(
            host,
            &working,
            source.start_time + start,
            length,
            source.end_time,
            warnings,
        )?;
        host.delete_clip(&working)?;
        pieces.push(piece);
    }

    host.delete_clip(&holding)?;
    if host.clip_exists(clip) {
        host.delete_clip(clip)?;
    }
    info!(
        "cut clip {} ({:.3}..{:.3}) into {} pieces",
        clip,
        source.start_time,
        source.end_time,
        pieces.len()
    );
    Ok(pieces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::host::{ClipKind, Session};
    use crate::notation::TimeSignature;

    #[test]
    fn segments_skip_cuts_on_the_edges() {
        assert_eq!(
            segments(8.0, &[0.0, 3.0, 8.0, 9.0]),
            vec![(0.0, 3.0), (3.0, 8.0)]
        );
        assert_eq!(segments(8.0, &[]), vec![(0.0, 8.0)]);
    }

    #[test]
    fn cutting_without_cuts_leaves_the_clip_alone() {
        let mut session = Session::new(TimeSignature::default());
        let track = session.add_track("Keys", ClipKind::Midi);
        let clip = session.add_clip(track, 0.0, 8.0);
        let before = session.clone();
        let mut area = HoldingArea::new(&EngineConfig::with_holding_offset(1000.0));
        let mut warnings = Warnings::default();

        let pieces = cut_clip(&mut session, &clip, &[8.0], &mut area, &mut warnings).unwrap();

        assert_eq!(pieces, vec![clip]);
        assert_eq!(session, before);
    }

    #[test]
    fn pieces_replay_the_source_content() {
        let mut session = Session::new(TimeSignature::default());
        let track = session.add_track("Keys", ClipKind::Midi);
        let clip = session.add_clip(track, 4.0, 12.0);
        let mut area = HoldingArea::new(&EngineConfig::with_holding_offset(1000.0));
        let mut warnings = Warnings::default();

        let pieces =
            cut_clip(&mut session, &clip, &[2.0, 7.0], &mut area, &mut warnings).unwrap();

        assert_eq!(pieces.len(), 3);
        let spans: Vec<(f64, f64, f64)> = pieces
            .iter()
            .map(|id| {
                let c = session.clip(id).unwrap();
                (c.start_time, c.end_time, c.start_marker)
            })
            .collect();
        assert_eq!(
            spans,
            vec![(4.0, 6.0, 0.0), (6.0, 11.0, 2.0), (11.0, 16.0, 7.0)]
        );
        // holding copies are cleaned up
        assert_eq!(session.arrangement(track).len(), 3);
        assert!(!session.clip_exists(&clip));
    }
}
