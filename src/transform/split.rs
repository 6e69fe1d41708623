use super::cut::cut_clip;
use super::reveal::{HoldingArea, EPS};
use super::{TransformError, Warnings};
use crate::config::EngineConfig;
use crate::host::{ClipId, ClipSnapshot, Host};

/// Offsets (from the clip start) of the split positions strictly inside the clip
pub fn split_offsets(clip: &ClipSnapshot, positions: &[f64]) -> Vec<f64> {
    let mut cuts: Vec<f64> = positions
        .iter()
        .filter(|p| **p > clip.start_time + EPS && **p < clip.end_time - EPS)
        .map(|p| p - clip.start_time)
        .collect();
    cuts.sort_by(f64::total_cmp);
    cuts.dedup_by(|a, b| (*a - *b).abs() < EPS);
    cuts
}

/// Cut arrangement clips at absolute arrangement `positions` (beats).
///
/// Positions outside a clip are ignored for that clip; a clip with no
/// position inside it stays as it is.
pub fn split_clips<H: Host + ?Sized>(
    host: &mut H,
    clips: &[ClipId],
    positions: &[f64],
    area: &mut HoldingArea,
    config: &EngineConfig,
    warnings: &mut Warnings,
) -> Result<Vec<ClipId>, TransformError> {
    if positions.is_empty() {
        return Err(TransformError::validation(
            "split requires at least one position",
        ));
    }
    if positions.windows(2).any(|w| w[1] < w[0]) {
        warnings.push("split positions were not in ascending order; sorted them");
    }

    let mut plan: Vec<(ClipId, Vec<f64>)> = Vec::with_capacity(clips.len());
    let mut total = 0;
    for id in clips {
        let snap = ClipSnapshot::read(host, id)?;
        if !snap.is_arrangement_clip {
            warnings.push(format!(
                "clip {} is not an arrangement clip; splitting skipped",
                id
            ));
            plan.push((id.clone(), Vec::new()));
            continue;
        }
        let cuts = split_offsets(&snap, positions);
        if !cuts.is_empty() {
            total += cuts.len() + 1;
        }
        plan.push((id.clone(), cuts));
    }

    if total > config.max_split_fragments {
        return Err(TransformError::LimitExceeded {
            operation: "splitting",
            count: total,
            limit: config.max_split_fragments,
        });
    }

    let mut result = Vec::with_capacity(clips.len() + total);
    for (id, cuts) in plan {
        if cuts.is_empty() {
            result.push(id);
        } else {
            result.extend(cut_clip(host, &id, &cuts, area, warnings)?);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ClipKind, Session};
    use crate::notation::TimeSignature;

    fn setup() -> (Session, usize, HoldingArea, EngineConfig) {
        let mut session = Session::new(TimeSignature::default());
        let track = session.add_track("Bass", ClipKind::Midi);
        let config = EngineConfig::with_holding_offset(1000.0);
        (session, track, HoldingArea::new(&config), config)
    }

    fn spans(session: &Session, ids: &[ClipId]) -> Vec<(f64, f64)> {
        ids.iter()
            .map(|id| {
                let c = session.clip(id).unwrap();
                (c.start_time, c.end_time)
            })
            .collect()
    }

    #[test]
    fn splits_at_explicit_positions() {
        let (mut session, track, mut area, config) = setup();
        let clip = session.add_clip(track, 4.0, 16.0);
        let mut warnings = Warnings::default();

        let pieces = split_clips(
            &mut session,
            &[clip.clone()],
            &[7.0, 12.0],
            &mut area,
            &config,
            &mut warnings,
        )
        .unwrap();

        assert_eq!(spans(&session, &pieces), vec![(4.0, 7.0), (7.0, 12.0), (12.0, 20.0)]);
        assert_eq!(session.clip(&pieces[2]).unwrap().start_marker, 8.0);
        assert!(!session.clip_exists(&clip));
    }

    #[test]
    fn positions_outside_the_clip_are_ignored() {
        let (mut session, track, mut area, config) = setup();
        let clip = session.add_clip(track, 0.0, 8.0);
        let other = session.add_clip(track, 8.0, 8.0);
        let mut warnings = Warnings::default();

        let pieces = split_clips(
            &mut session,
            &[clip, other.clone()],
            &[0.0, 4.0, 8.0, 40.0],
            &mut area,
            &config,
            &mut warnings,
        )
        .unwrap();

        // only 4.0 falls strictly inside the first clip
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[2], other);
        assert_eq!(spans(&session, &pieces), vec![(0.0, 4.0), (4.0, 8.0), (8.0, 16.0)]);
    }

    #[test]
    fn unsorted_positions_are_sorted_with_a_warning() {
        let (mut session, track, mut area, config) = setup();
        let clip = session.add_clip(track, 0.0, 8.0);
        let mut warnings = Warnings::default();

        let pieces = split_clips(
            &mut session,
            &[clip],
            &[6.0, 2.0],
            &mut area,
            &config,
            &mut warnings,
        )
        .unwrap();

        assert_eq!(spans(&session, &pieces), vec![(0.0, 2.0), (2.0, 6.0), (6.0, 8.0)]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn fragment_count_has_its_own_cap() {
        let (mut session, track, mut area, _) = setup();
        let config = EngineConfig {
            max_split_fragments: 2,
            ..EngineConfig::with_holding_offset(1000.0)
        };
        let clip = session.add_clip(track, 0.0, 8.0);
        let mut warnings = Warnings::default();
        let err = split_clips(
            &mut session,
            &[clip],
            &[2.0, 4.0],
            &mut area,
            &config,
            &mut warnings,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TransformError::LimitExceeded { operation: "splitting", count: 3, limit: 2 }
        ));
    }

    #[test]
    fn slice_cap_does_not_limit_splitting() {
        let (mut session, track, mut area, _) = setup();
        let config = EngineConfig {
            max_slices: 1,
            ..EngineConfig::with_holding_offset(1000.0)
        };
        let clip = session.add_clip(track, 0.0, 8.0);
        let mut warnings = Warnings::default();

        let pieces = split_clips(
            &mut session,
            &[clip],
            &[2.0, 4.0],
            &mut area,
            &config,
            &mut warnings,
        )
        .unwrap();

        assert_eq!(pieces.len(), 3);
    }
}
