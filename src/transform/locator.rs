use log::debug;

use super::reveal::EPS;
use super::{TransformError, TransformParams, Warnings};
use crate::host::{ClipId, ClipProperty, Host};
use crate::notation::{to_beats, TimeSignature};

/// What a transform call operates on
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Ids(Vec<ClipId>),
    Range { track: usize, start: f64, length: f64 },
}

/// Split a comma-separated id list; blanks are skipped and repeats collapsed
pub fn parse_id_list(text: &str) -> Vec<ClipId> {
    let mut ids: Vec<ClipId> = Vec::new();
    for part in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id = ClipId::new(part);
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

impl Target {
    /// The id list wins when both forms are given
    pub fn from_params(
        params: &TransformParams,
        sig: TimeSignature,
        warnings: &mut Warnings,
    ) -> Result<Self, TransformError> {
        if let Some(ids) = &params.clip_ids {
            if params.arrangement_track_index.is_some() {
                warnings.push("both clipIds and an arrangement range were given; using clipIds");
            }
            return Ok(Target::Ids(parse_id_list(ids)));
        }

        let Some(track) = params.arrangement_track_index else {
            return Err(TransformError::validation(
                "either clipIds or arrangementTrackIndex is required",
            ));
        };
        let (Some(start), Some(length)) = (&params.arrangement_start, &params.arrangement_length)
        else {
            return Err(TransformError::validation(
                "arrangementTrackIndex requires arrangementStart and arrangementLength",
            ));
        };
        let start = to_beats(start, sig)?;
        let length = to_beats(length, sig)?;
        if length <= 0.0 {
            return Err(TransformError::validation(
                "arrangementLength must be greater than 0",
            ));
        }
        Ok(Target::Range {
            track,
            start,
            length,
        })
    }
}

/// Resolve a target to clip ids: input order for ids, timeline order for a range
pub fn locate<H: Host + ?Sized>(
    host: &H,
    target: &Target,
    warnings: &mut Warnings,
) -> Result<Vec<ClipId>, TransformError> {
    match target {
        Target::Ids(ids) => {
            let mut found = Vec::with_capacity(ids.len());
            for id in ids {
                if host.clip_exists(id) {
                    found.push(id.clone());
                } else {
                    warnings.push(format!("clip {} was not found; skipping it", id));
                }
            }
            Ok(found)
        }
        Target::Range {
            track,
            start,
            length,
        } => {
            let track_ref = host
                .resolve_track(*track)
                .map_err(|_| TransformError::NotFound(format!("no track at index {}", track)))?;
            let end = start + length;
            let mut found = Vec::new();
            for id in host.list_arrangement_clips(track_ref)? {
                let at = host
                    .get_clip_property(&id, ClipProperty::StartTime)?
                    .as_f64(ClipProperty::StartTime)?;
                if at >= start - EPS && at < end - EPS {
                    found.push(id);
                }
            }
            if found.is_empty() {
                warnings.push(format!(
                    "no clips start between beat {} and {} on track {}",
                    start, end, track
                ));
            }
            debug!("range on track {} matched {} clips", track, found.len());
            Ok(found)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ClipKind, Session};

    fn range_params(start: &str, length: &str) -> TransformParams {
        TransformParams {
            arrangement_track_index: Some(0),
            arrangement_start: Some(start.to_string()),
            arrangement_length: Some(length.to_string()),
            ..Default::default()
        }
    }

    fn three_clips() -> (Session, Vec<ClipId>) {
        let mut session = Session::new(TimeSignature::default());
        let track = session.add_track("Drums", ClipKind::Midi);
        let ids = [0.0, 8.0, 16.0]
            .iter()
            .map(|at| session.add_clip(track, *at, 4.0))
            .collect();
        (session, ids)
    }

    #[test]
    fn id_lists_are_trimmed_and_deduplicated() {
        assert_eq!(
            parse_id_list(" 3, 1,,3 ,"),
            vec![ClipId::new("3"), ClipId::new("1")]
        );
    }

    #[test]
    fn range_is_half_open_on_start_time() {
        let (session, ids) = three_clips();
        let mut warnings = Warnings::default();
        let target = Target::from_params(
            &range_params("1|1.0", "4:0.0"),
            session.time_signature,
            &mut warnings,
        )
        .unwrap();
        assert_eq!(
            target,
            Target::Range {
                track: 0,
                start: 0.0,
                length: 16.0
            }
        );
        let found = locate(&session, &target, &mut warnings).unwrap();
        assert_eq!(found, ids[..2].to_vec());
        assert!(warnings.is_empty());
    }

    #[test]
    fn ids_win_over_a_range() {
        let (session, ids) = three_clips();
        let mut warnings = Warnings::default();
        let params = TransformParams {
            clip_ids: Some(format!("{}, 999", ids[2])),
            ..range_params("1|1", "1:0")
        };
        let target = Target::from_params(&params, session.time_signature, &mut warnings).unwrap();
        let found = locate(&session, &target, &mut warnings).unwrap();
        assert_eq!(found, vec![ids[2].clone()]);
        // one for the ignored range, one for the missing id
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn missing_target_is_a_validation_error() {
        let mut warnings = Warnings::default();
        let err = Target::from_params(
            &TransformParams::default(),
            TimeSignature::default(),
            &mut warnings,
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::Validation(_)));
    }

    #[test]
    fn empty_length_is_rejected() {
        let mut warnings = Warnings::default();
        let err = Target::from_params(
            &range_params("1|1", "0:0"),
            TimeSignature::default(),
            &mut warnings,
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::Validation(_)));
    }

    #[test]
    fn unknown_track_is_not_found() {
        let (session, _) = three_clips();
        let mut warnings = Warnings::default();
        let target = Target::Range {
            track: 4,
            start: 0.0,
            length: 4.0,
        };
        assert!(matches!(
            locate(&session, &target, &mut warnings),
            Err(TransformError::NotFound(_))
        ));
    }

    #[test]
    fn empty_range_warns() {
        let (session, _) = three_clips();
        let mut warnings = Warnings::default();
        let target = Target::Range {
            track: 0,
            start: 32.0,
            length: 4.0,
        };
        assert!(locate(&session, &target, &mut warnings).unwrap().is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
