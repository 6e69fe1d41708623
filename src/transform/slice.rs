use super::cut::cut_clip;
use super::reveal::{HoldingArea, EPS};
use super::{TransformError, Warnings};
use crate::config::EngineConfig;
use crate::host::{ClipId, ClipSnapshot, Host};

/// Number of pieces a clip of `length` beats is cut into; 1 when it fits in one slice.
/// Saturates instead of overflowing, so a tiny slice size still yields a count.
pub fn slice_count(length: f64, slice_size: f64) -> usize {
    if !(slice_size > 0.0) || length <= slice_size + EPS {
        return 1;
    }
    ((length - EPS) / slice_size).ceil() as usize
}

/// Offsets at which a clip of `length` beats is cut into `slice_size` pieces.
/// Empty when the clip is not longer than one slice.
pub fn slice_offsets(length: f64, slice_size: f64) -> Vec<f64> {
    (1..slice_count(length, slice_size))
        .map(|k| k as f64 * slice_size)
        .collect()
}

/// Cut every arrangement clip in `clips` into consecutive `slice_size` pieces.
///
/// Returns the working set in order: pieces in place of each sliced clip,
/// untouched clips (too short, or not in the arrangement) as they were.
/// The slice count is checked against the cap before any clip is cut.
pub fn slice_clips<H: Host + ?Sized>(
    host: &mut H,
    clips: &[ClipId],
    slice_size: f64,
    area: &mut HoldingArea,
    config: &EngineConfig,
    warnings: &mut Warnings,
) -> Result<Vec<ClipId>, TransformError> {
    if !(slice_size > 0.0) || !slice_size.is_finite() {
        return Err(TransformError::validation("slice must be greater than 0"));
    }

    // Count first; offsets are only built once the batch is known to fit
    let mut plan: Vec<(ClipId, Option<f64>)> = Vec::with_capacity(clips.len());
    let mut total: usize = 0;
    for id in clips {
        let snap = ClipSnapshot::read(host, id)?;
        if !snap.is_arrangement_clip {
            warnings.push(format!(
                "clip {} is not an arrangement clip; slicing skipped",
                id
            ));
            plan.push((id.clone(), None));
            continue;
        }
        let pieces = slice_count(snap.length(), slice_size);
        if pieces > 1 {
            total = total.saturating_add(pieces);
            plan.push((id.clone(), Some(snap.length())));
        } else {
            plan.push((id.clone(), None));
        }
    }

    if total > config.max_slices {
        return Err(TransformError::LimitExceeded {
            operation: "slicing",
            count: total,
            limit: config.max_slices,
        });
    }

    let mut result = Vec::with_capacity(clips.len().max(total));
    for (id, length) in plan {
        match length {
            Some(length) => {
                let cuts = slice_offsets(length, slice_size);
                result.extend(cut_clip(host, &id, &cuts, area, warnings)?);
            }
            None => result.push(id),
        }
    }
    Ok(result)
}
