//! Random reordering of arrangement clips.
//!
//! Clips never move in place. Every clip that changes position is staged in
//! the holding area, the originals are deleted, and the staged copies are
//! duplicated into their new slots. Clips that land where they already were
//! are left alone and keep their ids.

use std::collections::BTreeMap;

use log::info;

use super::random::SeededRng;
use super::reveal::{place, reveal_window, trim_to, HoldingArea, EPS};
use super::{TransformError, Warnings};
use crate::host::{ClipId, ClipSnapshot, Host};

/// A clip and the start it is assigned to
#[derive(Debug, Clone, PartialEq)]
pub struct Move {
    pub clip: ClipId,
    pub from: f64,
    pub to: f64,
    pub length: f64,
}

impl Move {
    fn is_noop(&self) -> bool {
        (self.to - self.from).abs() < EPS
    }
}

fn equal_lengths(clips: &[ClipSnapshot]) -> bool {
    clips
        .windows(2)
        .all(|w| (w[0].length() - w[1].length()).abs() < EPS)
}

/// Maximal runs of back-to-back clips, as index ranges into `clips`
fn contiguous_runs(clips: &[ClipSnapshot]) -> Vec<std::ops::Range<usize>> {
    let mut runs = Vec::new();
    let mut begin = 0;
    for i in 1..=clips.len() {
        if i == clips.len() || (clips[i].start_time - clips[i - 1].end_time).abs() > EPS {
            runs.push(begin..i);
            begin = i;
        }
    }
    runs
}

/// New positions for the clips of one track, sorted by start time.
///
/// Equal-length clips trade places freely across the whole selection.
/// Otherwise each run of back-to-back clips is permuted on its own and
/// repacked from the start of the run, so no clip ever spills into a gap.
pub fn plan_moves(clips: &[ClipSnapshot], rng: &mut SeededRng) -> Vec<Move> {
    let mut moves = Vec::with_capacity(clips.len());
    if clips.len() < 2 {
        return clips
            .iter()
            .map(|c| Move {
                clip: c.id.clone(),
                from: c.start_time,
                to: c.start_time,
                length: c.length(),
            })
            .collect();
    }

    if equal_lengths(clips) {
        let mut order: Vec<usize> = (0..clips.len()).collect();
        rng.shuffle(&mut order);
        for (slot, &index) in order.iter().enumerate() {
            let clip = &clips[index];
            moves.push(Move {
                clip: clip.id.clone(),
                from: clip.start_time,
                to: clips[slot].start_time,
                length: clip.length(),
            });
        }
        return moves;
    }

    for run in contiguous_runs(clips) {
        let mut order: Vec<usize> = run.clone().collect();
        rng.shuffle(&mut order);
        let mut cursor = clips[run.start].start_time;
        for index in order {
            let clip = &clips[index];
            moves.push(Move {
                clip: clip.id.clone(),
                from: clip.start_time,
                to: cursor,
                length: clip.length(),
            });
            cursor += clip.length();
        }
    }
    moves
}

/// Carry out the moves of one track and return its clips in timeline order
fn relocate<H: Host + ?Sized>(
    host: &mut H,
    mut moves: Vec<Move>,
    area: &mut HoldingArea,
    warnings: &mut Warnings,
) -> Result<Vec<ClipId>, TransformError> {
    let mut staged = Vec::new();
    for m in moves.iter().filter(|m| !m.is_noop()) {
        let copy = area.stage(host, &m.clip)?;
        reveal_window(host, &copy, 0.0, m.length)?;
        trim_to(host, &copy, m.length)?;
        staged.push((m.clip.clone(), copy));
    }
    if staged.is_empty() {
        moves.sort_by(|a, b| a.to.total_cmp(&b.to));
        return Ok(moves.into_iter().map(|m| m.clip).collect());
    }

    for (original, _) in &staged {
        host.delete_clip(original)?;
    }

    moves.sort_by(|a, b| a.to.total_cmp(&b.to));
    let mut ordered = Vec::with_capacity(moves.len());
    for m in &moves {
        if m.is_noop() {
            ordered.push(m.clip.clone());
            continue;
        }
        let copy = staged
            .iter()
            .find(|(original, _)| *original == m.clip)
            .map(|(_, copy)| copy)
            .ok_or_else(|| TransformError::NotFound(format!("staged copy of clip {}", m.clip)))?;
        let placed = place(host, copy, m.to, m.length, m.to + m.length, warnings)?;
        ordered.push(placed);
    }

    for (_, copy) in &staged {
        host.delete_clip(copy)?;
    }
    info!("shuffled {} clips, {} moved", moves.len(), staged.len());
    Ok(ordered)
}

/// Randomly reorder arrangement clips per track, preserving the covered time.
///
/// Each track's new ids are reported, in timeline order, where that track's
/// first clip appeared in `clips`. Clips outside the arrangement pass through.
pub fn shuffle_clips<H: Host + ?Sized>(
    host: &mut H,
    clips: &[ClipId],
    rng: &mut SeededRng,
    area: &mut HoldingArea,
    warnings: &mut Warnings,
) -> Result<Vec<ClipId>, TransformError> {
    let mut groups: BTreeMap<usize, Vec<ClipSnapshot>> = BTreeMap::new();
    let mut track_of = Vec::with_capacity(clips.len());
    for id in clips {
        let snap = ClipSnapshot::read(host, id)?;
        if snap.is_arrangement_clip {
            track_of.push(Some(snap.track.index));
            groups.entry(snap.track.index).or_default().push(snap);
        } else {
            warnings.push(format!(
                "clip {} is not an arrangement clip; shuffling skipped",
                id
            ));
            track_of.push(None);
        }
    }

    let mut shuffled: BTreeMap<usize, Vec<ClipId>> = BTreeMap::new();
    for (track, mut group) in groups {
        group.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        let moves = plan_moves(&group, rng);
        shuffled.insert(track, relocate(host, moves, area, warnings)?);
    }

    let mut result = Vec::with_capacity(clips.len());
    for (id, track) in clips.iter().zip(track_of) {
        match track {
            None => result.push(id.clone()),
            Some(track) => {
                if let Some(ids) = shuffled.remove(&track) {
                    result.extend(ids);
                }
            }
        }
    }
    Ok(result)
}
