use log::debug;

use super::random::SeededRng;
use super::{TransformError, TransformParams, Warnings};
use crate::host::{ClipId, ClipKind, ClipProperty, ClipSnapshot, Host, Note, PropertyValue};

const VELOCITY_RANGE: (f64, f64) = (1.0, 127.0);
const DEVIATION_RANGE: (f64, f64) = (-127.0, 127.0);
const MAX_GAIN_DB: f64 = 24.0;
const COARSE_RANGE: (f64, f64) = (-48.0, 48.0);
const FINE_RANGE: (f64, f64) = (-50.0, 50.0);
const MIN_NOTE_DURATION: f64 = 1.0 / 128.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Transpose {
    /// Uniform draw between the bounds
    Range(f64, f64),
    /// Uniform pick from a list of semitone offsets
    Values(Vec<f64>),
}

impl Transpose {
    fn draw(&self, rng: &mut SeededRng) -> f64 {
        match self {
            Transpose::Range(min, max) => rng.range(*min, *max),
            Transpose::Values(values) => rng.pick(values).copied().unwrap_or(0.0),
        }
    }
}

/// Validated modification request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modifications {
    pub velocity: Option<(f64, f64)>,
    pub velocity_range: Option<f64>,
    pub probability: Option<f64>,
    pub duration: Option<(f64, f64)>,
    pub gain_db: Option<(f64, f64)>,
    pub transpose: Option<Transpose>,
}

fn finite(name: &str, value: f64) -> Result<f64, TransformError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(TransformError::validation(format!("{} must be a finite number", name)))
    }
}

/// Both bounds of a range, or nothing. A lone bound is ignored with a warning.
fn bounds(
    (min_name, min): (&str, Option<f64>),
    (max_name, max): (&str, Option<f64>),
    warnings: &mut Warnings,
) -> Result<Option<(f64, f64)>, TransformError> {
    match (min, max) {
        (Some(min), Some(max)) => {
            let min = finite(min_name, min)?;
            let max = finite(max_name, max)?;
            if min > max {
                return Err(TransformError::validation(format!(
                    "{} ({}) must not exceed {} ({})",
                    min_name, min, max_name, max
                )));
            }
            Ok(Some((min, max)))
        }
        (None, None) => Ok(None),
        _ => {
            warnings.push(format!(
                "{} and {} must be given together; ignoring them",
                min_name, max_name
            ));
            Ok(None)
        }
    }
}

fn parse_transpose_values(text: &str) -> Result<Vec<f64>, TransformError> {
    let values = text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    TransformError::validation(format!("invalid transposeValues entry '{}'", s))
                })
        })
        .collect::<Result<Vec<f64>, _>>()?;
    if values.is_empty() {
        return Err(TransformError::validation(
            "transposeValues must list at least one value",
        ));
    }
    Ok(values)
}

impl Modifications {
    /// Validate the modification parameters; `None` when nothing is requested
    pub fn from_params(
        params: &TransformParams,
        warnings: &mut Warnings,
    ) -> Result<Option<Self>, TransformError> {
        let velocity = bounds(
            ("velocityMin", params.velocity_min),
            ("velocityMax", params.velocity_max),
            warnings,
        )?;
        let duration = bounds(
            ("durationMin", params.duration_min),
            ("durationMax", params.duration_max),
            warnings,
        )?;
        if let Some((min, _)) = duration {
            if min <= 0.0 {
                return Err(TransformError::validation(
                    "durationMin must be greater than 0",
                ));
            }
        }
        let gain_db = bounds(
            ("gainDbMin", params.gain_db_min),
            ("gainDbMax", params.gain_db_max),
            warnings,
        )?;
        let range = bounds(
            ("transposeMin", params.transpose_min),
            ("transposeMax", params.transpose_max),
            warnings,
        )?;
        let values = params
            .transpose_values
            .as_deref()
            .map(parse_transpose_values)
            .transpose()?;
        let transpose = match (values, range) {
            (Some(values), Some(_)) => {
                warnings.push(
                    "transposeValues and transposeMin/transposeMax are exclusive; using transposeValues",
                );
                Some(Transpose::Values(values))
            }
            (Some(values), None) => Some(Transpose::Values(values)),
            (None, Some((min, max))) => Some(Transpose::Range(min, max)),
            (None, None) => None,
        };

        let velocity_range = params
            .velocity_range
            .map(|v| finite("velocityRange", v))
            .transpose()?;
        let probability = params
            .probability
            .map(|v| finite("probability", v))
            .transpose()?;

        let mods = Self {
            velocity,
            velocity_range,
            probability,
            duration,
            gain_db,
            transpose,
        };
        Ok((mods != Self::default()).then_some(mods))
    }

    pub fn touches_notes(&self) -> bool {
        self.velocity.is_some()
            || self.velocity_range.is_some()
            || self.probability.is_some()
            || self.duration.is_some()
            || self.transpose.is_some()
    }

    pub fn touches_audio(&self) -> bool {
        self.gain_db.is_some() || self.transpose.is_some()
    }

    /// Draw order per note: velocity, transpose, duration
    fn apply_to_note(&self, note: &mut Note, rng: &mut SeededRng) {
        if let Some((min, max)) = self.velocity {
            let jitter = rng.range(min, max);
            note.velocity = (note.velocity + jitter)
                .round()
                .clamp(VELOCITY_RANGE.0, VELOCITY_RANGE.1);
        }
        if let Some(range) = self.velocity_range {
            note.velocity_deviation =
                (note.velocity_deviation + range).clamp(DEVIATION_RANGE.0, DEVIATION_RANGE.1);
        }
        if let Some(probability) = self.probability {
            note.probability = (note.probability + probability).clamp(0.0, 1.0);
        }
        if let Some(transpose) = &self.transpose {
            let semitones = transpose.draw(rng).round();
            note.pitch = (note.pitch as f64 + semitones).clamp(0.0, 127.0) as u8;
        }
        if let Some((min, max)) = self.duration {
            let factor = rng.range(min, max);
            note.duration = (note.duration * factor).max(MIN_NOTE_DURATION);
        }
    }
}

/// Apply `mods` to every clip, in selection order
pub fn apply<H: Host + ?Sized>(
    host: &mut H,
    clips: &[ClipId],
    mods: &Modifications,
    rng: &mut SeededRng,
) -> Result<(), TransformError> {
    for id in clips {
        let snap = ClipSnapshot::read(host, id)?;
        match snap.kind {
            ClipKind::Midi => modify_notes(host, id, mods, rng)?,
            ClipKind::Audio => modify_audio(host, &snap, mods, rng)?,
        }
    }
    Ok(())
}

fn modify_notes<H: Host + ?Sized>(
    host: &mut H,
    clip: &ClipId,
    mods: &Modifications,
    rng: &mut SeededRng,
) -> Result<(), TransformError> {
    if !mods.touches_notes() {
        debug!("clip {}: no note modifications requested", clip);
        return Ok(());
    }
    let mut notes = host.get_notes(clip)?;
    if notes.is_empty() {
        debug!("clip {} has no notes", clip);
        return Ok(());
    }
    notes.sort_by_key(|n| n.id);
    for note in &mut notes {
        mods.apply_to_note(note, rng);
    }
    host.apply_note_modifications(clip, &notes)?;
    Ok(())
}

fn modify_audio<H: Host + ?Sized>(
    host: &mut H,
    clip: &ClipSnapshot,
    mods: &Modifications,
    rng: &mut SeededRng,
) -> Result<(), TransformError> {
    if !mods.touches_audio() {
        debug!("clip {}: no audio modifications requested", clip.id);
        return Ok(());
    }
    if let Some((min, max)) = mods.gain_db {
        let db = rng.range(min, max);
        let current = clip.gain.unwrap_or(1.0);
        let gain = (current * 10f64.powf(db / 20.0)).clamp(0.0, 10f64.powf(MAX_GAIN_DB / 20.0));
        host.set_clip_property(&clip.id, ClipProperty::Gain, PropertyValue::Number(gain))?;
    }
    if let Some(transpose) = &mods.transpose {
        let offset = transpose.draw(rng);
        let current = clip.pitch_coarse.unwrap_or(0.0) + clip.pitch_fine.unwrap_or(0.0) / 100.0;
        let total = (current + offset).clamp(COARSE_RANGE.0, COARSE_RANGE.1);
        let coarse = total.round();
        let fine = ((total - coarse) * 100.0)
            .round()
            .clamp(FINE_RANGE.0, FINE_RANGE.1);
        host.set_clip_property(
            &clip.id,
            ClipProperty::PitchCoarse,
            PropertyValue::Number(coarse),
        )?;
        host.set_clip_property(&clip.id, ClipProperty::PitchFine, PropertyValue::Number(fine))?;
    }
    Ok(())
}
