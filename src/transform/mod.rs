//! The arrangement clip transform engine.
//!
//! [`transform_clips`] locates clips, then runs modification, slicing,
//! splitting and shuffling in that order. Each stage that mutates the
//! timeline hands the next one a working set re-resolved from the host.

pub mod cut;
pub mod error;
pub mod locator;
pub mod modify;
pub mod random;
pub mod reveal;
pub mod shuffle;
pub mod slice;
pub mod split;

use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::host::{ClipId, Host};
use crate::notation::{parse_position_list, to_beats};

pub use error::TransformError;
use locator::{locate, Target};
use modify::Modifications;
use random::SeededRng;
use reveal::HoldingArea;

/// Caller parameters of a transform call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransformParams {
    /// Comma-separated clip ids
    pub clip_ids: Option<String>,
    pub arrangement_track_index: Option<usize>,
    /// `bar|beat` position
    pub arrangement_start: Option<String>,
    /// `bars:beats` duration
    pub arrangement_length: Option<String>,
    pub velocity_min: Option<f64>,
    pub velocity_max: Option<f64>,
    pub velocity_range: Option<f64>,
    pub probability: Option<f64>,
    pub duration_min: Option<f64>,
    pub duration_max: Option<f64>,
    pub gain_db_min: Option<f64>,
    pub gain_db_max: Option<f64>,
    pub transpose_min: Option<f64>,
    pub transpose_max: Option<f64>,
    /// Comma-separated semitone offsets
    pub transpose_values: Option<String>,
    /// `bars:beats` slice length
    pub slice: Option<String>,
    /// Comma-separated `bar|beat` positions
    pub split: Option<String>,
    pub shuffle_order: Option<bool>,
    pub seed: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResult {
    pub clip_ids: Vec<ClipId>,
    pub seed: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Non-fatal conditions collected during one call, also sent to the log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Warnings(Vec<String>);

impl Warnings {
    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.0.push(message);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// Seed used when the caller gives none
pub fn wall_clock_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

/// Drop ids that no longer resolve
fn refresh<H: Host + ?Sized>(host: &H, clips: Vec<ClipId>, warnings: &mut Warnings) -> Vec<ClipId> {
    clips
        .into_iter()
        .filter(|id| {
            let alive = host.clip_exists(id);
            if !alive {
                warnings.push(format!("clip {} disappeared during the transform", id));
            }
            alive
        })
        .collect()
}

/// Everything a call asks for, parsed before the first mutation
struct Plan {
    target: Target,
    modifications: Option<Modifications>,
    slice: Option<f64>,
    split: Option<Vec<f64>>,
    shuffle: bool,
    seed: u32,
}

impl Plan {
    fn parse<H: Host + ?Sized>(
        params: &TransformParams,
        host: &H,
        warnings: &mut Warnings,
    ) -> Result<Self, TransformError> {
        let sig = host.time_signature();
        let target = Target::from_params(params, sig, warnings)?;
        let modifications = Modifications::from_params(params, warnings)?;

        let slice = params
            .slice
            .as_deref()
            .map(|text| to_beats(text, sig))
            .transpose()?;
        if let Some(size) = slice {
            if size <= 0.0 {
                return Err(TransformError::validation("slice must be greater than 0"));
            }
        }

        let split = params
            .split
            .as_deref()
            .map(|text| parse_position_list(text, sig))
            .transpose()?;
        if matches!(&split, Some(positions) if positions.is_empty()) {
            return Err(TransformError::validation(
                "split requires at least one position",
            ));
        }

        Ok(Self {
            target,
            modifications,
            slice,
            split,
            shuffle: params.shuffle_order.unwrap_or(false),
            seed: params.seed.unwrap_or_else(wall_clock_seed),
        })
    }
}

/// Locate clips and apply the requested stages in their fixed order.
///
/// A failure part way through leaves earlier mutations in place.
pub fn transform_clips<H: Host + ?Sized>(
    params: &TransformParams,
    host: &mut H,
    config: &EngineConfig,
) -> Result<TransformResult, TransformError> {
    let mut warnings = Warnings::default();
    let plan = Plan::parse(params, host, &mut warnings)?;
    let mut rng = SeededRng::new(plan.seed);
    let mut area = HoldingArea::new(config);

    let mut clips = locate(host, &plan.target, &mut warnings)?;
    if clips.is_empty() {
        warnings.push("no clips matched; nothing to transform");
        return Ok(TransformResult {
            clip_ids: clips,
            seed: plan.seed,
            warnings: warnings.into_vec(),
        });
    }
    info!("transforming {} clips with seed {}", clips.len(), plan.seed);

    if let Some(mods) = &plan.modifications {
        modify::apply(host, &clips, mods, &mut rng)?;
        clips = refresh(host, clips, &mut warnings);
    }
    if let Some(size) = plan.slice {
        clips = slice::slice_clips(host, &clips, size, &mut area, config, &mut warnings)?;
        clips = refresh(host, clips, &mut warnings);
    }
    if let Some(positions) = &plan.split {
        clips = split::split_clips(host, &clips, positions, &mut area, config, &mut warnings)?;
        clips = refresh(host, clips, &mut warnings);
    }
    if plan.shuffle {
        clips = shuffle::shuffle_clips(host, &clips, &mut rng, &mut area, &mut warnings)?;
        clips = refresh(host, clips, &mut warnings);
    }

    Ok(TransformResult {
        clip_ids: clips,
        seed: plan.seed,
        warnings: warnings.into_vec(),
    })
}
