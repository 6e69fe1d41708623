//! Bar|beat and bar:beat notation.
//!
//! Positions are written `bar|beat` and are 1-based (`1|1` is the start of
//! the song). Durations are written `bars:beats` and are 0-based (`4:0` is
//! four bars). Beats on the numeric scale are always quarter notes, so the
//! length of one notated beat depends on the time signature denominator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Snap distance used when rendering values that are integral up to float noise
const SNAP: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("'{0}' is neither bar|beat nor bar:beat notation")]
    Unrecognized(String),
    #[error("invalid bar number in '{0}'")]
    InvalidBar(String),
    #[error("invalid beat value in '{0}'")]
    InvalidBeat(String),
    #[error("invalid time signature {0}/{1}")]
    InvalidTimeSignature(u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub fn new(numerator: u32, denominator: u32) -> Result<Self, FormatError> {
        if numerator == 0 || denominator == 0 || !denominator.is_power_of_two() {
            return Err(FormatError::InvalidTimeSignature(numerator, denominator));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Length of one notated beat in quarter notes
    pub fn beat_unit(&self) -> f64 {
        4.0 / self.denominator as f64
    }

    /// Length of one bar in quarter notes
    pub fn bar_length(&self) -> f64 {
        self.numerator as f64 * self.beat_unit()
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

/// Convert `bar|beat` or `bars:beats` text into quarter-note beats
pub fn to_beats(text: &str, sig: TimeSignature) -> Result<f64, FormatError> {
    let trimmed = text.trim();
    if let Some((bar, beat)) = trimmed.split_once('|') {
        let bar: i64 = bar
            .trim()
            .parse()
            .map_err(|_| FormatError::InvalidBar(trimmed.to_string()))?;
        let beat = parse_beat(beat, trimmed)?;
        if beat < 1.0 {
            return Err(FormatError::InvalidBeat(trimmed.to_string()));
        }
        Ok((bar - 1) as f64 * sig.bar_length() + (beat - 1.0) * sig.beat_unit())
    } else if let Some((bars, beats)) = trimmed.split_once(':') {
        let bars: u64 = bars
            .trim()
            .parse()
            .map_err(|_| FormatError::InvalidBar(trimmed.to_string()))?;
        let beats = parse_beat(beats, trimmed)?;
        if beats < 0.0 {
            return Err(FormatError::InvalidBeat(trimmed.to_string()));
        }
        Ok(bars as f64 * sig.bar_length() + beats * sig.beat_unit())
    } else {
        Err(FormatError::Unrecognized(trimmed.to_string()))
    }
}

fn parse_beat(text: &str, whole: &str) -> Result<f64, FormatError> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| FormatError::InvalidBeat(whole.to_string()))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FormatError::InvalidBeat(whole.to_string()))
    }
}

/// Render quarter-note beats as a `bar|beat` position
pub fn to_text(beats: f64, sig: TimeSignature) -> String {
    let (bar, beat) = split_units(beats, sig);
    format!("{}|{}", bar + 1, format_beat(beat + 1.0))
}

/// Render quarter-note beats as a `bars:beats` duration
pub fn to_duration_text(beats: f64, sig: TimeSignature) -> String {
    let (bars, beat) = split_units(beats.max(0.0), sig);
    format!("{}:{}", bars, format_beat(beat))
}

/// Parse a comma-separated list of `bar|beat` positions, skipping empty entries
pub fn parse_position_list(text: &str, sig: TimeSignature) -> Result<Vec<f64>, FormatError> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| to_beats(s, sig))
        .collect()
}

/// Split beats into whole bars and the remaining notated beats (0-based)
fn split_units(beats: f64, sig: TimeSignature) -> (i64, f64) {
    let mut units = beats / sig.beat_unit();
    if (units - units.round()).abs() < SNAP {
        units = units.round();
    }
    let per_bar = sig.numerator as f64;
    let bar = (units / per_bar).floor();
    let mut beat = units - bar * per_bar;
    if (beat - beat.round()).abs() < SNAP {
        beat = beat.round();
    }
    (bar as i64, beat)
}

fn format_beat(beat: f64) -> String {
    if beat == 0.0 {
        // avoids "-0"
        "0".to_string()
    } else {
        format!("{}", beat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn four_four() -> TimeSignature {
        TimeSignature::default()
    }

    #[test]
    fn parses_positions() {
        let sig = four_four();
        assert_eq!(to_beats("1|1", sig).unwrap(), 0.0);
        assert_eq!(to_beats("1|1.0", sig).unwrap(), 0.0);
        assert_eq!(to_beats("2|1", sig).unwrap(), 4.0);
        assert_eq!(to_beats(" 3|2.5 ", sig).unwrap(), 9.5);
    }

    #[test]
    fn parses_durations() {
        let sig = four_four();
        assert_eq!(to_beats("4:0.0", sig).unwrap(), 16.0);
        assert_eq!(to_beats("1:0", sig).unwrap(), 4.0);
        assert_eq!(to_beats("0:2", sig).unwrap(), 2.0);
    }

    #[test]
    fn respects_denominator() {
        let six_eight = TimeSignature::new(6, 8).unwrap();
        // a bar of 6/8 is three quarter notes
        assert_eq!(to_beats("2|1", six_eight).unwrap(), 3.0);
        assert_eq!(to_beats("1|3", six_eight).unwrap(), 1.0);
        assert_eq!(to_beats("1:0", six_eight).unwrap(), 3.0);
    }

    #[test]
    fn renders_text() {
        let sig = four_four();
        assert_eq!(to_text(0.0, sig), "1|1");
        assert_eq!(to_text(9.5, sig), "3|2.5");
        assert_eq!(to_duration_text(16.0, sig), "4:0");
        assert_eq!(to_duration_text(6.0, sig), "1:2");
    }

    #[test]
    fn round_trips_within_tolerance() {
        let sigs = [
            four_four(),
            TimeSignature::new(3, 4).unwrap(),
            TimeSignature::new(6, 8).unwrap(),
            TimeSignature::new(7, 16).unwrap(),
        ];
        for sig in sigs {
            for i in -40..200 {
                let x = i as f64 * 0.37;
                let back = to_beats(&to_text(x, sig), sig).unwrap();
                assert_abs_diff_eq!(back, x, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn integral_positions_round_trip_exactly() {
        let sig = TimeSignature::new(3, 4).unwrap();
        for bar in 1..20 {
            for beat in 1..=3 {
                let text = format!("{}|{}", bar, beat);
                assert_eq!(to_text(to_beats(&text, sig).unwrap(), sig), text);
            }
        }
    }

    #[test]
    fn rejects_malformed_notation() {
        let sig = four_four();
        assert!(matches!(to_beats("abc", sig), Err(FormatError::Unrecognized(_))));
        assert!(matches!(to_beats("x|1", sig), Err(FormatError::InvalidBar(_))));
        assert!(matches!(to_beats("1|y", sig), Err(FormatError::InvalidBeat(_))));
        assert!(matches!(to_beats("1|0", sig), Err(FormatError::InvalidBeat(_))));
        assert!(matches!(to_beats("-1:0", sig), Err(FormatError::InvalidBar(_))));
        assert!(matches!(to_beats("1|inf", sig), Err(FormatError::InvalidBeat(_))));
    }

    #[test]
    fn rejects_bad_time_signatures() {
        assert!(TimeSignature::new(0, 4).is_err());
        assert!(TimeSignature::new(4, 3).is_err());
        assert!(TimeSignature::new(5, 8).is_ok());
    }

    #[test]
    fn parses_position_lists() {
        let sig = four_four();
        let list = parse_position_list("1|3, 2|1,,3|1", sig).unwrap();
        assert_eq!(list, vec![2.0, 4.0, 8.0]);
        assert!(parse_position_list("1|3, nope", sig).is_err());
    }
}
