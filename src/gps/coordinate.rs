// src/gps/coordinate.rs
//! NMEA degrees+minutes coordinate decoding

use log::debug;
use std::fmt;
use thiserror::Error;

/// Which coordinate a token belongs to. Selects the width of the degree prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `DDMM.MMMMM`
    Latitude,
    /// `DDDMM.MMMMM`
    Longitude,
}

impl FieldKind {
    /// Number of leading characters holding whole degrees
    pub fn degree_width(self) -> usize {
        match self {
            FieldKind::Latitude => 2,
            FieldKind::Longitude => 3,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Latitude => write!(f, "latitude"),
            FieldKind::Longitude => write!(f, "longitude"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "N" => Some(Hemisphere::North),
            "S" => Some(Hemisphere::South),
            "E" => Some(Hemisphere::East),
            "W" => Some(Hemisphere::West),
            _ => None,
        }
    }

    /// Multiplier applied to the unsigned decimal value
    pub fn sign(self) -> f64 {
        match self {
            Hemisphere::North | Hemisphere::East => 1.0,
            Hemisphere::South | Hemisphere::West => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty coordinate or hemisphere")]
    EmptyInput,

    #[error("error parsing degrees from {0:?}")]
    DegreeParseError(String),

    #[error("error parsing minutes from {0:?}")]
    MinutesParseError(String),
}

/// Convert a `DDMM.MMMMM` / `DDDMM.MMMMM` token into signed decimal degrees.
///
/// `S` and `W` negate the result. Any other hemisphere value, known or not,
/// leaves the value positive.
pub fn decode(token: &str, hemisphere: &str, kind: FieldKind) -> Result<f64, DecodeError> {
    if token.is_empty() || hemisphere.is_empty() {
        return Err(DecodeError::EmptyInput);
    }

    let width = kind.degree_width();
    let (degree_part, minutes_part) = match (token.get(..width), token.get(width..)) {
        (Some(d), Some(m)) => (d, m),
        _ => return Err(DecodeError::DegreeParseError(token.to_string())),
    };

    let degrees = parse_degrees(degree_part)
        .ok_or_else(|| DecodeError::DegreeParseError(degree_part.to_string()))?;
    let minutes = parse_minutes(minutes_part)
        .ok_or_else(|| DecodeError::MinutesParseError(minutes_part.to_string()))?;

    let value = degrees + minutes / 60.0;

    match Hemisphere::from_letter(hemisphere) {
        Some(h) => Ok(value * h.sign()),
        None => {
            debug!("Unknown hemisphere {:?} for {} {}, keeping sign", hemisphere, kind, token);
            Ok(value)
        }
    }
}

fn parse_degrees(s: &str) -> Option<f64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u16>().ok().map(f64::from)
}

/// `MM` or `MM.mmm`; f64::from_str alone would also take signs, exponents and "inf"
fn parse_minutes(s: &str) -> Option<f64> {
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());

    let valid = match s.split_once('.') {
        Some((whole, frac)) => all_digits(whole) && all_digits(frac),
        None => all_digits(s),
    };
    if !valid {
        return None;
    }
    s.parse::<f64>().ok()
}
