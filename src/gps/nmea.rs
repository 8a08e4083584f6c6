// src/gps/nmea.rs
//! GPGLL sentence parsing

use super::coordinate::{decode, DecodeError, FieldKind};
use super::data::{Fix, Position};
use log::{debug, warn};
use thiserror::Error;

/// Talker + sentence identifier of the only sentence we decode
pub const GPGLL_PREFIX: &str = "$GPGLL";

/// `$GPGLL,lat,latDir,lon,lonDir,time,status[,checksum]`
const MIN_FIELDS: usize = 7;
const STATUS_FIELD: usize = 6;
const STATUS_ACTIVE: &str = "A";

/// Why a sentence produced no fix
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("malformed GPGLL sentence ({fields} fields)")]
    MalformedSentence { fields: usize },

    #[error("void fix (status {status:?})")]
    VoidFix { status: String },

    #[error("invalid {field}: {source}")]
    CoordinateDecode {
        field: FieldKind,
        #[source]
        source: DecodeError,
    },
}

impl Rejection {
    /// Short stable name, used for counters
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::MalformedSentence { .. } => "malformed",
            Rejection::VoidFix { .. } => "void",
            Rejection::CoordinateDecode { .. } => "decode",
        }
    }
}

/// Check whether a trimmed line is a GPGLL sentence
pub fn is_gpgll(line: &str) -> bool {
    line.starts_with(GPGLL_PREFIX)
}

/// Parse a GPGLL sentence into a position, or say why it was rejected
pub fn parse_gpgll(sentence: &str) -> Result<Position, Rejection> {
    let parts: Vec<&str> = sentence.split(',').collect();

    if parts.len() < MIN_FIELDS {
        return Err(Rejection::MalformedSentence { fields: parts.len() });
    }

    let status = parts[STATUS_FIELD];
    if status != STATUS_ACTIVE {
        return Err(Rejection::VoidFix {
            status: status.to_string(),
        });
    }

    let latitude = decode_field(parts[1], parts[2], FieldKind::Latitude)?;
    let longitude = decode_field(parts[3], parts[4], FieldKind::Longitude)?;

    Ok(Position::new(latitude, longitude))
}

fn decode_field(token: &str, hemisphere: &str, field: FieldKind) -> Result<f64, Rejection> {
    decode(token, hemisphere, field).map_err(|source| Rejection::CoordinateDecode { field, source })
}

/// Parse a sentence into a tagged fix, logging the reason for any rejection
pub fn parse(sentence: &str) -> Fix {
    let result = parse_gpgll(sentence);
    if let Err(reason) = &result {
        log_rejection(sentence, reason);
    }
    Fix::from(result)
}

/// Void fixes are routine before satellite lock; everything else hints at
/// corrupt receiver output.
pub fn log_rejection(sentence: &str, reason: &Rejection) {
    match reason {
        Rejection::VoidFix { .. } => debug!("Invalid GPGLL sentence: {} ({})", sentence, reason),
        _ => warn!("Rejected GPGLL sentence: {} ({})", sentence, reason),
    }
}
