// src/gps/data.rs
//! Position fix structures and wire formatting

use serde::{Deserialize, Serialize};
use std::fmt;

/// A fully decoded position in signed decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check that both values lie on the globe
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Wire encoding published to subscribers: `"<lat>/<lon>"`
    pub fn to_message(&self) -> String {
        format_fix(self.latitude, self.longitude)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Latitude: {:.6}, Longitude: {:.6}", self.latitude, self.longitude)
    }
}

/// Outcome of parsing one sentence.
///
/// Invalid fixes always carry zeroes and must never be published.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Fix {
    pub valid: bool,
    pub latitude: f64,
    pub longitude: f64,
}

impl Fix {
    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Option<Position> {
        self.valid.then(|| Position::new(self.latitude, self.longitude))
    }
}

impl From<Position> for Fix {
    fn from(position: Position) -> Self {
        Self {
            valid: true,
            latitude: position.latitude,
            longitude: position.longitude,
        }
    }
}

impl<E> From<Result<Position, E>> for Fix {
    fn from(result: Result<Position, E>) -> Self {
        match result {
            Ok(position) => position.into(),
            Err(_) => Fix::invalid(),
        }
    }
}

/// Format a coordinate pair with 6 fractional digits each
pub fn format_fix(latitude: f64, longitude: f64) -> String {
    format!("{:.6}/{:.6}", latitude, longitude)
}
