// src/gps/mod.rs
//! GPGLL decoding: coordinate conversion and sentence validation

pub mod coordinate;
pub mod data;
pub mod nmea;

pub use coordinate::{decode, DecodeError, FieldKind, Hemisphere};
pub use data::{format_fix, Fix, Position};
pub use nmea::{parse, parse_gpgll, Rejection};
