// src/lib.rs
//! GPS Relay Library
//!
//! Decodes GPGLL position fixes from NMEA-0183 text and republishes valid
//! fixes to subscribers as `"<latitude>/<longitude>"` messages.

pub mod config;
pub mod display;
pub mod error;
pub mod gps;
pub mod pipeline;
pub mod publish;
pub mod source;

// Re-export main types for convenience
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use gps::{Fix, Position, Rejection};
pub use pipeline::{IngestStats, Pipeline, PipelineEvent};
pub use publish::{ConsoleSink, FixSink, TcpPublisher};
pub use source::{LineSource, ReaderLineSource, SerialLineSource};
