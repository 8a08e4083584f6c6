// src/display/mod.rs
//! Live relay status, built from pipeline events

pub mod terminal;

use crate::{
    gps::Position,
    pipeline::{PipelineEvent, RejectionEvent},
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Rejections kept for display
const RECENT_REJECTIONS: usize = 5;

#[derive(Debug, Clone)]
pub struct RelayStatus {
    pub started: DateTime<Utc>,
    pub last_update: Option<DateTime<Utc>>,
    pub last_position: Option<Position>,
    pub last_message: Option<String>,
    pub published: u64,
    pub rejected: BTreeMap<&'static str, u64>,
    pub recent_rejections: Vec<RejectionEvent>,
}

impl Default for RelayStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayStatus {
    pub fn new() -> Self {
        Self {
            started: Utc::now(),
            last_update: None,
            last_position: None,
            last_message: None,
            published: 0,
            rejected: BTreeMap::new(),
            recent_rejections: Vec::new(),
        }
    }

    pub fn apply(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Published { position, message, at } => {
                self.published += 1;
                self.last_position = Some(position);
                self.last_message = Some(message);
                self.last_update = Some(at);
            }
            PipelineEvent::Rejected(rejection) => {
                *self.rejected.entry(rejection.reason.kind()).or_insert(0) += 1;
                self.last_update = Some(rejection.at);
                self.recent_rejections.push(rejection);

                if self.recent_rejections.len() > RECENT_REJECTIONS {
                    self.recent_rejections.remove(0);
                }
            }
        }
    }

    pub fn rejected_total(&self) -> u64 {
        self.rejected.values().sum()
    }

    pub fn rejected_count(&self, kind: &str) -> u64 {
        self.rejected.get(kind).copied().unwrap_or(0)
    }

    /// Seconds since the last fix was published
    pub fn fix_age_seconds(&self) -> Option<i64> {
        match (self.last_position, self.last_update) {
            (Some(_), Some(ts)) => Some(Utc::now().signed_duration_since(ts).num_seconds()),
            _ => None,
        }
    }

    /// Format coordinate for display
    pub fn format_coordinate(coord: Option<f64>) -> String {
        match coord {
            Some(val) => format!("{:>12.6}°", val),
            None => "No fix".to_string(),
        }
    }
}
