//! Temporal smoothing of per-frame detections into edge-triggered events.
//!
//! - `debounce`: per-label hysteresis (onset delay, hold time).
//! - `compliance`: rolling-window majority over subject/accessory counts.
//! - `sink`: where state changes are published.

pub mod compliance;
pub mod debounce;
pub mod sink;

use serde::Serialize;

pub use compliance::{ComplianceSmoother, ComplianceState};
pub use debounce::{DebounceTiming, EventDebouncer, LabelState, LabelTimerState};
pub use sink::{EventSink, JsonLinesSink, LogSink, RecordingSink};

/// Event level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    Low,
}

/// A state change of one named event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub name: String,
    pub level: Level,
}

impl Transition {
    pub fn high(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: Level::High,
        }
    }

    pub fn low(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: Level::Low,
        }
    }
}
