use std::collections::{BTreeMap, BTreeSet};

use crate::config::PolicyConfig;
use crate::events::Transition;

/// Debounce parameters in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebounceTiming {
    /// Continuous presence required before an event goes high.
    pub stabilize_delay_ms: u64,
    /// Continuous absence required before an active event goes low.
    pub min_hold_ms: u64,
}

impl DebounceTiming {
    pub fn from_policy(policy: &PolicyConfig) -> Self {
        Self {
            stabilize_delay_ms: policy.stabilize_transition_ms,
            min_hold_ms: policy.min_event_duration_ms,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelState {
    Idle,
    Pending,
    Active,
}

/// Per-label timers. Created on first sighting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTimerState {
    pub first_seen_at: Option<u64>,
    pub last_seen_at: Option<u64>,
    pub active: bool,
}

impl LabelTimerState {
    pub fn state(&self) -> LabelState {
        if self.active {
            LabelState::Active
        } else if self.first_seen_at.is_some() {
            LabelState::Pending
        } else {
            LabelState::Idle
        }
    }
}

/// Converts per-frame label presence into onset-delayed, hold-extended events.
///
/// Each label runs an independent `Idle -> Pending -> Active -> Idle` machine. An event
/// is reported once per level change; an active label never re-fires high.
#[derive(Clone, Debug)]
pub struct EventDebouncer {
    timing: DebounceTiming,
    labels: BTreeMap<String, LabelTimerState>,
}

impl EventDebouncer {
    pub fn new(timing: DebounceTiming) -> Self {
        Self {
            timing,
            labels: BTreeMap::new(),
        }
    }

    pub fn timing(&self) -> DebounceTiming {
        self.timing
    }

    pub fn set_timing(&mut self, timing: DebounceTiming) {
        self.timing = timing;
    }

    /// Advance all label machines to `now` given the labels present in this frame.
    pub fn update<'a, I>(&mut self, present: I, now: u64) -> Vec<Transition>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: BTreeSet<&str> = present.into_iter().collect();
        let mut transitions = Vec::new();

        for &label in &present {
            let timer = self.labels.entry(label.to_string()).or_default();
            if !timer.active {
                let first = *timer.first_seen_at.get_or_insert(now);
                if now.saturating_sub(first) >= self.timing.stabilize_delay_ms {
                    timer.active = true;
                    timer.first_seen_at = None;
                    log::info!("event {} high", label);
                    transitions.push(Transition::high(label));
                }
            }
            timer.last_seen_at = Some(now);
        }

        for (label, timer) in self.labels.iter_mut() {
            if present.contains(label.as_str()) {
                continue;
            }
            if !timer.active {
                // Onset must be continuous; any missed frame restarts it.
                if timer.first_seen_at.take().is_some() {
                    log::debug!("pending onset for {} interrupted", label);
                }
                continue;
            }
            let Some(last_seen) = timer.last_seen_at else {
                continue;
            };
            if now.saturating_sub(last_seen) > self.timing.min_hold_ms {
                timer.active = false;
                log::info!("event {} low", label);
                transitions.push(Transition::low(label.clone()));
            }
        }

        transitions
    }

    /// Clear all label state. Returns a low transition for every label that was active.
    pub fn reset(&mut self) -> Vec<Transition> {
        let lows = self
            .labels
            .iter()
            .filter(|(_, timer)| timer.active)
            .map(|(label, _)| Transition::low(label.clone()))
            .collect();
        self.labels.clear();
        lows
    }

    pub fn state(&self, label: &str) -> LabelState {
        self.labels
            .get(label)
            .map(LabelTimerState::state)
            .unwrap_or(LabelState::Idle)
    }

    pub fn active_labels(&self) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .filter(|(_, timer)| timer.active)
            .map(|(label, _)| label.as_str())
    }
}
