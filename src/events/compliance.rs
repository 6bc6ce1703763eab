//! Rolling-window compliance signals (e.g. persons without helmets).
//!
//! Each tracked label keeps a ring buffer of per-frame counts. The smoothed value of a
//! series is `(sum + 1) / window` with integer division, which rounds towards zero
//! except for the `+ 1`. Thresholds downstream are tuned against this exact value.

use crate::config::ComplianceSettings;
use crate::events::Transition;

pub const MIN_WINDOW: usize = 5;
pub const MAX_WINDOW: usize = 50;

pub fn clamp_window(requested: u32) -> usize {
    (requested as usize).clamp(MIN_WINDOW, MAX_WINDOW)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComplianceState {
    Compliant,
    NonCompliant,
}

/// Fixed-size ring of per-frame counts.
#[derive(Clone, Debug)]
struct CountRing {
    label: String,
    counts: Vec<u32>,
}

impl CountRing {
    fn new(label: &str, window: usize) -> Self {
        Self {
            label: label.to_string(),
            counts: vec![0; window],
        }
    }

    fn clear(&mut self, window: usize) {
        self.counts.clear();
        self.counts.resize(window, 0);
    }

    fn majority(&self) -> u32 {
        let sum: u32 = self.counts.iter().sum();
        (sum + 1) / self.counts.len() as u32
    }
}

#[derive(Clone, Debug)]
struct Requirement {
    ring: CountRing,
    event: String,
    state: ComplianceState,
}

#[derive(Clone, Debug)]
pub struct ComplianceSmoother {
    subject: CountRing,
    requirements: Vec<Requirement>,
    index: usize,
    window: usize,
}

impl ComplianceSmoother {
    pub fn new(settings: &ComplianceSettings, window: usize) -> Self {
        let window = window.clamp(MIN_WINDOW, MAX_WINDOW);
        Self {
            subject: CountRing::new(&settings.subject, window),
            requirements: settings
                .requirements
                .iter()
                .map(|req| Requirement {
                    ring: CountRing::new(&req.label, window),
                    event: req.event.clone(),
                    state: ComplianceState::Compliant,
                })
                .collect(),
            index: 0,
            window,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Record one frame's labels and return compliance state changes.
    pub fn update<'a, I>(&mut self, labels: I) -> Vec<Transition>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut subject_count = 0u32;
        let mut counts = vec![0u32; self.requirements.len()];
        for label in labels {
            if label == self.subject.label {
                subject_count += 1;
            }
            for (count, req) in counts.iter_mut().zip(&self.requirements) {
                if label == req.ring.label {
                    *count += 1;
                }
            }
        }

        self.subject.counts[self.index] = subject_count;
        for (req, count) in self.requirements.iter_mut().zip(counts) {
            req.ring.counts[self.index] = count;
        }
        self.index = (self.index + 1) % self.window;

        let subjects = self.subject.majority();
        let mut transitions = Vec::new();
        for req in &mut self.requirements {
            let accessories = req.ring.majority();
            let next = if subjects != 0 && accessories < subjects {
                ComplianceState::NonCompliant
            } else {
                ComplianceState::Compliant
            };
            if next != req.state {
                req.state = next;
                let transition = match next {
                    ComplianceState::NonCompliant => Transition::high(req.event.clone()),
                    ComplianceState::Compliant => Transition::low(req.event.clone()),
                };
                log::info!(
                    "compliance {} {:?} (subjects={}, {}={})",
                    req.event,
                    next,
                    subjects,
                    req.ring.label,
                    accessories
                );
                transitions.push(transition);
            }
        }
        transitions
    }

    /// Resize the rings for a new window and clear all counts and states.
    ///
    /// Returns a low transition for every requirement that was non-compliant.
    pub fn reset(&mut self, window: usize) -> Vec<Transition> {
        let lows = self
            .requirements
            .iter()
            .filter(|req| req.state == ComplianceState::NonCompliant)
            .map(|req| Transition::low(req.event.clone()))
            .collect();
        let window = window.clamp(MIN_WINDOW, MAX_WINDOW);
        self.subject.clear(window);
        for req in &mut self.requirements {
            req.ring.clear(window);
            req.state = ComplianceState::Compliant;
        }
        self.index = 0;
        self.window = window;
        lows
    }

    pub fn state(&self, event: &str) -> Option<ComplianceState> {
        self.requirements
            .iter()
            .find(|req| req.event == event)
            .map(|req| req.state)
    }

    /// Smoothed subject count over the window.
    pub fn subject_majority(&self) -> u32 {
        self.subject.majority()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Level;

    fn smoother(window: usize) -> ComplianceSmoother {
        ComplianceSmoother::new(&ComplianceSettings::default(), window)
    }

    #[test]
    fn window_is_clamped() {
        assert_eq!(smoother(1).window(), MIN_WINDOW);
        assert_eq!(smoother(500).window(), MAX_WINDOW);
        assert_eq!(clamp_window(20), 20);
    }

    #[test]
    fn person_without_helmet_becomes_non_compliant() {
        let mut s = smoother(5);
        let mut fired = Vec::new();
        for _ in 0..5 {
            fired.extend(s.update(["Person"]));
        }
        // Majority subject = (5 + 1) / 5 = 1, helmets = (0 + 1) / 5 = 0.
        assert_eq!(s.subject_majority(), 1);
        assert_eq!(s.state("NoHelmet"), Some(ComplianceState::NonCompliant));
        assert_eq!(s.state("NoVest"), Some(ComplianceState::NonCompliant));
        let helmet: Vec<_> = fired.iter().filter(|t| t.name == "NoHelmet").collect();
        assert_eq!(helmet.len(), 1);
        assert_eq!(helmet[0].level, Level::High);
    }

    #[test]
    fn majority_uses_truncating_division() {
        let mut s = smoother(5);
        // Three frames of one person: (3 + 1) / 5 = 0, still no subject.
        for _ in 0..3 {
            assert!(s.update(["Person"]).is_empty());
        }
        assert_eq!(s.subject_majority(), 0);
        // Fourth frame: (4 + 1) / 5 = 1.
        let fired = s.update(["Person"]);
        assert_eq!(fired.len(), 2);
    }

    #[test]
    fn equipped_subject_stays_compliant() {
        let mut s = smoother(5);
        for _ in 0..10 {
            assert!(s.update(["Person", "Helmet", "Vest"]).is_empty());
        }
        assert_eq!(s.state("NoHelmet"), Some(ComplianceState::Compliant));
    }

    #[test]
    fn subject_leaving_forces_compliant() {
        let mut s = smoother(5);
        for _ in 0..5 {
            s.update(["Person", "Vest"]);
        }
        assert_eq!(s.state("NoHelmet"), Some(ComplianceState::NonCompliant));
        assert_eq!(s.state("NoVest"), Some(ComplianceState::Compliant));

        let mut fired = Vec::new();
        for _ in 0..5 {
            fired.extend(s.update(std::iter::empty()));
        }
        assert_eq!(fired, vec![Transition::low("NoHelmet")]);
    }

    #[test]
    fn slots_are_overwritten_not_accumulated() {
        let mut s = smoother(5);
        for _ in 0..20 {
            s.update(["Person"]);
        }
        assert_eq!(s.subject_majority(), 1);
    }

    #[test]
    fn reset_resizes_and_reports_lows() {
        let mut s = smoother(5);
        for _ in 0..5 {
            s.update(["Person"]);
        }
        let lows = s.reset(10);
        assert_eq!(lows.len(), 2);
        assert!(lows.iter().all(|t| t.level == Level::Low));
        assert_eq!(s.window(), 10);
        assert_eq!(s.subject_majority(), 0);
        assert_eq!(s.state("NoHelmet"), Some(ComplianceState::Compliant));
    }

    #[test]
    fn reset_keeps_configured_labels() {
        let settings = ComplianceSettings {
            enabled: true,
            subject: "Worker".to_string(),
            requirements: vec![crate::config::ComplianceRequirement {
                label: "Gloves".to_string(),
                event: "NoGloves".to_string(),
            }],
        };
        let mut s = ComplianceSmoother::new(&settings, 5);
        for _ in 0..5 {
            s.update(["Worker"]);
        }
        assert_eq!(s.reset(6), vec![Transition::low("NoGloves")]);

        let mut fired = Vec::new();
        for _ in 0..6 {
            fired.extend(s.update(["Worker"]));
        }
        assert_eq!(fired, vec![Transition::high("NoGloves")]);
        assert_eq!(s.state("NoHelmet"), None);
    }
}
