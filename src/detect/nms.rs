//! Greedy non-maximum suppression.

use crate::detect::result::Candidate;

/// Intersection-over-union of two center-form boxes.
///
/// Non-overlapping boxes give 0. A zero union (degenerate boxes) is treated as no overlap.
pub fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let left = (a.cx - a.w / 2.0).max(b.cx - b.w / 2.0);
    let top = (a.cy - a.h / 2.0).max(b.cy - b.h / 2.0);
    let right = (a.cx + a.w / 2.0).min(b.cx + b.w / 2.0);
    let bottom = (a.cy + a.h / 2.0).min(b.cy + b.h / 2.0);

    let inter = (right - left).max(0.0) * (bottom - top).max(0.0);
    let union = a.area() + b.area() - inter;
    if union <= 0.0 || !union.is_finite() {
        return 0.0;
    }
    inter / union
}

/// Removes lower-confidence duplicates among one frame's candidates.
///
/// Candidates are visited in decode order, not confidence order, so the outcome can
/// depend on the order the model emitted boxes. Once a candidate loses a comparison it
/// stops suppressing; boxes it already suppressed stay suppressed.
#[derive(Clone, Copy, Debug)]
pub struct Suppressor {
    iou_threshold: f32,
}

impl Suppressor {
    pub fn new(iou_threshold: f32) -> Self {
        Self { iou_threshold }
    }

    pub fn suppress(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        if candidates.len() < 2 {
            return candidates;
        }

        let mut keep = vec![true; candidates.len()];
        for i in 0..candidates.len() {
            if !keep[i] {
                continue;
            }
            for j in (i + 1)..candidates.len() {
                if !keep[j] {
                    continue;
                }
                if iou(&candidates[i], &candidates[j]) > self.iou_threshold {
                    if candidates[i].confidence > candidates[j].confidence {
                        keep[j] = false;
                    } else {
                        keep[i] = false;
                        break;
                    }
                }
            }
        }

        candidates
            .into_iter()
            .zip(keep)
            .filter_map(|(cand, kept)| kept.then_some(cand))
            .collect()
    }
}
