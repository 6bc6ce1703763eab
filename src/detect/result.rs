use serde::Serialize;

/// Label used when a class index has no entry in the label table.
pub const FALLBACK_LABEL: &str = "Undefined";

/// Raw detection candidate in center form (normalized 0..1 coordinates).
///
/// The decoder clamps every box into the frame before producing a candidate, so
/// `cx ± w/2` and `cy ± h/2` always lie inside `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub label: String,
    pub confidence: f32,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl Candidate {
    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// Convert to the top-left form used downstream.
    pub fn into_detection(self) -> Detection {
        let x = (self.cx - self.w / 2.0).max(0.0);
        let y = (self.cy - self.h / 2.0).max(0.0);
        Detection {
            label: self.label,
            confidence: self.confidence,
            x,
            y,
            w: self.w.min(1.0 - x),
            h: self.h.min(1.0 - y),
        }
    }
}

/// A de-duplicated detection for one frame. Box is top-left + size, normalized.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    #[serde(rename = "c")]
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_converts_to_top_left_inside_frame() {
        let cand = Candidate {
            label: "Person".to_string(),
            confidence: 0.8,
            cx: 0.5,
            cy: 0.25,
            w: 0.2,
            h: 0.5,
        };
        let det = cand.into_detection();
        assert!((det.x - 0.4).abs() < 1e-6);
        assert!(det.y.abs() < 1e-6);
        assert!(det.x + det.w <= 1.0);
        assert!(det.y + det.h <= 1.0);
        assert_eq!(det.label, "Person");
    }
}
