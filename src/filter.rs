//! Region, size and label policy applied to a frame's de-duplicated detections.
//!
//! Detections arrive normalized to `[0, 1]`. The filter maps them into policy space
//! (`0..=1000`, truncating) and keeps those that pass every rule of the current policy.

use serde::Serialize;

use crate::config::{PolicyConfig, Rect};
use crate::detect::Detection;
use crate::error::{FaultKind, PipelineFault};

const POLICY_SCALE: f32 = 1000.0;
const PERCENT_SCALE: f32 = 100.0;

/// A detection that passed the policy, in policy-space integer coordinates.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AcceptedDetection {
    pub label: String,
    /// Confidence in percent.
    pub c: u32,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    /// Capture time of the frame, shared by all detections of that frame.
    pub timestamp: u64,
    /// Unscaled model confidence.
    #[serde(skip)]
    pub confidence: f32,
}

impl AcceptedDetection {
    /// Box center in policy space.
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }
}

/// Stateless per call; built from a policy snapshot.
#[derive(Clone, Debug)]
pub struct FrameFilter {
    aoi: Rect,
    min_width: u32,
    min_height: u32,
    confidence: u32,
    ignore: Vec<String>,
}

impl FrameFilter {
    /// Fails with `FilterPolicyMissing` when the policy has no AOI or size rule.
    pub fn from_policy(policy: &PolicyConfig) -> Result<Self, PipelineFault> {
        let aoi = policy.aoi.ok_or_else(|| {
            PipelineFault::new(FaultKind::FilterPolicyMissing, "no aoi settings")
        })?;
        let (min_width, min_height) = policy.min_size().ok_or_else(|| {
            PipelineFault::new(FaultKind::FilterPolicyMissing, "no size settings")
        })?;
        Ok(Self {
            aoi,
            min_width,
            min_height,
            confidence: policy.confidence,
            ignore: policy.ignore.clone(),
        })
    }

    /// Keep the detections that pass every rule, stamped with `timestamp`.
    pub fn apply(&self, detections: Vec<Detection>, timestamp: u64) -> Vec<AcceptedDetection> {
        detections
            .into_iter()
            .map(|det| scale(det, timestamp))
            .filter(|det| self.accepts(det))
            .collect()
    }

    fn accepts(&self, det: &AcceptedDetection) -> bool {
        if det.c < self.confidence {
            return false;
        }
        let (cx, cy) = det.center();
        if cx < self.aoi.x1 || cx > self.aoi.x2 || cy < self.aoi.y1 || cy > self.aoi.y2 {
            return false;
        }
        if det.w < self.min_width || det.h < self.min_height {
            return false;
        }
        !self.ignore.iter().any(|label| label == &det.label)
    }
}

fn scale(det: Detection, timestamp: u64) -> AcceptedDetection {
    AcceptedDetection {
        c: (det.confidence * PERCENT_SCALE) as u32,
        x: (det.x * POLICY_SCALE) as u32,
        y: (det.y * POLICY_SCALE) as u32,
        w: (det.w * POLICY_SCALE) as u32,
        h: (det.h * POLICY_SCALE) as u32,
        timestamp,
        confidence: det.confidence,
        label: det.label,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::detect::{Suppressor, SyntheticBox, TensorDecoder, TensorEncoder};

    fn det(label: &str, confidence: f32, x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection {
            label: label.to_string(),
            confidence,
            x,
            y,
            w,
            h,
        }
    }

    fn permissive() -> PolicyConfig {
        PolicyConfig {
            aoi: Some(Rect {
                x1: 0,
                y1: 0,
                x2: 1000,
                y2: 1000,
            }),
            size: Some(Rect {
                x1: 0,
                y1: 0,
                x2: 0,
                y2: 0,
            }),
            confidence: 0,
            ignore: Vec::new(),
            ..PolicyConfig::default()
        }
    }

    #[test]
    fn rejects_center_outside_aoi_regardless_of_confidence() {
        let filter = FrameFilter::from_policy(&PolicyConfig::default()).unwrap();
        // x=0.04, w=0.02 -> center (50, 50) in policy space.
        let out = filter.apply(vec![det("Person", 0.99, 0.04, 0.04, 0.02, 0.02)], 7);
        assert!(out.is_empty());
    }

    #[test]
    fn accepts_center_on_aoi_edge() {
        let filter = FrameFilter::from_policy(&PolicyConfig::default()).unwrap();
        // x=93, w=15 -> center x = 93 + 7 = 100.
        let out = filter.apply(vec![det("Person", 0.9, 0.09375, 0.4, 0.015625, 0.2)], 7);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].center().0, 100);
    }

    #[test]
    fn scaling_truncates() {
        let filter = FrameFilter::from_policy(&permissive()).unwrap();
        let out = filter.apply(vec![det("Car", 0.8765, 0.1239, 0.5, 0.2501, 0.3)], 42);
        let d = &out[0];
        assert_eq!(d.c, 87);
        assert_eq!(d.x, 123);
        assert_eq!(d.w, 250);
        assert_eq!(d.timestamp, 42);
    }

    #[test]
    fn applies_confidence_size_and_ignore_rules() {
        let mut policy = permissive();
        policy.confidence = 50;
        policy.size = Some(Rect {
            x1: 100,
            y1: 100,
            x2: 200,
            y2: 250,
        });
        policy.ignore = vec!["Vest".to_string()];
        let filter = FrameFilter::from_policy(&policy).unwrap();

        let out = filter.apply(
            vec![
                det("Person", 0.49, 0.2, 0.2, 0.3, 0.3),
                det("Person", 0.9, 0.2, 0.2, 0.05, 0.3),
                det("Person", 0.9, 0.2, 0.2, 0.3, 0.1),
                det("Vest", 0.9, 0.2, 0.2, 0.3, 0.3),
                det("Person", 0.9, 0.2, 0.2, 0.3, 0.3),
            ],
            1,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "Person");
        assert_eq!(out[0].w, 300);
    }

    #[test]
    fn missing_aoi_or_size_is_policy_fault() {
        let mut policy = PolicyConfig::default();
        policy.aoi = None;
        let err = FrameFilter::from_policy(&policy).unwrap_err();
        assert_eq!(err.kind, FaultKind::FilterPolicyMissing);

        let mut policy = PolicyConfig::default();
        policy.size = None;
        let err = FrameFilter::from_policy(&policy).unwrap_err();
        assert_eq!(err.kind, FaultKind::FilterPolicyMissing);
    }

    #[test]
    fn permissive_policy_keeps_label_and_confidence() {
        let model = ModelConfig::for_tests(8, &["Person", "Helmet", "Vest"]);
        let boxes = [
            (0, 0.2, 0.3, 0.9),
            (1, 0.7, 0.3, 0.8),
            (2, 0.5, 0.8, 0.6),
        ];
        let scene: Vec<SyntheticBox> = boxes
            .iter()
            .map(|&(class_id, cx, cy, score)| SyntheticBox {
                class_id,
                cx,
                cy,
                w: 0.1,
                h: 0.1,
                objectness: 1.0,
                score,
            })
            .collect();
        let tensor = TensorEncoder::new(&model).encode(&scene);
        let candidates = TensorDecoder::new(&model).decode(&tensor).unwrap();
        let kept = Suppressor::new(model.nms_threshold).suppress(candidates);
        let detections: Vec<Detection> = kept.into_iter().map(|c| c.into_detection()).collect();

        let filter = FrameFilter::from_policy(&permissive()).unwrap();
        let accepted = filter.apply(detections.clone(), 0);
        assert_eq!(accepted.len(), detections.len());
        for (a, d) in accepted.iter().zip(&detections) {
            assert_eq!(a.label, d.label);
            assert_eq!(a.confidence, d.confidence);
        }
    }
}
