//! Quantized output tensor decoding.
//!
//! The model emits `boxes` fixed-stride records of `5 + classes` bytes:
//! `[cx, cy, w, h, objectness, score_0 .. score_{classes-1}]`, each an affine-quantized
//! byte. Box geometry is center form, normalized to the model input.

use crate::config::ModelConfig;
use crate::detect::result::{Candidate, FALLBACK_LABEL};
use crate::error::DecodeError;

/// Geometry + objectness fields per box record.
pub const BOX_FIELDS: usize = 5;

/// Per-frame candidate ceiling. A frame above this is treated as corrupt.
pub const MAX_CANDIDATES: usize = 500;

const OBJECTNESS_FIELD: usize = 4;

/// Affine quantization parameters: `real = (byte - zero_point) * scale`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quantization {
    pub scale: f32,
    pub zero_point: f32,
}

impl Quantization {
    pub fn new(scale: f32, zero_point: f32) -> Self {
        Self { scale, zero_point }
    }

    #[inline]
    pub fn dequantize(&self, raw: u8) -> f32 {
        (raw as f32 - self.zero_point) * self.scale
    }

    /// Nearest byte for a real value, saturating at the byte range.
    pub fn quantize(&self, value: f32) -> u8 {
        (value / self.scale + self.zero_point)
            .round()
            .clamp(0.0, 255.0) as u8
    }
}

/// Turns a raw output tensor into detection candidates. Pure function of buffer + config.
#[derive(Clone, Debug)]
pub struct TensorDecoder {
    boxes: usize,
    classes: usize,
    quant: Quantization,
    objectness_threshold: f32,
    confidence_threshold: f32,
    labels: Vec<String>,
    max_candidates: usize,
}

impl TensorDecoder {
    pub fn new(model: &ModelConfig) -> Self {
        Self {
            boxes: model.boxes,
            classes: model.classes,
            quant: model.quantization,
            objectness_threshold: model.objectness_threshold,
            confidence_threshold: model.confidence_threshold,
            labels: model.labels.clone(),
            max_candidates: MAX_CANDIDATES,
        }
    }

    pub fn with_max_candidates(mut self, limit: usize) -> Self {
        self.max_candidates = limit;
        self
    }

    /// Bytes per box record.
    pub fn stride(&self) -> usize {
        BOX_FIELDS + self.classes
    }

    pub fn expected_len(&self) -> usize {
        self.boxes * self.stride()
    }

    pub fn decode(&self, tensor: &[u8]) -> Result<Vec<Candidate>, DecodeError> {
        let expected = self.expected_len();
        if tensor.len() != expected {
            return Err(DecodeError::Length {
                expected,
                actual: tensor.len(),
            });
        }

        let mut candidates = Vec::new();
        for record in tensor.chunks_exact(self.stride()) {
            if let Some(candidate) = self.decode_record(record) {
                candidates.push(candidate);
            }
        }

        if candidates.len() > self.max_candidates {
            return Err(DecodeError::Overflow {
                count: candidates.len(),
                limit: self.max_candidates,
            });
        }
        Ok(candidates)
    }

    fn decode_record(&self, record: &[u8]) -> Option<Candidate> {
        let q = &self.quant;
        let objectness = q.dequantize(record[OBJECTNESS_FIELD]);
        if !(objectness >= self.objectness_threshold) {
            return None;
        }

        // First maximum wins on ties.
        let mut best: Option<(usize, f32)> = None;
        for (class_id, &raw) in record[BOX_FIELDS..].iter().enumerate() {
            let confidence = q.dequantize(raw) * objectness;
            if best.map_or(true, |(_, max)| confidence > max) {
                best = Some((class_id, confidence));
            }
        }
        let (class_id, max_confidence) = best?;
        if !(max_confidence > self.confidence_threshold) {
            return None;
        }

        let cx = q.dequantize(record[0]);
        let cy = q.dequantize(record[1]);
        let w = q.dequantize(record[2]);
        let h = q.dequantize(record[3]);

        let x0 = (cx - w / 2.0).max(0.0);
        let y0 = (cy - h / 2.0).max(0.0);
        let x1 = (cx + w / 2.0).min(1.0);
        let y1 = (cy + h / 2.0).min(1.0);
        if !(x1 > x0 && y1 > y0) {
            return None;
        }

        let label = self
            .labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| FALLBACK_LABEL.to_string());

        Some(Candidate {
            label,
            confidence: max_confidence,
            cx: (x0 + x1) / 2.0,
            cy: (y0 + y1) / 2.0,
            w: x1 - x0,
            h: y1 - y0,
        })
    }
}

/// Box written by `TensorEncoder`, in real (dequantized) units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyntheticBox {
    pub class_id: usize,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub objectness: f32,
    pub score: f32,
}

/// Builds output tensors in the decoder's layout. Slots without a box encode zero.
#[derive(Clone, Debug)]
pub struct TensorEncoder {
    boxes: usize,
    classes: usize,
    quant: Quantization,
}

impl TensorEncoder {
    pub fn new(model: &ModelConfig) -> Self {
        Self {
            boxes: model.boxes,
            classes: model.classes,
            quant: model.quantization,
        }
    }

    /// Encode up to `boxes` records; extra records are dropped.
    pub fn encode(&self, records: &[SyntheticBox]) -> Vec<u8> {
        let stride = BOX_FIELDS + self.classes;
        let zero = self.quant.quantize(0.0);
        let mut tensor = vec![zero; self.boxes * stride];
        for (slot, rec) in tensor.chunks_exact_mut(stride).zip(records) {
            slot[0] = self.quant.quantize(rec.cx);
            slot[1] = self.quant.quantize(rec.cy);
            slot[2] = self.quant.quantize(rec.w);
            slot[3] = self.quant.quantize(rec.h);
            slot[OBJECTNESS_FIELD] = self.quant.quantize(rec.objectness);
            if rec.class_id < self.classes {
                slot[BOX_FIELDS + rec.class_id] = self.quant.quantize(rec.score);
            }
        }
        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;

    fn model(boxes: usize, labels: &[&str]) -> ModelConfig {
        let mut model = ModelConfig::for_tests(boxes, labels);
        model.quantization = Quantization::new(1.0 / 255.0, 0.0);
        model.objectness_threshold = 0.25;
        model.confidence_threshold = 0.30;
        model
    }

    fn record(class_id: usize, cx: f32, cy: f32, objectness: f32, score: f32) -> SyntheticBox {
        SyntheticBox {
            class_id,
            cx,
            cy,
            w: 0.2,
            h: 0.2,
            objectness,
            score,
        }
    }

    #[test]
    fn dequantizes_with_zero_point() {
        let q = Quantization::new(0.5, 10.0);
        assert_eq!(q.dequantize(14), 2.0);
        assert_eq!(q.dequantize(10), 0.0);
        assert_eq!(q.dequantize(6), -2.0);
    }

    #[test]
    fn rejects_tensor_of_wrong_length() {
        let m = model(4, &["Person", "Helmet"]);
        let decoder = TensorDecoder::new(&m);
        let err = decoder.decode(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Length {
                expected: 28,
                actual: 10
            }
        );
    }

    #[test]
    fn objectness_gate_skips_box() {
        let m = model(2, &["Person"]);
        let tensor = TensorEncoder::new(&m).encode(&[record(0, 0.5, 0.5, 0.1, 1.0)]);
        assert!(TensorDecoder::new(&m).decode(&tensor).unwrap().is_empty());
    }

    #[test]
    fn picks_class_with_highest_weighted_score() {
        let m = model(1, &["Person", "Helmet", "Vest"]);
        let encoder = TensorEncoder::new(&m);
        let mut tensor = encoder.encode(&[record(0, 0.5, 0.5, 1.0, 0.4)]);
        tensor[BOX_FIELDS + 2] = m.quantization.quantize(0.9);
        let cands = TensorDecoder::new(&m).decode(&tensor).unwrap();
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].label, "Vest");
        assert!((cands[0].confidence - 0.9).abs() < 0.01);
    }

    #[test]
    fn tie_keeps_lowest_class_index() {
        let m = model(1, &["Person", "Helmet"]);
        let encoder = TensorEncoder::new(&m);
        let mut tensor = encoder.encode(&[record(0, 0.5, 0.5, 1.0, 0.8)]);
        tensor[BOX_FIELDS + 1] = tensor[BOX_FIELDS];
        let cands = TensorDecoder::new(&m).decode(&tensor).unwrap();
        assert_eq!(cands[0].label, "Person");
    }

    #[test]
    fn confidence_must_exceed_threshold() {
        let m = model(2, &["Person"]);
        // 0.5 * 0.5 = 0.25 <= 0.30
        let tensor = TensorEncoder::new(&m).encode(&[record(0, 0.5, 0.5, 0.5, 0.5)]);
        assert!(TensorDecoder::new(&m).decode(&tensor).unwrap().is_empty());
    }

    #[test]
    fn missing_label_uses_fallback() {
        let m = model(1, &["Person"]);
        let mut m2 = m.clone();
        m2.classes = 3;
        let tensor = TensorEncoder::new(&m2).encode(&[record(2, 0.5, 0.5, 1.0, 0.9)]);
        let cands = TensorDecoder::new(&m2).decode(&tensor).unwrap();
        assert_eq!(cands[0].label, FALLBACK_LABEL);
    }

    #[test]
    fn boxes_are_clamped_into_frame() {
        let m = model(2, &["Person"]);
        let encoder = TensorEncoder::new(&m);
        let tensor = encoder.encode(&[
            SyntheticBox {
                class_id: 0,
                cx: 0.95,
                cy: 0.05,
                w: 0.3,
                h: 0.3,
                objectness: 1.0,
                score: 1.0,
            },
            SyntheticBox {
                class_id: 0,
                cx: 0.5,
                cy: 0.5,
                w: 0.0,
                h: 0.4,
                objectness: 1.0,
                score: 1.0,
            },
        ]);
        let cands = TensorDecoder::new(&m).decode(&tensor).unwrap();
        assert_eq!(cands.len(), 1, "zero-width box must be discarded");
        let det = cands[0].clone().into_detection();
        assert!(det.x >= 0.0 && det.y >= 0.0);
        assert!(det.x + det.w <= 1.0 + 1e-6);
        assert!(det.y + det.h <= 1.0 + 1e-6);
    }

    #[test]
    fn never_emits_at_or_below_threshold_or_outside_frame() {
        let m = model(64, &["Person", "Helmet", "Vest"]);
        let decoder = TensorDecoder::new(&m);
        let stride = decoder.stride();
        let tensor: Vec<u8> = (0..m.boxes * stride)
            .map(|i| ((i * 37 + 11) % 256) as u8)
            .collect();
        for cand in decoder.decode(&tensor).unwrap() {
            assert!(cand.confidence > m.confidence_threshold);
            let det = cand.into_detection();
            assert!(det.x >= 0.0 && det.y >= 0.0);
            assert!(det.x + det.w <= 1.0 + 1e-6);
            assert!(det.y + det.h <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn overflow_discards_frame() {
        let m = model(8, &["Person"]);
        let records: Vec<_> = (0..8)
            .map(|i| record(0, 0.1 + i as f32 * 0.1, 0.5, 1.0, 1.0))
            .collect();
        let tensor = TensorEncoder::new(&m).encode(&records);
        let decoder = TensorDecoder::new(&m).with_max_candidates(5);
        assert_eq!(
            decoder.decode(&tensor).unwrap_err(),
            DecodeError::Overflow { count: 8, limit: 5 }
        );
    }
}
