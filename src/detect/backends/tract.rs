#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::config::ModelConfig;
use crate::detect::backend::{InferenceBackend, QuantizedTensor};
use crate::frame::RawFrame;

/// Tract-based backend for quantized ONNX detectors.
///
/// Scales each interleaved RGB frame to the model input, feeds it as a `u8` NHWC
/// tensor and returns the first output as raw bytes.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    output_len: usize,
}

impl TractBackend {
    /// Load the model named by `ModelConfig.path` and prepare it for inference.
    pub fn from_model_config(model: &ModelConfig) -> Result<Self> {
        let path = model
            .model_path
            .as_ref()
            .ok_or_else(|| anyhow!("model config has no model path"))?;
        Self::new(
            path,
            model.model_width,
            model.model_height,
            model.output_len(),
        )
    }

    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        output_len: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    u8::datum_type(),
                    tvec!(1, height as usize, width as usize, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            output_len,
        })
    }

    fn build_input(&self, frame: &RawFrame) -> Result<Tensor> {
        let frame = frame
            .resized(self.width, self.height)
            .context("failed to scale frame to model input")?;

        let expected_len = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        let pixels = frame.pixels();
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let input = tract_ndarray::Array4::from_shape_vec(
            (1, self.height as usize, self.width as usize, 3),
            pixels.to_vec(),
        )
        .context("failed to shape input tensor")?;
        Ok(input.into_tensor())
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, frame: &RawFrame) -> Result<QuantizedTensor> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let bytes = output
            .as_slice::<u8>()
            .context("model output tensor was not u8")?;
        if bytes.len() != self.output_len {
            return Err(anyhow!(
                "model output has {} bytes, expected {}",
                bytes.len(),
                self.output_len
            ));
        }
        Ok(QuantizedTensor::new(bytes.to_vec()))
    }
}
