use anyhow::Result;

use crate::frame::RawFrame;

/// Fixed-layout quantized output tensor returned by an inference backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuantizedTensor(Vec<u8>);

impl QuantizedTensor {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for QuantizedTensor {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Inference backend trait.
///
/// The backend owns model loading, device selection and tensor buffers. Given a raw
/// frame it returns one output tensor in the layout described by `ModelConfig`.
/// A returned error is a transient inference failure and is counted by the caller.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run inference on a frame.
    fn infer(&mut self, frame: &RawFrame) -> Result<QuantizedTensor>;

    /// Optional warm-up hook, run once during setup.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
