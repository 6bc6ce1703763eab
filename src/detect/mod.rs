mod backend;
mod backends;
mod decoder;
mod nms;
mod result;

pub use backend::{InferenceBackend, QuantizedTensor};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use decoder::{
    Quantization, SyntheticBox, TensorDecoder, TensorEncoder, BOX_FIELDS, MAX_CANDIDATES,
};
pub use nms::{iou, Suppressor};
pub use result::{Candidate, Detection, FALLBACK_LABEL};
