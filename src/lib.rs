//! Edge Detect Agent
//!
//! On-camera object detection agent: pulls frames from a camera, runs them through a
//! quantized detection model and turns the noisy per-frame detections into stable,
//! debounced events plus secondary compliance signals (e.g. "no helmet").
//!
//! # Pipeline
//!
//! ```text
//! raw tensor -> TensorDecoder -> Suppressor -> FrameFilter -> {EventDebouncer, ComplianceSmoother}
//! ```
//!
//! 1. **Decode**: dequantize fixed-stride box records, gate on objectness, pick the best
//!    class, clamp boxes into the frame.
//! 2. **Suppress**: greedy IoU non-maximum suppression in decode order.
//! 3. **Filter**: area of interest, minimum size, ignore list and confidence policy in
//!    `0..=1000` policy space.
//! 4. **Debounce**: per-label onset delay and hold time.
//! 5. **Smooth**: rolling-window majority over subject/accessory counts.
//!
//! # Module Structure
//!
//! - `config`: agent (TOML), model (`model.json`) and policy (`settings.json`) config
//! - `detect`: decoder, NMS, inference backends
//! - `filter`: policy filter
//! - `events`: debouncer, compliance smoother, event sinks
//! - `frame` / `ingest`: frames and frame sources
//! - `pipeline`: `Pipeline` and `Agent`
//! - `status`: status surface

use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod detect;
pub mod error;
pub mod events;
pub mod filter;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod status;

pub use config::{AgentConfig, BackendKind, ModelConfig, PolicyConfig, PolicyWatcher, Rect};
pub use detect::{
    Candidate, Detection, InferenceBackend, QuantizedTensor, StubBackend, Suppressor,
    TensorDecoder,
};
pub use error::{DecodeError, FaultKind, PipelineFault};
pub use events::{ComplianceSmoother, EventDebouncer, EventSink, Level, Transition};
pub use filter::{AcceptedDetection, FrameFilter};
pub use frame::{FrameSource, LatestFrame, RawFrame};
pub use pipeline::{Agent, FrameOutcome, Pipeline, ProcessedDetectionSet};
pub use status::{Status, StatusWriter};

/// Wall-clock time in milliseconds since the Unix epoch. Returns 0 if the clock is
/// before the epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
