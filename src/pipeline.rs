//! Frame pipeline and the agent that drives it.
//!
//! `Pipeline` is the per-frame core: decode -> suppress -> filter -> debounce/smooth.
//! It is pure with respect to I/O; events go to an `EventSink` passed per call.
//!
//! `Agent` wraps a pipeline with a frame source, an inference backend, the inference
//! failure budget and the status surface. One `process_frame` call handles exactly one
//! frame and always returns an outcome; no fault escapes the frame boundary.

use anyhow::Result;
use serde::Serialize;
use std::time::Instant;

use crate::config::{AgentConfig, BackendKind, ModelConfig, PolicyConfig};
use crate::detect::{Detection, InferenceBackend, StubBackend, Suppressor, TensorDecoder};
use crate::error::{DecodeError, FaultKind, PipelineFault};
use crate::events::{
    ComplianceSmoother, DebounceTiming, EventDebouncer, EventSink, Transition,
};
use crate::filter::{AcceptedDetection, FrameFilter};
use crate::frame::FrameSource;
use crate::ingest;
use crate::status::{LatencyMeter, Status};

/// Accepted detections of one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessedDetectionSet {
    pub timestamp: u64,
    pub detections: Vec<AcceptedDetection>,
    /// Set when the frame's candidates were discarded as a decode anomaly.
    #[serde(skip)]
    pub anomaly: Option<PipelineFault>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    Processed(ProcessedDetectionSet),
    /// The frame was dropped; the loop may continue unless the fault is a capture fault.
    Skipped(PipelineFault),
    /// The inference failure budget is exhausted. Requires `Agent::reinitialize`.
    Disabled,
}

// -------------------- Pipeline --------------------

pub struct Pipeline {
    model: ModelConfig,
    decoder: TensorDecoder,
    suppressor: Suppressor,
    policy: PolicyConfig,
    filter: std::result::Result<FrameFilter, PipelineFault>,
    debouncer: EventDebouncer,
    compliance: Option<ComplianceSmoother>,
    decode_anomalies: u64,
}

impl Pipeline {
    pub fn new(model: ModelConfig, policy: PolicyConfig) -> Self {
        let compliance = build_smoother(&policy);
        Self {
            decoder: TensorDecoder::new(&model),
            suppressor: Suppressor::new(model.nms_threshold),
            filter: FrameFilter::from_policy(&policy),
            debouncer: EventDebouncer::new(DebounceTiming::from_policy(&policy)),
            compliance,
            decode_anomalies: 0,
            model,
            policy,
        }
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn debouncer(&self) -> &EventDebouncer {
        &self.debouncer
    }

    pub fn compliance(&self) -> Option<&ComplianceSmoother> {
        self.compliance.as_ref()
    }

    pub fn decode_anomalies(&self) -> u64 {
        self.decode_anomalies
    }

    /// Declare the label events to the sink.
    pub fn announce(&self, sink: &mut dyn EventSink) {
        if let Err(e) = sink.declare_label_events(&self.model.labels) {
            log::warn!("failed to declare label events: {:#}", e);
        }
    }

    /// Decode and de-duplicate one output tensor.
    pub fn detect(&self, tensor: &[u8]) -> std::result::Result<Vec<Detection>, DecodeError> {
        let candidates = self.decoder.decode(tensor)?;
        Ok(self
            .suppressor
            .suppress(candidates)
            .into_iter()
            .map(|c| c.into_detection())
            .collect())
    }

    /// Run one output tensor through the whole pipeline.
    pub fn process_tensor(
        &mut self,
        tensor: &[u8],
        now_ms: u64,
        sink: &mut dyn EventSink,
    ) -> FrameOutcome {
        let (detections, anomaly) = match self.detect(tensor) {
            Ok(detections) => (detections, None),
            Err(err @ DecodeError::Overflow { .. }) => {
                self.decode_anomalies += 1;
                log::warn!("{}", err);
                (Vec::new(), Some(PipelineFault::from(err)))
            }
            Err(err) => return FrameOutcome::Skipped(PipelineFault::from(err)),
        };

        let filter = match &self.filter {
            Ok(filter) => filter,
            Err(fault) => return FrameOutcome::Skipped(fault.clone()),
        };
        let accepted = filter.apply(detections, now_ms);
        log::debug!("frame {}: {} accepted detections", now_ms, accepted.len());

        let labels: Vec<&str> = accepted.iter().map(|d| d.label.as_str()).collect();
        let transitions = self.debouncer.update(labels.iter().copied(), now_ms);
        publish_labels(sink, &transitions, now_ms);
        if let Some(smoother) = self.compliance.as_mut() {
            let transitions = smoother.update(labels.iter().copied());
            publish_compliance(sink, &transitions, now_ms);
        }

        FrameOutcome::Processed(ProcessedDetectionSet {
            timestamp: now_ms,
            detections: accepted,
            anomaly,
        })
    }

    /// Swap in a new policy. The smoother is rebuilt when its settings or window changed.
    pub fn update_policy(
        &mut self,
        policy: PolicyConfig,
        now_ms: u64,
        sink: &mut dyn EventSink,
    ) {
        let changed = self.policy.changed_keys(&policy);
        if changed.is_empty() {
            return;
        }
        log::info!("policy changed: {}", changed.join(", "));

        self.filter = FrameFilter::from_policy(&policy);
        if let Err(fault) = &self.filter {
            log::warn!("{}", fault);
        }
        self.debouncer.set_timing(DebounceTiming::from_policy(&policy));

        if self.policy.compliance != policy.compliance {
            if let Some(old) = self.compliance.as_mut() {
                let window = old.window();
                publish_compliance(sink, &old.reset(window), now_ms);
            }
            self.compliance = build_smoother(&policy);
        } else if self.policy.compliance_window() != policy.compliance_window() {
            if let Some(smoother) = self.compliance.as_mut() {
                let lows = smoother.reset(policy.compliance_window());
                publish_compliance(sink, &lows, now_ms);
            }
        }
        self.policy = policy;
    }

    /// Clear all label and compliance state, publishing lows for anything active.
    pub fn release(&mut self, now_ms: u64, sink: &mut dyn EventSink) {
        let lows = self.debouncer.reset();
        publish_labels(sink, &lows, now_ms);
        if let Some(smoother) = self.compliance.as_mut() {
            let lows = smoother.reset(self.policy.compliance_window());
            publish_compliance(sink, &lows, now_ms);
        }
    }

    /// Clear all label state and re-declare label events.
    pub fn reset(&mut self, now_ms: u64, sink: &mut dyn EventSink) {
        self.release(now_ms, sink);
        self.announce(sink);
    }
}

fn build_smoother(policy: &PolicyConfig) -> Option<ComplianceSmoother> {
    policy
        .compliance
        .enabled
        .then(|| ComplianceSmoother::new(&policy.compliance, policy.compliance_window()))
}

fn publish_labels(sink: &mut dyn EventSink, transitions: &[Transition], at_ms: u64) {
    for t in transitions {
        if let Err(e) = sink.on_label_event(&t.name, t.level, at_ms) {
            log::warn!("failed to publish event {}: {:#}", t.name, e);
        }
    }
}

fn publish_compliance(sink: &mut dyn EventSink, transitions: &[Transition], at_ms: u64) {
    for t in transitions {
        if let Err(e) = sink.on_compliance_event(&t.name, t.level, at_ms) {
            log::warn!("failed to publish compliance event {}: {:#}", t.name, e);
        }
    }
}

// -------------------- Agent --------------------

pub struct Agent {
    source: Box<dyn FrameSource>,
    backend: Box<dyn InferenceBackend>,
    pipeline: Pipeline,
    status: Status,
    latency: LatencyMeter,
    max_failures: u32,
    failures: u32,
    disabled: bool,
}

impl Agent {
    /// Set up the agent. Fails when the backend or source cannot be brought up; the
    /// agent is never constructed with partial state.
    pub fn new(
        pipeline: Pipeline,
        mut source: Box<dyn FrameSource>,
        mut backend: Box<dyn InferenceBackend>,
        max_failures: u32,
        sink: &mut dyn EventSink,
    ) -> Result<Self> {
        if max_failures == 0 {
            return Err(PipelineFault::config("max_inference_failures must be >= 1").into());
        }
        backend.warm_up()?;
        source.connect()?;
        pipeline.announce(sink);

        let mut status = Status::new();
        status.mark_running();
        let model = pipeline.model();
        log::info!(
            "agent ready: backend={}, chip={}, model {}x{} from video {}x{}, {} boxes, {} classes",
            backend.name(),
            model.chip,
            model.model_width,
            model.model_height,
            model.video_width,
            model.video_height,
            model.boxes,
            model.classes
        );
        if let Some(description) = &model.description {
            log::info!("model: {}", description);
        }
        Ok(Self {
            source,
            backend,
            pipeline,
            status,
            latency: LatencyMeter::default(),
            max_failures,
            failures: 0,
            disabled: false,
        })
    }

    /// Load model and policy files named by `cfg` and build the configured source and
    /// backend.
    pub fn from_config(cfg: &AgentConfig, sink: &mut dyn EventSink) -> Result<Self> {
        let model = ModelConfig::load(&cfg.model_path)?;
        let policy = PolicyConfig::load(&cfg.settings_path)?;
        let backend = build_backend(cfg.backend, &model)?;
        let source = ingest::open_source(
            &cfg.source.url,
            cfg.source.width.unwrap_or(model.video_width),
            cfg.source.height.unwrap_or(model.video_height),
            cfg.source.target_fps,
        )?;
        Self::new(
            Pipeline::new(model, policy),
            source,
            backend,
            cfg.max_inference_failures,
            sink,
        )
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// False once the frame source is gone for good.
    pub fn source_healthy(&self) -> bool {
        self.source.is_healthy()
    }

    /// Capture, infer and process one frame.
    pub fn process_frame(&mut self, sink: &mut dyn EventSink) -> FrameOutcome {
        if self.disabled {
            return FrameOutcome::Disabled;
        }

        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                let fault = PipelineFault::new(FaultKind::Capture, format!("{:#}", e));
                if self.source.is_healthy() {
                    log::warn!("image capture missed a frame: {}", fault);
                    self.status.mark_degraded(&fault);
                } else {
                    log::warn!("image capture failed: {}", fault);
                    self.status.mark_error(&fault);
                }
                return FrameOutcome::Skipped(fault);
            }
        };

        let started = Instant::now();
        let tensor = match self.backend.infer(&frame) {
            Ok(tensor) => tensor,
            Err(e) => {
                let fault = PipelineFault::new(FaultKind::Inference, format!("{:#}", e));
                return self.inference_failed(fault);
            }
        };
        self.latency.record(started.elapsed());
        self.status.average_inference_ms = self.latency.average_ms();

        match self
            .pipeline
            .process_tensor(tensor.as_bytes(), frame.captured_at_ms, sink)
        {
            FrameOutcome::Skipped(fault) if fault.kind == FaultKind::Inference => {
                self.inference_failed(fault)
            }
            FrameOutcome::Skipped(fault) => {
                self.inference_succeeded();
                log::debug!("frame skipped: {}", fault);
                self.status.mark_degraded(&fault);
                FrameOutcome::Skipped(fault)
            }
            FrameOutcome::Processed(set) => {
                self.inference_succeeded();
                if set.anomaly.is_some() {
                    self.status.decode_anomalies += 1;
                }
                self.status.record_processed(set.detections.clone());
                FrameOutcome::Processed(set)
            }
            FrameOutcome::Disabled => FrameOutcome::Disabled,
        }
    }

    fn inference_succeeded(&mut self) {
        self.failures = 0;
        self.status.inference_failures = 0;
    }

    fn inference_failed(&mut self, fault: PipelineFault) -> FrameOutcome {
        self.failures += 1;
        self.status.inference_failures = self.failures;
        if self.failures >= self.max_failures {
            self.disabled = true;
            let fault = PipelineFault::new(
                FaultKind::Inference,
                format!(
                    "pipeline disabled after {} consecutive failures (last: {})",
                    self.failures, fault.message
                ),
            );
            log::error!("{}", fault);
            self.status.mark_error(&fault);
            return FrameOutcome::Disabled;
        }
        log::warn!(
            "inference failed ({}/{}): {}",
            self.failures,
            self.max_failures,
            fault
        );
        self.status.mark_degraded(&fault);
        FrameOutcome::Skipped(fault)
    }

    /// Re-arm a disabled pipeline: clears the failure budget and all label state.
    pub fn reinitialize(&mut self, sink: &mut dyn EventSink) {
        self.failures = 0;
        self.disabled = false;
        self.status.inference_failures = 0;
        self.pipeline.reset(crate::now_ms(), sink);
        self.status.mark_running();
        log::info!("pipeline reinitialized");
    }

    pub fn apply_policy(&mut self, policy: PolicyConfig, sink: &mut dyn EventSink) {
        self.pipeline.update_policy(policy, crate::now_ms(), sink);
    }

    /// Drop all active events and mark the agent stopped.
    pub fn shutdown(&mut self, sink: &mut dyn EventSink) {
        self.pipeline.release(crate::now_ms(), sink);
        self.status.mark_stopped();
    }
}

fn build_backend(kind: BackendKind, model: &ModelConfig) -> Result<Box<dyn InferenceBackend>> {
    match kind {
        BackendKind::Stub => Ok(Box::new(StubBackend::walkthrough(model))),
        #[cfg(feature = "backend-tract")]
        BackendKind::Tract => Ok(Box::new(crate::detect::TractBackend::from_model_config(
            model,
        )?)),
        #[cfg(not(feature = "backend-tract"))]
        BackendKind::Tract => Err(anyhow::anyhow!(
            "tract backend requested but built without the backend-tract feature"
        )),
    }
}
