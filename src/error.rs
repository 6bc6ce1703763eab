//! Fault taxonomy for the detection pipeline.
//!
//! Every fault the pipeline can hit is classified by a `FaultKind`. Faults are reported
//! to the status surface and never cross the per-frame boundary; only setup returns them
//! to the caller (wrapped in `anyhow::Error`, recoverable with `downcast_ref`).

/// Classification of a pipeline fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// Malformed or missing model/policy fields. Fatal to setup.
    Config,
    /// Transient failure of the inference call. Counted against the failure budget.
    Inference,
    /// Candidate count above the safety ceiling. The frame's candidates are discarded.
    DecodeAnomaly,
    /// AOI or size policy absent. The frame is skipped.
    FilterPolicyMissing,
    /// The frame source returned no frame.
    Capture,
}

impl FaultKind {
    pub fn code(&self) -> &'static str {
        match self {
            FaultKind::Config => "CONFIG_INVALID",
            FaultKind::Inference => "INFERENCE_FAILED",
            FaultKind::DecodeAnomaly => "DECODE_ANOMALY",
            FaultKind::FilterPolicyMissing => "FILTER_POLICY_MISSING",
            FaultKind::Capture => "CAPTURE_FAILED",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineFault {
    pub kind: FaultKind,
    pub message: String,
}

impl PipelineFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Config, message)
    }
}

impl std::fmt::Display for PipelineFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for PipelineFault {}

/// Errors produced while decoding a quantized output tensor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Tensor length does not match `boxes * (5 + classes)`.
    Length { expected: usize, actual: usize },
    /// More candidates than the per-frame ceiling.
    Overflow { count: usize, limit: usize },
}

impl DecodeError {
    /// Fault classification: a short tensor is a broken inference output,
    /// an overflow is a decode anomaly.
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            DecodeError::Length { .. } => FaultKind::Inference,
            DecodeError::Overflow { .. } => FaultKind::DecodeAnomaly,
        }
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Length { expected, actual } => write!(
                f,
                "output tensor has {} bytes, expected {}",
                actual, expected
            ),
            DecodeError::Overflow { count, limit } => write!(
                f,
                "detection list is too big ({} candidates, limit {})",
                count, limit
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for PipelineFault {
    fn from(err: DecodeError) -> Self {
        PipelineFault::new(err.fault_kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_display_carries_code() {
        let fault = PipelineFault::new(FaultKind::FilterPolicyMissing, "no aoi settings");
        assert_eq!(fault.to_string(), "FILTER_POLICY_MISSING: no aoi settings");
    }

    #[test]
    fn fault_survives_anyhow_round_trip() {
        let err: anyhow::Error = PipelineFault::config("boxes must be > 0").into();
        let fault = err.downcast_ref::<PipelineFault>().expect("typed fault");
        assert_eq!(fault.kind, FaultKind::Config);
    }

    #[test]
    fn decode_errors_map_to_fault_kinds() {
        let short = DecodeError::Length {
            expected: 10,
            actual: 4,
        };
        assert_eq!(PipelineFault::from(short).kind, FaultKind::Inference);
        let big = DecodeError::Overflow {
            count: 501,
            limit: 500,
        };
        assert_eq!(PipelineFault::from(big).kind, FaultKind::DecodeAnomaly);
    }
}
