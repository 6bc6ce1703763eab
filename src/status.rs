//! Status surface published to the outside world.
//!
//! The frame loop updates a `Status` after every frame; `StatusWriter` persists it as
//! JSON when a status path is configured.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PipelineFault;
use crate::filter::AcceptedDetection;

pub const STATE_OK: &str = "Model OK.";
pub const STATE_STOPPED: &str = "Model stopped";
pub const STATE_SETUP_FAILED: &str = "Model initialization failed.  Check log file";
pub const STATE_ERROR: &str = "Error. Check log";

/// Frames per latency averaging block.
pub const LATENCY_BLOCK: u32 = 10;

/// Block-averaged inference latency. The average changes once every `LATENCY_BLOCK` frames.
#[derive(Clone, Debug, Default)]
pub struct LatencyMeter {
    sum_ms: u64,
    samples: u32,
    average_ms: Option<u64>,
}

impl LatencyMeter {
    pub fn record(&mut self, elapsed: Duration) {
        self.sum_ms += elapsed.as_millis() as u64;
        self.samples += 1;
        if self.samples == LATENCY_BLOCK {
            self.average_ms = Some(self.sum_ms / u64::from(LATENCY_BLOCK));
            self.sum_ms = 0;
            self.samples = 0;
        }
    }

    pub fn average_ms(&self) -> Option<u64> {
        self.average_ms
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Status {
    pub running: bool,
    pub state: String,
    pub average_inference_ms: Option<u64>,
    pub last_error: Option<String>,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub decode_anomalies: u64,
    /// Consecutive inference failures.
    pub inference_failures: u32,
    /// Accepted detections of the last processed frame.
    pub detections: Vec<AcceptedDetection>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            running: false,
            state: STATE_STOPPED.to_string(),
            average_inference_ms: None,
            last_error: None,
            frames_processed: 0,
            frames_skipped: 0,
            decode_anomalies: 0,
            inference_failures: 0,
            detections: Vec::new(),
        }
    }
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_running(&mut self) {
        self.running = true;
        self.state = STATE_OK.to_string();
        self.last_error = None;
    }

    pub fn mark_stopped(&mut self) {
        self.running = false;
        self.state = STATE_STOPPED.to_string();
    }

    pub fn mark_setup_failed(&mut self, err: &anyhow::Error) {
        self.running = false;
        self.state = STATE_SETUP_FAILED.to_string();
        self.last_error = Some(format!("{:#}", err));
    }

    /// Terminal or loop-stopping fault.
    pub fn mark_error(&mut self, fault: &PipelineFault) {
        self.running = false;
        self.state = STATE_ERROR.to_string();
        self.last_error = Some(fault.to_string());
    }

    /// The frame was skipped but the loop keeps going.
    pub fn mark_degraded(&mut self, fault: &PipelineFault) {
        self.state = format!("Degraded: {}", fault.kind.code());
        self.last_error = Some(fault.to_string());
        self.frames_skipped += 1;
    }

    pub fn is_degraded(&self) -> bool {
        self.state.starts_with("Degraded")
    }

    /// A frame went through the whole pipeline.
    pub fn record_processed(&mut self, detections: Vec<AcceptedDetection>) {
        self.frames_processed += 1;
        self.detections = detections;
        if self.running && self.state != STATE_OK {
            self.state = STATE_OK.to_string();
        }
    }
}

/// Writes the status JSON next to its final path, then renames it into place.
pub struct StatusWriter {
    path: PathBuf,
}

impl StatusWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn write(&self, status: &Status) -> Result<()> {
        let data = serde_json::to_vec_pretty(status).context("failed to encode status")?;
        write_atomic(&self.path, &data)
            .with_context(|| format!("failed to write status {}", self.path.display()))
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}
