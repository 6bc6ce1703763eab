//! tensor_decode - decode a recorded output tensor offline
//!
//! Reads a raw output tensor dump, decodes and de-duplicates it with the given model
//! config and prints the detections as JSON. With `--settings` the policy filter is
//! applied as well and the accepted detections (policy-space coordinates) are printed.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use edge_detect_agent::events::RecordingSink;
use edge_detect_agent::{Detection, FrameOutcome, ModelConfig, Pipeline, PolicyConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Model config (model.json).
    #[arg(long)]
    model: PathBuf,
    /// Raw output tensor file.
    #[arg(long)]
    tensor: PathBuf,
    /// Policy settings (settings.json). Filters the detections when given.
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Timestamp stamped on accepted detections.
    #[arg(long, default_value_t = 0)]
    timestamp: u64,
}

#[derive(Serialize)]
struct DecodeReport {
    tensor_bytes: usize,
    detections: Vec<Detection>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let model = ModelConfig::load(&args.model)?;
    let tensor = std::fs::read(&args.tensor)
        .with_context(|| format!("failed to read tensor {}", args.tensor.display()))?;

    let output = match &args.settings {
        None => {
            let pipeline = Pipeline::new(model, PolicyConfig::default());
            let detections = pipeline.detect(&tensor)?;
            serde_json::to_string_pretty(&DecodeReport {
                tensor_bytes: tensor.len(),
                detections,
            })?
        }
        Some(path) => {
            let policy = PolicyConfig::load(path)?;
            let mut pipeline = Pipeline::new(model, policy);
            let mut sink = RecordingSink::new();
            match pipeline.process_tensor(&tensor, args.timestamp, &mut sink) {
                FrameOutcome::Processed(set) => serde_json::to_string_pretty(&set)?,
                FrameOutcome::Skipped(fault) => return Err(fault.into()),
                FrameOutcome::Disabled => return Err(anyhow!("pipeline disabled")),
            }
        }
    };
    println!("{}", output);
    Ok(())
}
