//! detectd - on-camera detection agent
//!
//! This daemon:
//! 1. Loads agent, model and policy configuration
//! 2. Captures frames (latest frame only) and runs inference
//! 3. Decodes, suppresses and filters detections
//! 4. Publishes debounced label events and compliance events
//! 5. Reloads the policy file when it changes and writes a status file

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use edge_detect_agent::events::{JsonLinesSink, LogSink};
use edge_detect_agent::{
    Agent, AgentConfig, EventSink, FaultKind, FrameOutcome, PolicyWatcher, Status, StatusWriter,
};

const STATUS_WRITE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Agent config file (TOML).
    #[arg(long, env = "DETECTD_CONFIG")]
    config: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long)]
    frames: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = AgentConfig::load_from(args.config.as_deref())?;
    let status_writer = cfg.status_path.as_ref().map(StatusWriter::new);
    let mut sink = open_sink(&cfg)?;

    let mut agent = match Agent::from_config(&cfg, sink.as_mut()) {
        Ok(agent) => agent,
        Err(e) => {
            log::error!("setup failed: {:#}", e);
            let mut status = Status::new();
            status.mark_setup_failed(&e);
            write_status(status_writer.as_ref(), &status);
            return Err(e);
        }
    };
    write_status(status_writer.as_ref(), agent.status());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    }

    let mut watcher = PolicyWatcher::new(&cfg.settings_path, cfg.policy_reload);
    let idle = Duration::from_millis(1000 / u64::from(cfg.source.target_fps));
    let mut frames = 0u64;
    let mut last_status_write = Instant::now();

    log::info!(
        "detectd running. source={}, model={}, settings={}",
        cfg.source.url,
        cfg.model_path.display(),
        cfg.settings_path.display()
    );

    while running.load(Ordering::SeqCst) {
        if let Some(policy) = watcher.poll() {
            agent.apply_policy(policy, sink.as_mut());
        }

        match agent.process_frame(sink.as_mut()) {
            FrameOutcome::Skipped(fault)
                if fault.kind == FaultKind::Capture && !agent.source_healthy() =>
            {
                log::error!("frame source lost, stopping: {}", fault);
                write_status(status_writer.as_ref(), agent.status());
                break;
            }
            FrameOutcome::Disabled => std::thread::sleep(idle),
            FrameOutcome::Skipped(_) | FrameOutcome::Processed(_) => {}
        }

        frames += 1;
        if last_status_write.elapsed() >= STATUS_WRITE_INTERVAL {
            write_status(status_writer.as_ref(), agent.status());
            last_status_write = Instant::now();
        }
        if args.frames.is_some_and(|limit| frames >= limit) {
            log::info!("frame limit {} reached", frames);
            break;
        }
    }

    log::info!("shutting down after {} frames", frames);
    agent.shutdown(sink.as_mut());
    write_status(status_writer.as_ref(), agent.status());
    Ok(())
}

fn open_sink(cfg: &AgentConfig) -> Result<Box<dyn EventSink>> {
    match &cfg.events_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open events log {}", path.display()))?;
            log::info!("writing events to {}", path.display());
            Ok(Box::new(JsonLinesSink::new(file)))
        }
        None => Ok(Box::new(LogSink)),
    }
}

fn write_status(writer: Option<&StatusWriter>, status: &Status) {
    if let Some(writer) = writer {
        if let Err(e) = writer.write(status) {
            log::warn!("{:#}", e);
        }
    }
}
