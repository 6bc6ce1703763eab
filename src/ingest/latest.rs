use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::frame::{FrameSource, LatestFrame, RawFrame};

const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Captures on a background thread; `next_frame` returns only the newest frame.
///
/// Frames captured while the consumer is busy overwrite each other. When the inner
/// source fails the slot is closed and `next_frame` reports a capture error.
pub struct LatestFrameSource {
    inner: Option<Box<dyn FrameSource>>,
    latest: Arc<LatestFrame>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    timeout: Duration,
}

impl LatestFrameSource {
    pub fn new(inner: Box<dyn FrameSource>) -> Self {
        Self {
            inner: Some(inner),
            latest: Arc::new(LatestFrame::new()),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            timeout: DEFAULT_FRAME_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Frames overwritten before the frame loop took them.
    pub fn dropped_frames(&self) -> u64 {
        self.latest.dropped()
    }
}

impl FrameSource for LatestFrameSource {
    fn connect(&mut self) -> Result<()> {
        let mut inner = self
            .inner
            .take()
            .ok_or_else(|| anyhow!("capture thread already started"))?;
        inner.connect()?;

        let latest = Arc::clone(&self.latest);
        let stop = Arc::clone(&self.stop);
        let worker = std::thread::Builder::new()
            .name("frame-capture".to_string())
            .spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    match inner.next_frame() {
                        Ok(frame) => latest.publish(frame),
                        Err(e) => {
                            log::warn!("capture stopped: {:#}", e);
                            break;
                        }
                    }
                }
                latest.close();
            })
            .map_err(|e| anyhow!("failed to spawn capture thread: {}", e))?;
        self.worker = Some(worker);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        if self.worker.is_none() {
            return Err(anyhow!("frame source is not connected"));
        }
        match self.latest.take(self.timeout) {
            Some(frame) => Ok(frame),
            None if self.latest.is_closed() => Err(anyhow!("frame stream closed")),
            None => Err(anyhow!(
                "no frame within {} ms",
                self.timeout.as_millis()
            )),
        }
    }

    fn is_healthy(&self) -> bool {
        self.worker.is_some() && !self.latest.is_closed()
    }
}

impl Drop for LatestFrameSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("capture thread panicked");
            }
            log::info!(
                "capture stopped, {} frames dropped",
                self.dropped_frames()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{SyntheticConfig, SyntheticSource};

    fn synthetic(url: &str, fps: u32) -> Box<dyn FrameSource> {
        let cfg = SyntheticConfig::from_url(url, 4, 4, fps).unwrap();
        Box::new(SyntheticSource::new(cfg))
    }

    #[test]
    fn requires_connect() {
        let mut source = LatestFrameSource::new(synthetic("stub://camera", 100));
        assert!(source.next_frame().is_err());
        assert!(!source.is_healthy());
    }

    #[test]
    fn delivers_frames_and_reports_end_of_stream() {
        let mut source = LatestFrameSource::new(synthetic("stub://camera?frames=3", 1000))
            .with_timeout(Duration::from_secs(2));
        source.connect().unwrap();
        assert!(source.connect().is_err());

        let mut taken = 0;
        while source.next_frame().is_ok() {
            taken += 1;
        }
        assert!(taken >= 1 && taken <= 3);
        assert_eq!(taken as u64 + source.dropped_frames(), 3);
        assert!(!source.is_healthy());
    }

    #[test]
    fn slow_consumer_sees_newest_frame() {
        let mut source = LatestFrameSource::new(synthetic("stub://camera?frames=5", 1000))
            .with_timeout(Duration::from_secs(2));
        source.connect().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        let frame = source.next_frame().unwrap();
        assert!(frame.pixels().len() == 4 * 4 * 3);
        assert!(source.dropped_frames() >= 1);
    }
}
