//! Synthetic frame source (`stub://`).
//!
//! Produces RGB frames of a fixed size at a paced rate. A `frames=N` query parameter
//! ends the stream after N frames, which lets tests and smoke runs exercise the
//! capture-failure path: `stub://camera?frames=100`.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use crate::frame::{FrameSource, RawFrame};

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Stream ends after this many frames.
    pub frame_limit: Option<u64>,
}

impl SyntheticConfig {
    pub fn from_url(url: &str, width: u32, height: u32, target_fps: u32) -> Result<Self> {
        let rest = url
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic source url must start with stub://"))?;
        if width == 0 || height == 0 {
            return Err(anyhow!("synthetic source size must be non-zero"));
        }
        if target_fps == 0 {
            return Err(anyhow!("synthetic source target_fps must be >= 1"));
        }

        let mut frame_limit = None;
        if let Some((_, query)) = rest.split_once('?') {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                match pair.split_once('=') {
                    Some(("frames", value)) => {
                        frame_limit = Some(value.parse().map_err(|_| {
                            anyhow!("stub:// frames must be an integer, got '{}'", value)
                        })?);
                    }
                    _ => return Err(anyhow!("unknown stub:// parameter '{}'", pair)),
                }
            }
        }

        Ok(Self {
            url: url.to_string(),
            width,
            height,
            target_fps,
            frame_limit,
        })
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    scene_state: u8,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
            next_due: None,
        }
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.config.target_fps.max(1)))
    }

    fn pace(&mut self) {
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + self.frame_interval());
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = self.config.width as usize * self.config.height as usize * 3;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let offset = self.frame_count + self.scene_state as u64;
        (0..pixel_count)
            .map(|i| ((i as u64 + offset) % 256) as u8)
            .collect()
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "synthetic source {} ({}x{} @ {} fps)",
            self.config.url,
            self.config.width,
            self.config.height,
            self.config.target_fps
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        if let Some(limit) = self.config.frame_limit {
            if self.frame_count >= limit {
                return Err(anyhow!(
                    "synthetic stream ended after {} frames",
                    self.frame_count
                ));
            }
        }
        self.pace();
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(RawFrame::new(
            pixels,
            self.config.width,
            self.config.height,
            crate::now_ms(),
        ))
    }

    fn is_healthy(&self) -> bool {
        self.config
            .frame_limit
            .map_or(true, |limit| self.frame_count < limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frame_limit() {
        let cfg = SyntheticConfig::from_url("stub://camera?frames=3", 4, 4, 100).unwrap();
        assert_eq!(cfg.frame_limit, Some(3));
        assert!(SyntheticConfig::from_url("stub://camera?frames=x", 4, 4, 100).is_err());
        assert!(SyntheticConfig::from_url("stub://camera?fps=3", 4, 4, 100).is_err());
        assert!(SyntheticConfig::from_url("rtsp://camera", 4, 4, 100).is_err());
    }

    #[test]
    fn stream_ends_after_limit() {
        let cfg = SyntheticConfig::from_url("stub://camera?frames=2", 4, 4, 1000).unwrap();
        let mut source = SyntheticSource::new(cfg);
        source.connect().unwrap();
        assert!(source.next_frame().is_ok());
        assert!(source.next_frame().is_ok());
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn frames_have_rgb_size() {
        let cfg = SyntheticConfig::from_url("stub://camera", 5, 3, 1000).unwrap();
        let mut source = SyntheticSource::new(cfg);
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.byte_len(), 5 * 3 * 3);
        assert!(frame.captured_at_ms > 0);
    }
}
