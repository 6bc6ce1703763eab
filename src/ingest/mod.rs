//! Frame ingestion sources.
//!
//! - `SyntheticSource` (`stub://`): generated RGB frames for tests and smoke runs.
//! - `LatestFrameSource`: runs another source on a capture thread and hands the frame
//!   loop only the most recent frame.
//!
//! Sources never store frames to disk and never log pixel content.

pub mod latest;
pub mod synthetic;

use anyhow::{anyhow, Result};

use crate::frame::FrameSource;

pub use latest::LatestFrameSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Build the frame source for `url`, wrapped for latest-frame capture.
pub fn open_source(
    url: &str,
    width: u32,
    height: u32,
    target_fps: u32,
) -> Result<Box<dyn FrameSource>> {
    if url.trim().is_empty() {
        return Err(anyhow!("source url must not be empty"));
    }
    if url.starts_with("stub://") {
        let config = SyntheticConfig::from_url(url, width, height, target_fps)?;
        let inner = SyntheticSource::new(config);
        return Ok(Box::new(LatestFrameSource::new(Box::new(inner))));
    }
    Err(anyhow!(
        "unsupported source url '{}' (only stub:// is built in)",
        url
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_scheme() {
        assert!(open_source("rtsp://10.0.0.2/stream", 64, 48, 10).is_err());
        assert!(open_source("", 64, 48, 10).is_err());
    }

    #[test]
    fn opens_stub_source() {
        let mut source = open_source("stub://camera", 8, 6, 100).unwrap();
        source.connect().unwrap();
        let frame = source.next_frame().unwrap();
        assert_eq!((frame.width, frame.height), (8, 6));
        assert_eq!(frame.byte_len(), 8 * 6 * 3);
    }
}
