//! Raw frames and the capture seam.
//!
//! - `RawFrame`: interleaved RGB pixels plus capture time.
//! - `FrameSource`: anything that can hand out frames (camera, synthetic generator).
//! - `LatestFrame`: single-slot hand-off between a capture thread and the frame loop.
//!   Only the most recent frame is kept; older frames are overwritten, never queued.

use anyhow::{anyhow, Result};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

// ----------------------------------------------------------------------------
// RawFrame
// ----------------------------------------------------------------------------

/// One captured frame. Pixel data is interleaved RGB, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Capture time in milliseconds since the Unix epoch.
    pub captured_at_ms: u64,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, captured_at_ms: u64) -> Self {
        Self {
            data,
            width,
            height,
            captured_at_ms,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Nearest-neighbour scale to `width` x `height`. Returns a clone when the size
    /// already matches.
    pub fn resized(&self, width: u32, height: u32) -> Result<RawFrame> {
        let expected = (self.width as usize) * (self.height as usize) * 3;
        if self.data.len() != expected {
            return Err(anyhow!(
                "frame {}x{} has {} bytes, expected {}",
                self.width,
                self.height,
                self.data.len(),
                expected
            ));
        }
        if width == 0 || height == 0 {
            return Err(anyhow!("cannot scale frame to {}x{}", width, height));
        }
        if width == self.width && height == self.height {
            return Ok(self.clone());
        }

        let (src_w, src_h) = (self.width as usize, self.height as usize);
        let (dst_w, dst_h) = (width as usize, height as usize);
        let mut data = Vec::with_capacity(dst_w * dst_h * 3);
        for y in 0..dst_h {
            let sy = y * src_h / dst_h;
            for x in 0..dst_w {
                let sx = x * src_w / dst_w;
                let at = (sy * src_w + sx) * 3;
                data.extend_from_slice(&self.data[at..at + 3]);
            }
        }
        Ok(RawFrame::new(data, width, height, self.captured_at_ms))
    }
}

// ----------------------------------------------------------------------------
// FrameSource
// ----------------------------------------------------------------------------

/// A producer of raw frames.
pub trait FrameSource: Send {
    /// Open the underlying stream.
    fn connect(&mut self) -> Result<()>;

    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<RawFrame>;

    fn is_healthy(&self) -> bool;
}

// ----------------------------------------------------------------------------
// LatestFrame
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Slot {
    frame: Option<RawFrame>,
    /// Frames overwritten before anyone took them.
    dropped: u64,
    closed: bool,
}

/// Single-slot mailbox holding the most recent frame.
#[derive(Default)]
pub struct LatestFrame {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A panicking producer leaves the slot in a consistent state.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish a frame, replacing any frame not yet taken.
    pub fn publish(&self, frame: RawFrame) {
        let mut slot = self.lock();
        if slot.frame.is_some() {
            slot.dropped += 1;
        }
        slot.frame = Some(frame);
        self.ready.notify_all();
    }

    /// Mark the producer as gone. Waiting consumers wake up and get `None`.
    pub fn close(&self) {
        let mut slot = self.lock();
        slot.closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Take the current frame if one is waiting.
    pub fn try_take(&self) -> Option<RawFrame> {
        self.lock().frame.take()
    }

    /// Wait up to `timeout` for a frame. Returns `None` on timeout or once the slot is
    /// closed and empty.
    pub fn take(&self, timeout: Duration) -> Option<RawFrame> {
        let slot = self.lock();
        let (mut slot, _) = self
            .ready
            .wait_timeout_while(slot, timeout, |s| s.frame.is_none() && !s.closed)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.frame.take()
    }

    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}
