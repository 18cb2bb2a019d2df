use super::FrameSource;
use crate::error::{Result, SourceError};
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// In-memory frame source for tests and dry runs.
///
/// Every `latest_frame` call yields a fresh frame with the next id, so each
/// capture in a session maps to a distinct frame.
pub struct MockFrameSource {
    width: u32,
    height: u32,
    format: FrameFormat,
    next_frame_id: AtomicU64,
    acquired: AtomicBool,
    starved: AtomicBool,
    fail_acquire: AtomicBool,
    acquire_count: AtomicUsize,
    release_count: AtomicUsize,
}

impl MockFrameSource {
    /// Frames carrying a tiny pass-through JPEG payload
    pub fn mjpeg() -> Self {
        Self::with_format(64, 48, FrameFormat::Mjpeg)
    }

    /// Raw RGB frames of the given size, encoded by the controller
    pub fn rgb(width: u32, height: u32) -> Self {
        Self::with_format(width, height, FrameFormat::Rgb24)
    }

    fn with_format(width: u32, height: u32, format: FrameFormat) -> Self {
        Self {
            width,
            height,
            format,
            next_frame_id: AtomicU64::new(1),
            acquired: AtomicBool::new(false),
            starved: AtomicBool::new(false),
            fail_acquire: AtomicBool::new(false),
            acquire_count: AtomicUsize::new(0),
            release_count: AtomicUsize::new(0),
        }
    }

    /// Stop yielding frames while acquired
    pub fn set_starved(&self, starved: bool) {
        self.starved.store(starved, Ordering::SeqCst);
    }

    /// Make subsequent `acquire` calls fail
    pub fn set_fail_acquire(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }

    pub fn acquire_count(&self) -> usize {
        self.acquire_count.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }

    /// Bytes of the frame with `id`, as returned for MJPEG sources
    pub fn mjpeg_payload(id: u64) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        data.extend_from_slice(&id.to_be_bytes());
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }

    fn make_frame(&self, id: u64) -> FrameData {
        let data = match self.format {
            FrameFormat::Mjpeg => Self::mjpeg_payload(id),
            FrameFormat::Rgb24 => {
                vec![(id % 256) as u8; self.width as usize * self.height as usize * 3]
            }
        };
        FrameData::new(id, SystemTime::now(), data, self.width, self.height, self.format)
    }
}

#[async_trait]
impl FrameSource for MockFrameSource {
    async fn acquire(&self) -> Result<()> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(SourceError::Configuration {
                details: "mock source refused to start".to_string(),
            }
            .into());
        }
        if !self.acquired.swap(true, Ordering::SeqCst) {
            self.acquire_count.fetch_add(1, Ordering::SeqCst);
            debug!("Mock source acquired");
        }
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        if self.acquired.swap(false, Ordering::SeqCst) {
            self.release_count.fetch_add(1, Ordering::SeqCst);
            debug!("Mock source released");
        }
        Ok(())
    }

    fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::SeqCst)
    }

    async fn wait_ready(&self, _timeout: Duration) -> bool {
        self.is_acquired() && !self.starved.load(Ordering::SeqCst)
    }

    async fn latest_frame(&self) -> Option<FrameData> {
        if !self.is_acquired() || self.starved.load(Ordering::SeqCst) {
            return None;
        }
        let id = self.next_frame_id.fetch_add(1, Ordering::SeqCst);
        Some(self.make_frame(id))
    }
}
