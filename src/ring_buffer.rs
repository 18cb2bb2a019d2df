use crate::frame::FrameData;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, trace};

/// Bounded ring of the most recent frames written by a capture loop.
///
/// Readers only ever look at the newest entry; older entries are dropped
/// as the ring fills up.
pub struct RingBuffer {
    inner: RwLock<Ring>,
    arrivals: Notify,
    capacity: usize,
}

struct Ring {
    frames: VecDeque<FrameData>,
    stats: RingBufferStats,
}

/// Counters kept alongside the ring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RingBufferStats {
    pub frames_pushed: u64,
    /// Frames evicted before anyone could read them as the latest
    pub frames_dropped: u64,
    pub clears: u64,
}

impl RingBuffer {
    /// Create a ring holding at most `capacity` frames (minimum one).
    ///
    /// ```
    /// use evalcam::ring_buffer::RingBuffer;
    ///
    /// let buffer = RingBuffer::new(4);
    /// assert_eq!(buffer.capacity(), 4);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!("Created frame ring with capacity {}", capacity);
        Self {
            inner: RwLock::new(Ring {
                frames: VecDeque::with_capacity(capacity),
                stats: RingBufferStats::default(),
            }),
            arrivals: Notify::new(),
            capacity,
        }
    }

    pub async fn push_frame(&self, frame: FrameData) {
        let mut ring = self.inner.write().await;
        trace!("Buffered frame {} ({} held)", frame.id, ring.frames.len());

        if ring.frames.len() == self.capacity {
            ring.frames.pop_front();
            ring.stats.frames_dropped += 1;
        }
        ring.frames.push_back(frame);
        ring.stats.frames_pushed += 1;
        drop(ring);

        self.arrivals.notify_waiters();
    }

    /// Newest frame, or `None` when nothing was pushed since creation or the
    /// last [`clear`](Self::clear).
    pub async fn get_latest_frame(&self) -> Option<FrameData> {
        self.inner.read().await.frames.back().cloned()
    }

    /// Newest frame, waiting up to `timeout` for one to be pushed when the
    /// ring is empty
    pub async fn wait_for_frame(&self, timeout: Duration) -> Option<FrameData> {
        let wait = async {
            loop {
                let arrival = self.arrivals.notified();
                tokio::pin!(arrival);
                // Register before looking so a push in between is not missed
                arrival.as_mut().enable();

                if let Some(frame) = self.get_latest_frame().await {
                    return frame;
                }
                arrival.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.ok()
    }

    pub async fn clear(&self) {
        let mut ring = self.inner.write().await;
        ring.frames.clear();
        ring.stats.clears += 1;
        debug!("Frame ring cleared");
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.frames.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn stats(&self) -> RingBufferStats {
        self.inner.read().await.stats.clone()
    }
}
