//! Frame sources feeding the session controller.
//!
//! A source is acquired while a session (or its preview) needs frames and
//! released when the session finishes. The controller only ever asks for
//! the most recent frame.

mod camera;
mod mock;
#[cfg(test)]
mod tests;

pub use camera::CameraSource;
pub use mock::MockFrameSource;

use crate::error::Result;
use crate::frame::FrameData;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Start producing frames. Acquiring an acquired source is a no-op.
    async fn acquire(&self) -> Result<()>;

    /// Stop producing frames and drop anything buffered
    async fn release(&self) -> Result<()>;

    fn is_acquired(&self) -> bool;

    /// Most recent frame, `None` when nothing has been captured yet
    async fn latest_frame(&self) -> Option<FrameData>;

    /// Wait up to `timeout` until a frame can be handed out.
    ///
    /// Sources that produce frames on demand are ready once acquired.
    async fn wait_ready(&self, _timeout: Duration) -> bool {
        self.is_acquired()
    }
}
