use super::FrameSource;
use crate::config::CameraConfig;
use crate::error::Result;
use crate::frame::{FrameData, FrameFormat};
use crate::ring_buffer::RingBuffer;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

#[cfg(all(feature = "camera", target_os = "linux"))]
use crate::error::SourceError;
#[cfg(all(feature = "camera", target_os = "linux"))]
use gstreamer::prelude::*;
#[cfg(all(feature = "camera", target_os = "linux"))]
use gstreamer::Pipeline;
#[cfg(all(feature = "camera", target_os = "linux"))]
use gstreamer_app::AppSink;
#[cfg(all(feature = "camera", target_os = "linux"))]
use gstreamer_video::VideoInfo;

/// Frames kept by the camera's buffer; only the newest is ever read
const BUFFER_CAPACITY: usize = 4;

struct CaptureLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    #[cfg(all(feature = "camera", target_os = "linux"))]
    pipeline: Pipeline,
}

/// Camera backed by a GStreamer V4L2 pipeline when built with the `camera`
/// feature, or by a synthetic RGB test pattern otherwise.
pub struct CameraSource {
    config: CameraConfig,
    buffer: Arc<RingBuffer>,
    frame_counter: Arc<AtomicU64>,
    acquired: AtomicBool,
    capture: Mutex<Option<CaptureLoop>>,
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Self {
        info!(
            "Creating camera source for device {} ({}x{} @ {}fps)",
            config.index, config.resolution.0, config.resolution.1, config.fps
        );

        Self {
            config,
            buffer: Arc::new(RingBuffer::new(BUFFER_CAPACITY)),
            frame_counter: Arc::new(AtomicU64::new(0)),
            acquired: AtomicBool::new(false),
            capture: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    #[cfg(all(feature = "camera", target_os = "linux"))]
    fn build_pipeline_string(&self) -> String {
        let (width, height) = self.config.resolution;
        format!(
            "v4l2src device=/dev/video{} io-mode=mmap do-timestamp=true ! \
             image/jpeg,width={},height={},framerate={}/1 ! \
             queue max-size-buffers=4 leaky=downstream ! \
             appsink name=sink sync=false max-buffers=2 drop=true emit-signals=false",
            self.config.index, width, height, self.config.fps
        )
    }

    #[cfg(all(feature = "camera", target_os = "linux"))]
    async fn start_capture(&self) -> Result<CaptureLoop> {
        gstreamer::init().map_err(|e| SourceError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let description = self.build_pipeline_string();
        info!("Creating GStreamer pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| SourceError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| SourceError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| SourceError::Configuration {
                details: "Pipeline has no appsink".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| SourceError::Configuration {
                details: "Sink element is not an AppSink".to_string(),
            })?;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    let _ = tx.send(sample);
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| SourceError::CaptureStream {
                details: format!("Failed to start pipeline: {}", e),
            })?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let buffer = Arc::clone(&self.buffer);
        let frame_counter = Arc::clone(&self.frame_counter);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    sample = rx.recv() => {
                        let Some(sample) = sample else { break };
                        if let Err(e) = Self::process_sample(sample, &frame_counter, &buffer).await {
                            error!("Error processing GStreamer sample: {}", e);
                        }
                    }
                }
            }
            debug!("GStreamer capture loop stopped");
        });

        Ok(CaptureLoop {
            cancel,
            task,
            pipeline,
        })
    }

    #[cfg(all(feature = "camera", target_os = "linux"))]
    async fn process_sample(
        sample: gstreamer::Sample,
        frame_counter: &AtomicU64,
        buffer: &RingBuffer,
    ) -> Result<()> {
        let gst_buffer = sample.buffer().ok_or_else(|| SourceError::CaptureStream {
            details: "No buffer in sample".to_string(),
        })?;
        let caps = sample.caps().ok_or_else(|| SourceError::CaptureStream {
            details: "No caps in sample".to_string(),
        })?;
        let video_info = VideoInfo::from_caps(caps).map_err(|e| SourceError::CaptureStream {
            details: format!("Failed to get video info: {}", e),
        })?;
        let map = gst_buffer
            .map_readable()
            .map_err(|e| SourceError::CaptureStream {
                details: format!("Failed to map buffer: {}", e),
            })?;

        let frame_id = frame_counter.fetch_add(1, Ordering::Relaxed);
        trace!("Captured MJPEG frame {} ({} bytes)", frame_id, map.len());

        buffer
            .push_frame(FrameData::new(
                frame_id,
                SystemTime::now(),
                map.as_slice().to_vec(),
                video_info.width(),
                video_info.height(),
                FrameFormat::Mjpeg,
            ))
            .await;
        Ok(())
    }

    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    async fn start_capture(&self) -> Result<CaptureLoop> {
        warn!("Camera support not compiled in; generating a synthetic test pattern");

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let buffer = Arc::clone(&self.buffer);
        let frame_counter = Arc::clone(&self.frame_counter);
        let (width, height) = self.config.resolution;
        let frame_interval = Duration::from_millis(1000 / self.config.fps.max(1) as u64);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let frame_id = frame_counter.fetch_add(1, Ordering::Relaxed);
                        let data = test_pattern(width, height, frame_id);
                        trace!("Generated test pattern frame {}", frame_id);
                        buffer
                            .push_frame(FrameData::new(
                                frame_id,
                                SystemTime::now(),
                                data,
                                width,
                                height,
                                FrameFormat::Rgb24,
                            ))
                            .await;
                    }
                }
            }
            debug!("Test pattern loop stopped");
        });

        Ok(CaptureLoop { cancel, task })
    }
}

/// Diagonal RGB gradient that drifts with the frame id
#[cfg_attr(all(feature = "camera", target_os = "linux"), allow(dead_code))]
fn test_pattern(width: u32, height: u32, frame_id: u64) -> Vec<u8> {
    let shift = (frame_id % 256) as u32;
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            data.push(((x + shift) % 256) as u8);
            data.push(((y + shift) % 256) as u8);
            data.push(((x + y) % 256) as u8);
        }
    }
    data
}

#[async_trait]
impl FrameSource for CameraSource {
    async fn acquire(&self) -> Result<()> {
        let mut capture = self.capture.lock().await;
        if capture.is_some() {
            debug!("Camera already acquired");
            return Ok(());
        }

        *capture = Some(self.start_capture().await?);
        self.acquired.store(true, Ordering::Release);
        info!("Camera acquired");
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        let Some(capture) = self.capture.lock().await.take() else {
            debug!("Camera not acquired; nothing to release");
            return Ok(());
        };

        self.acquired.store(false, Ordering::Release);
        capture.cancel.cancel();

        #[cfg(all(feature = "camera", target_os = "linux"))]
        if let Err(e) = capture.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop GStreamer pipeline: {}", e);
        }

        match tokio::time::timeout(Duration::from_secs(3), capture.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Camera capture task failed: {}", e),
            Err(_) => warn!("Camera capture task did not stop within timeout"),
        }

        self.buffer.clear().await;
        info!("Camera released");
        Ok(())
    }

    fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::Acquire)
    }

    async fn latest_frame(&self) -> Option<FrameData> {
        if !self.is_acquired() {
            return None;
        }
        self.buffer.get_latest_frame().await
    }

    /// A freshly started capture loop needs a moment before the first frame
    async fn wait_ready(&self, timeout: Duration) -> bool {
        if !self.is_acquired() {
            return false;
        }
        self.buffer.wait_for_frame(timeout).await.is_some()
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_pattern_has_rgb_size() {
        let data = test_pattern(4, 3, 7);
        assert_eq!(data.len(), 4 * 3 * 3);
        assert_eq!(&data[..3], &[7, 7, 0]);
    }
}
