use crate::error::EncodeError;
#[cfg(feature = "jpeg")]
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Already JPEG compressed, as delivered by MJPEG cameras
    Mjpeg,
    /// Packed 8-bit RGB
    Rgb24,
}

impl FrameFormat {
    /// Bytes per pixel, or `None` for compressed layouts
    pub fn pixel_stride(&self) -> Option<usize> {
        match self {
            FrameFormat::Mjpeg => None,
            FrameFormat::Rgb24 => Some(3),
        }
    }
}

/// One image from a frame source. Cloning shares the pixel data.
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Monotonic per-source identifier
    pub id: u64,
    pub timestamp: SystemTime,
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
}

impl FrameData {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    fn expected_len(&self) -> Option<usize> {
        self.format
            .pixel_stride()
            .map(|stride| self.width as usize * self.height as usize * stride)
    }

    /// Whether the payload length matches the dimensions. Compressed frames
    /// always pass.
    pub fn validate_size(&self) -> bool {
        self.expected_len()
            .map_or(true, |expected| self.data.len() == expected)
    }
}

/// Turns frames into the JPEG bytes that are stored and sent for scoring
pub struct FrameProcessor;

impl FrameProcessor {
    /// MJPEG payloads are passed through untouched; RGB frames are
    /// compressed at `quality` (clamped to 1..=100).
    pub fn encode_jpeg(frame: &FrameData, quality: u8) -> Result<Arc<Vec<u8>>, EncodeError> {
        match (frame.format, frame.expected_len()) {
            (FrameFormat::Mjpeg, _) => Ok(Arc::clone(&frame.data)),
            (FrameFormat::Rgb24, Some(expected)) if frame.data.len() != expected => {
                Err(EncodeError::SizeMismatch {
                    frame_id: frame.id,
                    expected,
                    actual: frame.data.len(),
                })
            }
            (FrameFormat::Rgb24, _) => Self::encode_rgb(frame, quality),
        }
    }

    #[cfg(feature = "jpeg")]
    fn encode_rgb(frame: &FrameData, quality: u8) -> Result<Arc<Vec<u8>>, EncodeError> {
        let mut out = Vec::with_capacity(frame.data.len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .encode(&frame.data, frame.width, frame.height, image::ColorType::Rgb8)
            .map_err(|e| EncodeError::Jpeg {
                details: e.to_string(),
            })?;

        tracing::trace!(
            "Frame {} compressed to {} bytes (q={})",
            frame.id,
            out.len(),
            quality
        );
        Ok(Arc::new(out))
    }

    #[cfg(not(feature = "jpeg"))]
    fn encode_rgb(frame: &FrameData, _quality: u8) -> Result<Arc<Vec<u8>>, EncodeError> {
        tracing::warn!("Frame {} is raw RGB but built without jpeg support", frame.id);
        Err(EncodeError::Unsupported {
            format: format!("{:?}", frame.format),
        })
    }
}
