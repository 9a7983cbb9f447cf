//! Shared domain models for the capture-ocr workspace.
//!
//! This crate centralizes the lightweight data structures used by the engine
//! seam and the recognition core: pixel geometry, captured frames, learned
//! regions of interest and finalized text detections. Keep it free of runtime
//! and platform dependencies so every crate can depend on it cheaply.

mod geometry;
mod roi;
mod text;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use geometry::{NormalizedRect, Point, Rect, Size};
pub use roi::{RegionOfInterest, RegionType, RoiConfidence};
pub use text::{DetectedTextRegion, WritingDirection};

/// Rectangle flagged as changed by the upstream change detector. Lives for one frame.
pub type ChangeRegion = Rect;

pub type FrameResult<T> = Result<T, FrameError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Gray8,
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }

    /// BT.601 luma of a single pixel in this format.
    pub fn luma(self, pixel: &[u8]) -> u8 {
        let (r, g, b) = match self {
            PixelFormat::Gray8 => return pixel[0],
            PixelFormat::Rgba8 => (pixel[0], pixel[1], pixel[2]),
            PixelFormat::Bgra8 => (pixel[2], pixel[1], pixel[0]),
        };
        ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
    }
}

/// Immutable, reference-counted pixel storage.
#[derive(Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Arc<[u8]>,
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl PixelBuffer {
    pub fn from_owned(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> FrameResult<Self> {
        if width == 0 || height == 0 {
            return Err(FrameError::invalid(format!(
                "frame has zero size ({width}x{height})"
            )));
        }
        let row_bytes = (width as usize)
            .checked_mul(format.bytes_per_pixel())
            .ok_or_else(|| FrameError::invalid("row length overflowed"))?;
        if stride < row_bytes {
            return Err(FrameError::invalid(format!(
                "stride {stride} is smaller than row length {row_bytes}"
            )));
        }
        let required = stride
            .checked_mul(height as usize)
            .ok_or_else(|| FrameError::invalid("calculated buffer length overflowed"))?;
        if data.len() < required {
            return Err(FrameError::invalid(format!(
                "insufficient pixel bytes: got {} expected at least {}",
                data.len(),
                required
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            format,
            data: Arc::from(data.into_boxed_slice()),
        })
    }

    /// Tightly packed buffer (stride equals row length).
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> FrameResult<Self> {
        let stride = width as usize * format.bytes_per_pixel();
        Self::from_owned(width, height, stride, format, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel bytes of row `y`, without stride padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * self.format.bytes_per_pixel()]
    }

    /// Copies `region` into a new packed buffer.
    pub fn crop(&self, region: Rect) -> FrameResult<PixelBuffer> {
        if region.is_empty() || !self.size().bounds().contains(&region) {
            return Err(FrameError::RegionOutOfBounds {
                region,
                width: self.width,
                height: self.height,
            });
        }
        let bpp = self.format.bytes_per_pixel();
        let left = region.x as usize * bpp;
        let row_len = region.width as usize * bpp;
        let mut data = Vec::with_capacity(row_len * region.height as usize);
        for y in region.y..region.bottom() {
            let row = self.row(y as u32);
            data.extend_from_slice(&row[left..left + row_len]);
        }
        PixelBuffer::packed(region.width as u32, region.height as u32, self.format, data)
    }
}

/// A captured frame handed to one pipeline run.
///
/// `buffer` holds the pixels recognition actually sees. When the capture was
/// downsized before recognition, `original_window_size` keeps the pre-resize
/// dimensions so detections can be restored to display scale.
#[derive(Clone)]
pub struct CaptureFrame {
    buffer: PixelBuffer,
    original_window_size: Size,
    capture_region: Option<Rect>,
    frame_index: Option<u64>,
    timestamp: Option<Duration>,
}

impl fmt::Debug for CaptureFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureFrame")
            .field("buffer", &self.buffer)
            .field("original_window_size", &self.original_window_size)
            .field("capture_region", &self.capture_region)
            .field("frame_index", &self.frame_index)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl CaptureFrame {
    pub fn new(buffer: PixelBuffer) -> Self {
        let original_window_size = buffer.size();
        Self {
            buffer,
            original_window_size,
            capture_region: None,
            frame_index: None,
            timestamp: None,
        }
    }

    pub fn with_original_window_size(mut self, size: Size) -> FrameResult<Self> {
        if size.is_empty() {
            return Err(FrameError::invalid(format!(
                "original window size has zero area ({}x{})",
                size.width, size.height
            )));
        }
        self.original_window_size = size;
        Ok(self)
    }

    pub fn with_capture_region(mut self, region: Option<Rect>) -> Self {
        self.capture_region = region;
        self
    }

    pub fn with_frame_index(mut self, index: Option<u64>) -> Self {
        self.frame_index = index;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Option<Duration>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn size(&self) -> Size {
        self.buffer.size()
    }

    pub fn original_window_size(&self) -> Size {
        self.original_window_size
    }

    pub fn capture_region(&self) -> Option<Rect> {
        self.capture_region
    }

    pub fn frame_index(&self) -> Option<u64> {
        self.frame_index
    }

    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp
    }

    pub fn is_rescaled(&self) -> bool {
        self.original_window_size != self.size()
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("region {region:?} lies outside the {width}x{height} frame")]
    RegionOutOfBounds { region: Rect, width: u32, height: u32 },
}

impl FrameError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        let data = (0..width * height).map(|v| (v % 251) as u8).collect();
        PixelBuffer::packed(width, height, PixelFormat::Gray8, data).unwrap()
    }

    #[test]
    fn rejects_zero_sized_frames() {
        let err = PixelBuffer::packed(0, 10, PixelFormat::Gray8, Vec::new()).unwrap_err();
        assert!(matches!(err, FrameError::InvalidFrame { .. }));
    }

    #[test]
    fn rejects_short_buffers() {
        let err = PixelBuffer::packed(4, 4, PixelFormat::Rgba8, vec![0; 63]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidFrame { .. }));
    }

    #[test]
    fn crop_copies_the_requested_window() {
        let buffer = gradient(10, 10);
        let crop = buffer.crop(Rect::new(2, 3, 4, 2)).unwrap();
        assert_eq!(crop.size(), Size::new(4, 2));
        assert_eq!(crop.row(0), &buffer.row(3)[2..6]);
        assert_eq!(crop.row(1), &buffer.row(4)[2..6]);
    }

    #[test]
    fn crop_outside_frame_is_an_error() {
        let buffer = gradient(10, 10);
        let err = buffer.crop(Rect::new(8, 8, 4, 4)).unwrap_err();
        assert!(matches!(err, FrameError::RegionOutOfBounds { .. }));
    }

    #[test]
    fn strided_rows_skip_padding() {
        let mut data = vec![0u8; 2 * 8];
        data[..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        data[8..14].copy_from_slice(&[7, 8, 9, 10, 11, 12]);
        let buffer = PixelBuffer::from_owned(2, 2, 8, PixelFormat::Gray8, data).unwrap();
        assert_eq!(buffer.row(1), &[7, 8]);
    }

    #[test]
    fn original_size_defaults_to_buffer_size() {
        let frame = CaptureFrame::new(gradient(8, 6));
        assert_eq!(frame.original_window_size(), Size::new(8, 6));
        assert!(!frame.is_rescaled());
        let scaled = frame
            .with_original_window_size(Size::new(16, 12))
            .unwrap();
        assert!(scaled.is_rescaled());
    }

    #[test]
    fn luma_respects_channel_order() {
        assert_eq!(PixelFormat::Rgba8.luma(&[255, 0, 0, 255]), 76);
        assert_eq!(PixelFormat::Bgra8.luma(&[0, 0, 255, 255]), 76);
    }
}
