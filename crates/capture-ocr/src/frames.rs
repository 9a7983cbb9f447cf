use std::path::Path;

use capture_ocr_types::{CaptureFrame, PixelBuffer, PixelFormat, Size};
use image::{DynamicImage, GenericImageView};
use image::imageops::FilterType;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameLoadOptions {
    /// Longest side after downscaling; `None` keeps the native size.
    pub max_dimension: Option<u32>,
    /// Window size the capture came from; defaults to the image size.
    pub original_size: Option<Size>,
}

pub fn load_frame(
    path: &Path,
    options: FrameLoadOptions,
    index: u64,
) -> Result<CaptureFrame, PipelineError> {
    let image = image::open(path).map_err(|err| {
        PipelineError::invalid_input(format!("failed to load {}: {err}", path.display()))
    })?;
    frame_from_image(image, options, index)
}

/// Converts a decoded image into an RGBA capture frame, downscaling it when it
/// exceeds `max_dimension` while remembering the pre-resize window size.
pub fn frame_from_image(
    image: DynamicImage,
    options: FrameLoadOptions,
    index: u64,
) -> Result<CaptureFrame, PipelineError> {
    let (native_width, native_height) = image.dimensions();
    let native = Size::new(native_width, native_height);
    if native.is_empty() {
        return Err(PipelineError::invalid_input("image has zero size"));
    }
    let original = options.original_size.unwrap_or(native);

    let image = match options.max_dimension {
        Some(limit) if native.width.max(native.height) > limit => {
            let (width, height) = fit_within(native, limit);
            log::debug!(
                "frame={index} downscaled {}x{} -> {width}x{height}",
                native.width,
                native.height
            );
            image.resize_exact(width, height, FilterType::Triangle)
        }
        _ => image,
    };

    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let buffer = PixelBuffer::packed(width, height, PixelFormat::Rgba8, rgba.into_raw())?;
    let frame = CaptureFrame::new(buffer)
        .with_original_window_size(original)?
        .with_frame_index(Some(index));
    Ok(frame)
}

fn fit_within(size: Size, limit: u32) -> (u32, u32) {
    let longest = size.width.max(size.height).max(1) as f64;
    let scale = limit.max(1) as f64 / longest;
    let width = ((size.width as f64 * scale).round() as u32).max(1);
    let height = ((size.height as f64 * scale).round() as u32).max(1);
    (width, height)
}
