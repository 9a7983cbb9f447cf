use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use capture_ocr_engine::RecognitionRequest;
use capture_ocr_types::{PixelBuffer, PixelFormat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageError};
use thiserror::Error;
use tokio::task;

use crate::cli::DumpFormat;
use crate::settings::RoiDumpSettings;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("failed to write {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to encode crop: {0}")]
    Encode(#[from] ImageError),
    #[error("dump task failed: {0}")]
    Task(#[from] task::JoinError),
}

/// Writes the crops handed to the engine so selection can be inspected.
#[derive(Debug, Clone)]
pub struct RoiDumper {
    directory: PathBuf,
    format: DumpFormat,
}

impl RoiDumper {
    pub fn new(settings: RoiDumpSettings) -> Self {
        Self {
            directory: settings.dir,
            format: settings.format,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Writes one file per request, named after the frame, slot and window
    /// origin. Returns the written paths in request order.
    pub async fn write(
        &self,
        frame_index: Option<u64>,
        requests: &[RecognitionRequest],
    ) -> Result<Vec<PathBuf>, DumpError> {
        let frame = frame_index.map_or_else(|| "x".to_string(), |index| index.to_string());
        let jobs: Vec<(PathBuf, PixelBuffer)> = requests
            .iter()
            .enumerate()
            .map(|(slot, request)| {
                let origin = request.origin();
                let name = format!(
                    "frame_{frame}_roi_{slot}_{}_{}.{}",
                    origin.x,
                    origin.y,
                    self.format.extension()
                );
                (self.directory.join(name), request.image().clone())
            })
            .collect();
        let directory = self.directory.clone();
        let format = self.format;
        task::spawn_blocking(move || write_all(&directory, format, jobs)).await?
    }
}

fn write_all(
    directory: &Path,
    format: DumpFormat,
    jobs: Vec<(PathBuf, PixelBuffer)>,
) -> Result<Vec<PathBuf>, DumpError> {
    fs::create_dir_all(directory).map_err(|source| DumpError::Io {
        path: directory.to_path_buf(),
        source,
    })?;
    let mut written = Vec::with_capacity(jobs.len());
    for (path, image) in jobs {
        let encoded = encode(&image, format)?;
        fs::write(&path, encoded).map_err(|source| DumpError::Io {
            path: path.clone(),
            source,
        })?;
        written.push(path);
    }
    Ok(written)
}

fn encode(image: &PixelBuffer, format: DumpFormat) -> Result<Vec<u8>, ImageError> {
    let rgb = to_rgb(image);
    let (width, height) = (image.width(), image.height());
    let mut encoded = Vec::new();
    match format {
        DumpFormat::Png => {
            PngEncoder::new(&mut encoded).write_image(&rgb, width, height, ColorType::Rgb8)?
        }
        DumpFormat::Jpeg => JpegEncoder::new_with_quality(&mut encoded, 90).encode(
            &rgb,
            width,
            height,
            ColorType::Rgb8,
        )?,
    }
    Ok(encoded)
}

fn to_rgb(image: &PixelBuffer) -> Vec<u8> {
    let format = image.format();
    let bpp = format.bytes_per_pixel();
    let mut rgb = Vec::with_capacity(image.width() as usize * image.height() as usize * 3);
    for y in 0..image.height() {
        for pixel in image.row(y).chunks_exact(bpp) {
            let (r, g, b) = match format {
                PixelFormat::Gray8 => (pixel[0], pixel[0], pixel[0]),
                PixelFormat::Rgba8 => (pixel[0], pixel[1], pixel[2]),
                PixelFormat::Bgra8 => (pixel[2], pixel[1], pixel[0]),
            };
            rgb.extend_from_slice(&[r, g, b]);
        }
    }
    rgb
}
