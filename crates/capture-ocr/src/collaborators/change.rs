use std::sync::{Mutex, MutexGuard};

use capture_ocr_types::{CaptureFrame, PixelBuffer, Rect, Size};

use super::{ChangeDetection, ChangeDetector};

const DEFAULT_GRID: u32 = 8;
const DEFAULT_THRESHOLD: f32 = 8.0;

struct GridSnapshot {
    size: Size,
    means: Vec<f32>,
}

#[derive(Default)]
struct Baseline {
    committed: Option<GridSnapshot>,
    pending: Option<GridSnapshot>,
}

/// Block-mean change detector.
///
/// Splits the frame into an `N x N` grid, keeps each cell's mean luma from the
/// last committed frame and reports cells whose mean moved by more than
/// `threshold`.
pub struct GridDiffDetector {
    grid: u32,
    threshold: f32,
    baseline: Mutex<Baseline>,
}

impl Default for GridDiffDetector {
    fn default() -> Self {
        Self::new(DEFAULT_GRID, DEFAULT_THRESHOLD)
    }
}

impl GridDiffDetector {
    pub fn new(grid: u32, threshold: f32) -> Self {
        Self {
            grid: grid.max(1),
            threshold: threshold.max(0.0),
            baseline: Mutex::new(Baseline::default()),
        }
    }

    fn cells(&self, size: Size) -> Vec<Rect> {
        let columns = self.grid.min(size.width).max(1);
        let rows = self.grid.min(size.height).max(1);
        let mut cells = Vec::with_capacity((columns * rows) as usize);
        for row in 0..rows {
            let top = (size.height * row / rows) as i32;
            let bottom = (size.height * (row + 1) / rows) as i32;
            for col in 0..columns {
                let left = (size.width * col / columns) as i32;
                let right = (size.width * (col + 1) / columns) as i32;
                cells.push(Rect::from_edges(left, top, right, bottom));
            }
        }
        cells
    }

    fn lock_baseline(&self) -> MutexGuard<'_, Baseline> {
        self.baseline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn mean_luma(buffer: &PixelBuffer, cell: Rect) -> f32 {
    let format = buffer.format();
    let bpp = format.bytes_per_pixel();
    let mut sum = 0u64;
    for y in cell.y..cell.bottom() {
        let row = buffer.row(y as u32);
        let span = &row[cell.x as usize * bpp..cell.right() as usize * bpp];
        sum += span
            .chunks_exact(bpp)
            .map(|pixel| format.luma(pixel) as u64)
            .sum::<u64>();
    }
    let count = cell.area().max(1);
    sum as f32 / count as f32
}

impl ChangeDetector for GridDiffDetector {
    fn detect(&self, frame: &CaptureFrame) -> ChangeDetection {
        let size = frame.size();
        let cells = self.cells(size);
        let means: Vec<f32> = cells
            .iter()
            .map(|cell| mean_luma(frame.buffer(), *cell))
            .collect();

        let mut baseline = self.lock_baseline();
        let detection = match baseline.committed.as_ref() {
            Some(snapshot) if snapshot.size == size && snapshot.means.len() == means.len() => {
                let regions: Vec<Rect> = cells
                    .iter()
                    .zip(means.iter().zip(&snapshot.means))
                    .filter(|(_, (now, before))| (*now - *before).abs() > self.threshold)
                    .map(|(cell, _)| *cell)
                    .collect();
                ChangeDetection {
                    changed: !regions.is_empty(),
                    regions,
                }
            }
            _ => ChangeDetection::whole_frame(frame),
        };
        baseline.pending = Some(GridSnapshot { size, means });
        detection
    }

    fn commit(&self) {
        let mut baseline = self.lock_baseline();
        if let Some(snapshot) = baseline.pending.take() {
            baseline.committed = Some(snapshot);
        }
    }
}
