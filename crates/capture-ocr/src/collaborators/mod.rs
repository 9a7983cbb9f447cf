//! Seams to the components this crate consumes but does not own.

pub mod change;
pub mod learner;

use capture_ocr_types::{CaptureFrame, ChangeRegion, Rect, RegionOfInterest};

pub use change::GridDiffDetector;
pub use learner::SnapshotRoiLearner;

/// Read-only view of the adaptive "where does text usually appear" learner.
pub trait RoiLearner: Send + Sync {
    fn is_enabled(&self) -> bool;

    fn all_regions(&self) -> Vec<RegionOfInterest>;

    /// Text likelihood in `[0, 1]` at a normalized frame position.
    fn heatmap_value_at(&self, norm_x: f32, norm_y: f32) -> f32;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeDetection {
    pub changed: bool,
    pub regions: Vec<ChangeRegion>,
}

impl ChangeDetection {
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn whole_frame(frame: &CaptureFrame) -> Self {
        Self {
            changed: true,
            regions: vec![frame.size().bounds()],
        }
    }
}

/// Upstream stage that flags which parts of a frame changed.
///
/// `detect` compares against the committed reference without replacing it.
/// The executor calls `commit` once the detected frame was recognized, so a
/// frame whose recognition failed or was cancelled is compared again.
pub trait ChangeDetector: Send + Sync {
    fn detect(&self, frame: &CaptureFrame) -> ChangeDetection;

    /// Makes the frame seen by the last `detect` the new reference.
    fn commit(&self) {}
}

/// Generic proximity merge used when too many candidates survive selection.
pub trait RegionMerger: Send + Sync {
    fn merge_adjacent(&self, rects: &[Rect]) -> Vec<Rect>;
}
