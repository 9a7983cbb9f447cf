use std::fmt;
use std::sync::Arc;

use capture_ocr_types::{ChangeRegion, Rect, RegionOfInterest, RoiConfidence, Size};

use super::merge::merge_line_neighbours;
use crate::collaborators::{RegionMerger, RoiLearner};
use crate::settings::SelectionSettings;

/// Low-confidence learned regions need this many sightings before they count.
const MIN_LOW_CONFIDENCE_DETECTIONS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    Disabled,
    NoCandidates,
    TooManyRegions { count: usize },
    CoverageExceeded { ratio: f32 },
    RegionTooSmall { region: Rect },
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Disabled => write!(f, "partial recognition disabled"),
            FallbackReason::NoCandidates => write!(f, "no candidate regions"),
            FallbackReason::TooManyRegions { count } => write!(f, "{count} regions after merge"),
            FallbackReason::CoverageExceeded { ratio } => {
                write!(f, "candidates cover {:.1}% of the frame", ratio * 100.0)
            }
            FallbackReason::RegionTooSmall { region } => {
                write!(f, "region {}x{} is below the minimum", region.width, region.height)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegionSelection {
    Partial(Vec<Rect>),
    FullFrame(FallbackReason),
}

impl RegionSelection {
    /// Regions to crop; empty means recognize the full frame.
    pub fn candidates(&self) -> &[Rect] {
        match self {
            RegionSelection::Partial(rects) => rects,
            RegionSelection::FullFrame(_) => &[],
        }
    }

    pub fn is_full_frame(&self) -> bool {
        matches!(self, RegionSelection::FullFrame(_))
    }
}

/// Decides which parts of a frame are worth recognizing.
pub struct RegionSelector {
    settings: SelectionSettings,
    learner: Arc<dyn RoiLearner>,
    merger: Arc<dyn RegionMerger>,
}

impl RegionSelector {
    pub fn new(
        settings: SelectionSettings,
        learner: Arc<dyn RoiLearner>,
        merger: Arc<dyn RegionMerger>,
    ) -> Self {
        Self {
            settings,
            learner,
            merger,
        }
    }

    pub fn settings(&self) -> &SelectionSettings {
        &self.settings
    }

    pub fn select(&self, frame: Size, changes: &[ChangeRegion]) -> RegionSelection {
        if !self.settings.enable_partial_recognition {
            return RegionSelection::FullFrame(FallbackReason::Disabled);
        }

        let changes: Vec<Rect> = changes
            .iter()
            .map(|rect| rect.clamp_to(frame))
            .filter(|rect| !rect.is_empty())
            .collect();
        let learned = self.learned_regions(frame);

        let candidates = if learned.is_empty() {
            let mut candidates = changes;
            candidates.extend(self.heatmap_cells(frame));
            candidates
        } else {
            // Learned rects already carry their padding.
            let fresh: Vec<Rect> = changes
                .into_iter()
                .filter(|change| !learned.iter().any(|known| known.intersects(change)))
                .collect();
            log::debug!(
                "learned={} new_change_regions={}",
                learned.len(),
                fresh.len()
            );
            let mut candidates = learned;
            candidates.extend(fresh);
            candidates
        };

        if candidates.is_empty() {
            return RegionSelection::FullFrame(FallbackReason::NoCandidates);
        }

        let mut merged = merge_line_neighbours(
            &candidates,
            self.settings.merge_vertical_overlap,
            self.settings.merge_horizontal_gap_px,
        );
        if merged.len() > self.settings.max_merged_regions {
            merged = self.merger.merge_adjacent(&merged);
        }

        let expanded: Vec<Rect> = merged
            .iter()
            .map(|rect| self.expand(*rect, frame))
            .filter(|rect| !rect.is_empty())
            .collect();

        match check_fallback(&expanded, frame, &self.settings) {
            Some(reason) => {
                log::debug!("full-frame fallback: {reason}");
                RegionSelection::FullFrame(reason)
            }
            None => RegionSelection::Partial(expanded),
        }
    }

    fn learned_regions(&self, frame: Size) -> Vec<Rect> {
        if !self.learner.is_enabled() {
            return Vec::new();
        }
        let pad = self.settings.learned_region_padding_px;
        self.learner
            .all_regions()
            .iter()
            .filter(|roi| is_usable(roi))
            .map(|roi| roi.rect.to_pixels(frame).inflate(pad, pad).clamp_to(frame))
            .filter(|rect| !rect.is_empty())
            .collect()
    }

    fn heatmap_cells(&self, frame: Size) -> Vec<Rect> {
        if !self.learner.is_enabled() {
            return Vec::new();
        }
        let grid = self.settings.grid_size.max(1);
        let mut cells = Vec::new();
        for row in 0..grid {
            for col in 0..grid {
                let center_x = (col as f32 + 0.5) / grid as f32;
                let center_y = (row as f32 + 0.5) / grid as f32;
                if self.learner.heatmap_value_at(center_x, center_y) < self.settings.heatmap_threshold {
                    continue;
                }
                let left = (frame.width * col / grid) as i32;
                let right = (frame.width * (col + 1) / grid) as i32;
                let top = (frame.height * row / grid) as i32;
                let bottom = (frame.height * (row + 1) / grid) as i32;
                cells.push(Rect::from_edges(left, top, right, bottom));
            }
        }
        cells
    }

    /// Grows a rect so glyphs at its edges are not clipped, then pads and clamps.
    pub fn expand(&self, rect: Rect, frame: Size) -> Rect {
        let dx = (rect.width as f64 * self.settings.horizontal_expansion_ratio as f64).ceil() as i32;
        let dy = (rect.height as f64 * self.settings.vertical_expansion_ratio as f64 / 2.0).ceil()
            as i32;
        let pad = self.settings.padding_px;
        rect.inflate(dx + pad, dy + pad).clamp_to(frame)
    }
}

fn is_usable(roi: &RegionOfInterest) -> bool {
    if roi.is_exclusion() {
        return false;
    }
    !(roi.confidence == RoiConfidence::Low && roi.detection_count < MIN_LOW_CONFIDENCE_DETECTIONS)
}

/// Returns why `rects` should not be used as a partial selection, if at all.
pub(crate) fn check_fallback(
    rects: &[Rect],
    frame: Size,
    settings: &SelectionSettings,
) -> Option<FallbackReason> {
    if rects.is_empty() {
        return Some(FallbackReason::NoCandidates);
    }
    if rects.len() > settings.max_merged_regions {
        return Some(FallbackReason::TooManyRegions { count: rects.len() });
    }
    let covered: u64 = rects.iter().map(Rect::area).sum();
    let ratio = covered as f64 / frame.area().max(1) as f64;
    if ratio > settings.max_coverage_ratio as f64 {
        return Some(FallbackReason::CoverageExceeded {
            ratio: ratio as f32,
        });
    }
    rects
        .iter()
        .find(|rect| {
            (rect.width as u32) < settings.min_region_width
                || (rect.height as u32) < settings.min_region_height
        })
        .map(|rect| FallbackReason::RegionTooSmall { region: *rect })
}

#[cfg(test)]
mod tests {
    use capture_ocr_types::{NormalizedRect, RegionType};

    use super::*;
    use crate::collaborators::SnapshotRoiLearner;
    use crate::region::ProximityMerger;

    const FRAME: Size = Size::new(1920, 1080);

    fn selector(learner: SnapshotRoiLearner) -> RegionSelector {
        selector_with(learner, SelectionSettings::default())
    }

    fn selector_with(learner: SnapshotRoiLearner, settings: SelectionSettings) -> RegionSelector {
        RegionSelector::new(settings, Arc::new(learner), Arc::new(ProximityMerger::default()))
    }

    fn hud_region() -> RegionOfInterest {
        RegionOfInterest::content(
            NormalizedRect::new(0.2, 0.09, 0.08, 0.04),
            RoiConfidence::High,
            10,
        )
    }

    #[test]
    fn learned_region_is_padded_expanded_and_clamped() {
        let selection = selector(SnapshotRoiLearner::new(vec![hud_region()])).select(FRAME, &[]);
        assert_eq!(
            selection,
            RegionSelection::Partial(vec![Rect::new(349, 78, 224, 82)])
        );
    }

    #[test]
    fn change_regions_inside_learned_areas_are_dropped() {
        let changes = [Rect::new(400, 100, 50, 20), Rect::new(1200, 700, 300, 80)];
        let selection = selector(SnapshotRoiLearner::new(vec![hud_region()])).select(FRAME, &changes);
        let candidates = selection.candidates();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], Rect::new(349, 78, 224, 82));
        assert!(candidates[1].contains(&changes[1]));
    }

    #[test]
    fn change_regions_just_outside_the_learned_padding_are_kept() {
        // The padded HUD rect starts at y=92; this change ends at y=89.
        let change = Rect::new(400, 44, 80, 45);
        let selection = selector(SnapshotRoiLearner::new(vec![hud_region()])).select(FRAME, &[change]);
        let candidates = selection.candidates();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], Rect::new(349, 78, 224, 82));
        assert!(candidates[1].contains(&change));
    }

    #[test]
    fn exclusions_and_unproven_regions_are_ignored() {
        let mut exclusion = hud_region();
        exclusion.region_type = RegionType::Exclusion;
        let unproven = RegionOfInterest::content(
            NormalizedRect::new(0.5, 0.5, 0.1, 0.05),
            RoiConfidence::Low,
            2,
        );
        let selection =
            selector(SnapshotRoiLearner::new(vec![exclusion, unproven])).select(FRAME, &[]);
        assert_eq!(
            selection,
            RegionSelection::FullFrame(FallbackReason::NoCandidates)
        );
    }

    #[test]
    fn heatmap_cells_supplement_change_regions() {
        let mut values = vec![0.0; 16];
        values[5] = 0.4;
        let learner = SnapshotRoiLearner::new(Vec::new()).with_heatmap(4, 4, values);
        let selection = selector(learner).select(Size::new(800, 800), &[]);
        let candidates = selection.candidates();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].contains(&Rect::new(200, 200, 200, 200)));
    }

    #[test]
    fn disabled_learner_skips_heatmap() {
        let learner = SnapshotRoiLearner::disabled().with_heatmap(1, 1, vec![1.0]);
        let selection = selector(learner).select(FRAME, &[]);
        assert!(selection.is_full_frame());
    }

    #[test]
    fn disabled_partial_recognition_uses_full_frame() {
        let settings = SelectionSettings {
            enable_partial_recognition: false,
            ..SelectionSettings::default()
        };
        let selection =
            selector_with(SnapshotRoiLearner::new(vec![hud_region()]), settings).select(FRAME, &[]);
        assert_eq!(selection, RegionSelection::FullFrame(FallbackReason::Disabled));
        assert!(selection.candidates().is_empty());
    }

    #[test]
    fn coverage_above_limit_falls_back() {
        let settings = SelectionSettings {
            max_coverage_ratio: 0.8,
            ..SelectionSettings::default()
        };
        let frame = Size::new(1000, 1000);
        let rects = [Rect::new(0, 0, 1000, 405), Rect::new(0, 500, 1000, 405)];
        assert!(matches!(
            check_fallback(&rects, frame, &settings),
            Some(FallbackReason::CoverageExceeded { .. })
        ));
        let within = [Rect::new(0, 0, 1000, 400), Rect::new(0, 500, 1000, 400)];
        assert_eq!(check_fallback(&within, frame, &settings), None);
    }

    #[test]
    fn large_change_area_selects_full_frame() {
        let learner = SnapshotRoiLearner::new(Vec::new());
        let selection = selector(learner).select(Size::new(1000, 1000), &[Rect::new(50, 50, 900, 900)]);
        assert!(matches!(
            selection,
            RegionSelection::FullFrame(FallbackReason::CoverageExceeded { .. })
        ));
    }

    #[test]
    fn tiny_regions_fall_back() {
        let settings = SelectionSettings::default();
        let reason = check_fallback(&[Rect::new(0, 0, 120, 30)], FRAME, &settings);
        assert_eq!(
            reason,
            Some(FallbackReason::RegionTooSmall {
                region: Rect::new(0, 0, 120, 30)
            })
        );
    }

    #[test]
    fn too_many_regions_fall_back_after_generic_merge() {
        let settings = SelectionSettings {
            max_merged_regions: 2,
            ..SelectionSettings::default()
        };
        let changes: Vec<Rect> = (0..4)
            .map(|i| Rect::new(i * 450, i * 250, 60, 60))
            .collect();
        let selection =
            selector_with(SnapshotRoiLearner::new(Vec::new()), settings).select(FRAME, &changes);
        assert_eq!(
            selection,
            RegionSelection::FullFrame(FallbackReason::TooManyRegions { count: 4 })
        );
    }

    #[test]
    fn expansion_never_leaves_the_frame() {
        let selector = selector(SnapshotRoiLearner::new(Vec::new()));
        for rect in [
            Rect::new(0, 0, 100, 40),
            Rect::new(1850, 1050, 70, 30),
            Rect::new(-10, -10, 2000, 1200),
            Rect::new(960, 540, 1, 1),
        ] {
            let expanded = selector.expand(rect, FRAME);
            assert!(FRAME.bounds().contains(&expanded), "{rect:?} -> {expanded:?}");
        }
    }
}
