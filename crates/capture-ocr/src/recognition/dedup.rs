use capture_ocr_types::DetectedTextRegion;

/// Removes the same text reported twice by overlapping crops.
///
/// Two regions are duplicates when their bounds overlap with an IoU of at
/// least `iou_threshold` and one trimmed text equals or contains the other.
/// The shorter text loses; equal lengths drop the lower confidence, and a full
/// tie drops the later region. Survivors keep their input order.
#[derive(Debug, Clone, Copy)]
pub struct Deduplicator {
    iou_threshold: f32,
}

impl Deduplicator {
    pub fn new(iou_threshold: f32) -> Self {
        Self { iou_threshold }
    }

    pub fn dedup(&self, regions: Vec<DetectedTextRegion>) -> Vec<DetectedTextRegion> {
        let mut keep = vec![true; regions.len()];
        for i in 0..regions.len() {
            for j in (i + 1)..regions.len() {
                if !keep[i] {
                    break;
                }
                if !keep[j] || !self.is_duplicate(&regions[i], &regions[j]) {
                    continue;
                }
                let loser = if prefers_later(&regions[i], &regions[j]) { i } else { j };
                keep[loser] = false;
            }
        }

        let before = regions.len();
        let kept: Vec<DetectedTextRegion> = regions
            .into_iter()
            .zip(keep)
            .filter_map(|(region, keep)| keep.then_some(region))
            .collect();
        if kept.len() != before {
            log::debug!("dedup dropped={} kept={}", before - kept.len(), kept.len());
        }
        kept
    }

    fn is_duplicate(&self, a: &DetectedTextRegion, b: &DetectedTextRegion) -> bool {
        if a.bounds.iou(&b.bounds) < self.iou_threshold {
            return false;
        }
        let a = a.text.trim();
        let b = b.text.trim();
        a == b || a.contains(b) || b.contains(a)
    }
}

/// True when `later` should survive over `earlier`.
fn prefers_later(earlier: &DetectedTextRegion, later: &DetectedTextRegion) -> bool {
    let earlier_len = earlier.text.trim().chars().count();
    let later_len = later.text.trim().chars().count();
    if earlier_len != later_len {
        return later_len > earlier_len;
    }
    later.confidence > earlier.confidence
}
