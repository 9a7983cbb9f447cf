use capture_ocr_types::Rect;

use crate::collaborators::RegionMerger;

const DEFAULT_MERGE_DISTANCE: i32 = 20;

/// Joins rects that sit on the same text line.
///
/// Two rects join when their vertical overlap is at least
/// `min_vertical_overlap` of the shorter one and they either intersect or are
/// separated horizontally by at most `max_gap` pixels. Repeats until stable.
pub fn merge_line_neighbours(rects: &[Rect], min_vertical_overlap: f32, max_gap: i32) -> Vec<Rect> {
    merge_until_stable(rects, |a, b| {
        same_line(a, b, min_vertical_overlap) && horizontal_gap(a, b) <= max_gap
    })
}

fn same_line(a: &Rect, b: &Rect, min_overlap: f32) -> bool {
    let overlap = a.bottom().min(b.bottom()) - a.y.max(b.y);
    if overlap <= 0 {
        return false;
    }
    let shorter = a.height.min(b.height).max(1);
    overlap as f32 / shorter as f32 >= min_overlap
}

/// Pixels between the facing edges; negative when the spans overlap.
fn horizontal_gap(a: &Rect, b: &Rect) -> i32 {
    a.x.max(b.x) - a.right().min(b.right())
}

fn vertical_gap(a: &Rect, b: &Rect) -> i32 {
    a.y.max(b.y) - a.bottom().min(b.bottom())
}

fn merge_until_stable(rects: &[Rect], joins: impl Fn(&Rect, &Rect) -> bool) -> Vec<Rect> {
    let mut merged: Vec<Rect> = rects.iter().copied().filter(|r| !r.is_empty()).collect();
    while let Some((i, j)) = find_pair(&merged, &joins) {
        let other = merged.remove(j);
        merged[i] = merged[i].union(&other);
    }
    merged
}

fn find_pair(rects: &[Rect], joins: &impl Fn(&Rect, &Rect) -> bool) -> Option<(usize, usize)> {
    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if joins(&rects[i], &rects[j]) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Default [`RegionMerger`]: unions rects closer than `distance` on both axes.
#[derive(Debug, Clone, Copy)]
pub struct ProximityMerger {
    distance: i32,
}

impl Default for ProximityMerger {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_DISTANCE)
    }
}

impl ProximityMerger {
    pub fn new(distance: i32) -> Self {
        Self {
            distance: distance.max(0),
        }
    }
}

impl RegionMerger for ProximityMerger {
    fn merge_adjacent(&self, rects: &[Rect]) -> Vec<Rect> {
        let distance = self.distance;
        merge_until_stable(rects, |a, b| {
            horizontal_gap(a, b) <= distance && vertical_gap(a, b) <= distance
        })
    }
}
