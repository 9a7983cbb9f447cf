pub mod merge;
pub mod selector;

pub use merge::{ProximityMerger, merge_line_neighbours};
pub use selector::{FallbackReason, RegionSelection, RegionSelector};
