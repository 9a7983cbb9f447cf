use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedRect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionType {
    Content,
    Exclusion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoiConfidence {
    Low,
    Medium,
    High,
}

/// Learned region snapshot. Owned and updated by the ROI learner; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub rect: NormalizedRect,
    pub region_type: RegionType,
    pub confidence: RoiConfidence,
    pub detection_count: u32,
    pub last_seen: SystemTime,
}

impl RegionOfInterest {
    pub fn content(rect: NormalizedRect, confidence: RoiConfidence, detection_count: u32) -> Self {
        Self {
            rect,
            region_type: RegionType::Content,
            confidence,
            detection_count,
            last_seen: SystemTime::now(),
        }
    }

    pub fn is_exclusion(&self) -> bool {
        self.region_type == RegionType::Exclusion
    }
}
