use std::fs;
use std::path::Path;

use capture_ocr_types::RegionOfInterest;
use serde::Deserialize;

use super::RoiLearner;
use crate::error::PipelineError;

/// Fixed learner snapshot: a region list plus an optional row-major heatmap.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotRoiLearner {
    enabled: bool,
    regions: Vec<RegionOfInterest>,
    heatmap: Option<Heatmap>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Heatmap {
    pub columns: usize,
    pub rows: usize,
    pub values: Vec<f32>,
}

impl Heatmap {
    fn value_at(&self, norm_x: f32, norm_y: f32) -> f32 {
        if self.columns == 0 || self.rows == 0 {
            return 0.0;
        }
        let col = ((norm_x.clamp(0.0, 1.0) * self.columns as f32) as usize).min(self.columns - 1);
        let row = ((norm_y.clamp(0.0, 1.0) * self.rows as f32) as usize).min(self.rows - 1);
        self.values
            .get(row * self.columns + col)
            .copied()
            .unwrap_or(0.0)
            .clamp(0.0, 1.0)
    }
}

impl Default for SnapshotRoiLearner {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl SnapshotRoiLearner {
    pub fn new(regions: Vec<RegionOfInterest>) -> Self {
        Self {
            enabled: true,
            regions,
            heatmap: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_heatmap(mut self, columns: usize, rows: usize, values: Vec<f32>) -> Self {
        self.heatmap = Some(Heatmap {
            columns,
            rows,
            values,
        });
        self
    }

    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            PipelineError::invalid_input(format!("failed to read {}: {err}", path.display()))
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            PipelineError::invalid_input(format!("failed to parse {}: {err}", path.display()))
        })
    }
}

impl RoiLearner for SnapshotRoiLearner {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn all_regions(&self) -> Vec<RegionOfInterest> {
        self.regions.clone()
    }

    fn heatmap_value_at(&self, norm_x: f32, norm_y: f32) -> f32 {
        self.heatmap
            .as_ref()
            .map(|map| map.value_at(norm_x, norm_y))
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heatmap_lookup_is_row_major() {
        let learner = SnapshotRoiLearner::new(Vec::new()).with_heatmap(
            2,
            2,
            vec![0.0, 0.1, 0.2, 0.3],
        );
        assert_eq!(learner.heatmap_value_at(0.75, 0.25), 0.1);
        assert_eq!(learner.heatmap_value_at(0.25, 0.75), 0.2);
        assert_eq!(learner.heatmap_value_at(1.0, 1.0), 0.3);
    }

    #[test]
    fn missing_heatmap_reads_zero() {
        let learner = SnapshotRoiLearner::new(Vec::new());
        assert_eq!(learner.heatmap_value_at(0.5, 0.5), 0.0);
    }

    #[test]
    fn parses_snapshot_json() {
        let json = r#"{
            "enabled": true,
            "regions": [{
                "rect": {"x": 0.2, "y": 0.09, "width": 0.08, "height": 0.04},
                "region_type": "content",
                "confidence": "high",
                "detection_count": 12,
                "last_seen": {"secs_since_epoch": 1700000000, "nanos_since_epoch": 0}
            }]
        }"#;
        let learner: SnapshotRoiLearner = serde_json::from_str(json).unwrap();
        assert!(learner.is_enabled());
        assert_eq!(learner.all_regions().len(), 1);
    }
}
