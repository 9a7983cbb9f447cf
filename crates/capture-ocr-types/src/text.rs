use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WritingDirection {
    #[default]
    Horizontal,
    Vertical,
    Unknown,
}

/// Text detection in frame-absolute, display-scale coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedTextRegion {
    pub text: String,
    pub bounds: Rect,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contour: Option<Vec<Point>>,
    #[serde(default)]
    pub direction: WritingDirection,
}

impl DetectedTextRegion {
    pub fn new(text: impl Into<String>, bounds: Rect, confidence: f32) -> Self {
        Self {
            text: text.into(),
            bounds,
            confidence,
            contour: None,
            direction: WritingDirection::Horizontal,
        }
    }

    pub fn with_contour(mut self, contour: Vec<Point>) -> Self {
        self.contour = Some(contour);
        self
    }

    pub fn with_direction(mut self, direction: WritingDirection) -> Self {
        self.direction = direction;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_without_empty_contour() {
        let region = DetectedTextRegion::new("HP", Rect::new(1, 2, 3, 4), 0.9);
        let json = serde_json::to_value(&region).unwrap();
        assert!(json.get("contour").is_none());
        assert_eq!(json["direction"], "horizontal");
        assert_eq!(json["bounds"]["width"], 3);
    }
}
