use std::time::Duration;

use capture_ocr_types::{Point, Rect, WritingDirection};

/// Raw engine detection, relative to the submitted image.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    pub text: String,
    pub bounds: Rect,
    pub confidence: f32,
    pub contour: Option<Vec<Point>>,
    pub direction: WritingDirection,
}

impl RecognizedText {
    pub fn new(text: impl Into<String>, bounds: Rect) -> Self {
        Self {
            text: text.into(),
            bounds,
            confidence: 1.0,
            contour: None,
            direction: WritingDirection::Horizontal,
        }
    }

    pub fn with_confidence(mut self, value: f32) -> Self {
        self.confidence = value;
        self
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

#[derive(Debug, Clone, Default)]
pub struct RecognitionResult {
    pub texts: Vec<RecognizedText>,
    pub processing_time: Duration,
}

impl RecognitionResult {
    pub fn new(texts: Vec<RecognizedText>, processing_time: Duration) -> Self {
        Self {
            texts,
            processing_time,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}
