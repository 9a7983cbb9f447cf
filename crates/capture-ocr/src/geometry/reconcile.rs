//! Maps engine output back into original-frame coordinates.
//!
//! Two transforms, always applied in this order:
//! 1. crop-relative -> frame-absolute (add the crop origin),
//! 2. capture scale -> display scale (multiply by `original / captured`).
//!
//! Scaling floors the origin and ceils the extent so repeated restoration
//! never shrinks a box below the text it covers.

use capture_ocr_engine::RecognizedText;
use capture_ocr_types::{CaptureFrame, DetectedTextRegion, Point, Rect, Size};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub x: f64,
    pub y: f64,
}

impl ScaleFactors {
    pub const fn identity() -> Self {
        Self { x: 1.0, y: 1.0 }
    }

    /// Factors that map `captured` pixels onto `original` pixels.
    pub fn between(captured: Size, original: Size) -> Self {
        if captured.is_empty() || original.is_empty() {
            return Self::identity();
        }
        Self {
            x: original.width as f64 / captured.width as f64,
            y: original.height as f64 / captured.height as f64,
        }
    }

    pub fn for_frame(frame: &CaptureFrame) -> Self {
        Self::between(frame.size(), frame.original_window_size())
    }

    pub fn is_identity(&self) -> bool {
        self.x == 1.0 && self.y == 1.0
    }
}

/// Scales `rect` by `scale` and clamps it to `bounds`.
pub fn restore(rect: Rect, scale: ScaleFactors, bounds: Size) -> Rect {
    let scaled = if scale.is_identity() {
        rect
    } else {
        Rect::new(
            (rect.x as f64 * scale.x).floor() as i32,
            (rect.y as f64 * scale.y).floor() as i32,
            (rect.width.max(0) as f64 * scale.x).ceil() as i32,
            (rect.height.max(0) as f64 * scale.y).ceil() as i32,
        )
    };
    scaled.clamp_to(bounds)
}

fn restore_point(point: Point, scale: ScaleFactors, bounds: Size) -> Point {
    let x = (point.x as f64 * scale.x).floor() as i32;
    let y = (point.y as f64 * scale.y).floor() as i32;
    Point::new(
        x.clamp(0, bounds.width as i32),
        y.clamp(0, bounds.height as i32),
    )
}

#[derive(Debug, Clone, Copy)]
pub struct CoordinateReconciler {
    scale: ScaleFactors,
    bounds: Size,
}

impl CoordinateReconciler {
    pub fn new(scale: ScaleFactors, bounds: Size) -> Self {
        Self { scale, bounds }
    }

    pub fn for_frame(frame: &CaptureFrame) -> Self {
        Self::new(ScaleFactors::for_frame(frame), frame.original_window_size())
    }

    pub fn scale(&self) -> ScaleFactors {
        self.scale
    }

    pub fn restore_rect(&self, rect: Rect, origin: Point) -> Rect {
        restore(rect.offset(origin), self.scale, self.bounds)
    }

    pub fn reconcile(&self, text: RecognizedText, origin: Point) -> DetectedTextRegion {
        let bounds = self.restore_rect(text.bounds, origin);
        let contour = text.contour.map(|points| {
            points
                .into_iter()
                .map(|p| {
                    let absolute = Point::new(p.x + origin.x, p.y + origin.y);
                    restore_point(absolute, self.scale, self.bounds)
                })
                .collect()
        });
        DetectedTextRegion {
            text: text.text,
            bounds,
            confidence: text.confidence,
            contour,
            direction: text.direction,
        }
    }
}
