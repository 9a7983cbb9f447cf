use capture_ocr_types::{CaptureFrame, PixelBuffer, Point, Rect};

/// One image submitted for recognition.
///
/// `origin` is the frame-space position of the image's top-left pixel. Engines
/// report boxes relative to the image itself; the origin is informational.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    image: PixelBuffer,
    origin: Point,
}

impl RecognitionRequest {
    pub fn new(image: PixelBuffer, origin: Point) -> Self {
        Self { image, origin }
    }

    pub fn full_frame(frame: &CaptureFrame) -> Self {
        Self::new(frame.buffer().clone(), Point::ORIGIN)
    }

    pub fn image(&self) -> &PixelBuffer {
        &self.image
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    /// The frame-space window covered by this request.
    pub fn window(&self) -> Rect {
        Rect::new(
            self.origin.x,
            self.origin.y,
            self.image.width() as i32,
            self.image.height() as i32,
        )
    }
}
