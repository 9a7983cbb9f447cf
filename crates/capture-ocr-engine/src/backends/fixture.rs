use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use capture_ocr_types::{Point, Rect, WritingDirection};
use serde::Deserialize;

use crate::{EngineError, RecognitionEngine, RecognitionRequest, RecognitionResult, RecognizedText};

/// Minimum share of a fixture's area that must fall inside a request window
/// for the fixture to be reported.
const VISIBLE_FRACTION: f64 = 0.5;

/// Scripted text placed at a fixed position in frame coordinates.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureText {
    pub text: String,
    pub bounds: Rect,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub contour: Option<Vec<Point>>,
    #[serde(default)]
    pub direction: WritingDirection,
}

fn default_confidence() -> f32 {
    1.0
}

impl FixtureText {
    pub fn new(text: impl Into<String>, bounds: Rect, confidence: f32) -> Self {
        Self {
            text: text.into(),
            bounds,
            confidence,
            contour: None,
            direction: WritingDirection::Horizontal,
        }
    }
}

/// Engine that replays scripted detections.
///
/// Each request reports the fixtures that are mostly visible inside its
/// window, clipped to the window and translated to request-relative
/// coordinates, the way a real engine would see them in a crop.
#[derive(Debug, Default)]
pub struct FixtureEngine {
    texts: Vec<FixtureText>,
    latency: Duration,
    failure: Option<String>,
    transient_failures: usize,
    round_trips: AtomicUsize,
    single_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl FixtureEngine {
    pub fn new(texts: Vec<FixtureText>) -> Self {
        Self {
            texts,
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path).map_err(|err| EngineError::Fixture {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let texts: Vec<FixtureText> =
            serde_json::from_str(&contents).map_err(|err| EngineError::Fixture {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        Ok(Self::new(texts))
    }

    /// Engine whose every call fails with [`EngineError::Unavailable`].
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Fails the first `count` recognition round trips, then recovers.
    pub fn with_transient_failures(mut self, count: usize) -> Self {
        self.transient_failures = count;
        self
    }

    /// Blocks each round trip for `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn round_trip(&self) -> Result<(), EngineError> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        let trip = self.round_trips.fetch_add(1, Ordering::SeqCst);
        if trip < self.transient_failures {
            return Err(EngineError::unavailable(format!(
                "transient failure {}/{}",
                trip + 1,
                self.transient_failures
            )));
        }
        match &self.failure {
            Some(message) => Err(EngineError::unavailable(message.clone())),
            None => Ok(()),
        }
    }

    fn visible_texts(&self, request: &RecognitionRequest) -> Vec<RecognizedText> {
        let window = request.window();
        let origin = request.origin();
        let mut texts = Vec::new();
        for fixture in &self.texts {
            let Some(visible) = fixture.bounds.intersection(&window) else {
                continue;
            };
            if (visible.area() as f64) < fixture.bounds.area() as f64 * VISIBLE_FRACTION {
                continue;
            }
            let relative = Rect::new(
                visible.x - origin.x,
                visible.y - origin.y,
                visible.width,
                visible.height,
            );
            let mut text = RecognizedText::new(fixture.text.clone(), relative)
                .with_confidence(fixture.confidence)
                .with_direction(fixture.direction);
            if let Some(contour) = &fixture.contour {
                let points = contour
                    .iter()
                    .map(|p| Point::new(p.x - origin.x, p.y - origin.y))
                    .collect();
                text = text.with_contour(points);
            }
            texts.push(text);
        }
        texts
    }
}

impl RecognitionEngine for FixtureEngine {
    fn name(&self) -> &'static str {
        "fixture"
    }

    fn warm_up(&self) -> Result<(), EngineError> {
        match &self.failure {
            Some(message) => Err(EngineError::unavailable(message.clone())),
            None => Ok(()),
        }
    }

    fn recognize(&self, request: &RecognitionRequest) -> Result<RecognitionResult, EngineError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        self.round_trip()?;
        Ok(RecognitionResult::new(
            self.visible_texts(request),
            started.elapsed(),
        ))
    }

    fn recognize_batch(
        &self,
        requests: &[RecognitionRequest],
    ) -> Result<Vec<RecognitionResult>, EngineError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        self.round_trip()?;
        let elapsed = started.elapsed();
        Ok(requests
            .iter()
            .map(|request| RecognitionResult::new(self.visible_texts(request), elapsed))
            .collect())
    }
}
