use std::sync::Arc;
use std::time::{Duration, Instant};

use capture_ocr_engine::{EngineError, RecognitionEngine, RecognitionRequest, RecognitionResult};
use capture_ocr_types::{CaptureFrame, DetectedTextRegion, Point, Rect};

use crate::error::PipelineError;
use crate::geometry::CoordinateReconciler;
use crate::output::RoiDumper;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognitionOutcome {
    /// Reconciled detections in original-frame coordinates.
    pub regions: Vec<DetectedTextRegion>,
    pub full_frame: bool,
    pub batch_size: usize,
    pub engine_time: Duration,
}

/// Submits one frame's candidate regions to the engine in a single round trip.
pub struct BatchRecognizer {
    engine: Arc<dyn RecognitionEngine>,
    timeout: Duration,
    min_confidence: f32,
    dump: Option<RoiDumper>,
}

impl BatchRecognizer {
    pub fn new(engine: Arc<dyn RecognitionEngine>, timeout: Duration, min_confidence: f32) -> Self {
        Self {
            engine,
            timeout,
            min_confidence,
            dump: None,
        }
    }

    /// Writes every request image through `dumper` before it is recognized.
    pub fn with_dump(mut self, dumper: RoiDumper) -> Self {
        self.dump = Some(dumper);
        self
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Recognizes `candidates` (frame pixels), or the whole frame when empty.
    pub async fn recognize(
        &self,
        frame: &CaptureFrame,
        candidates: &[Rect],
    ) -> Result<RecognitionOutcome, PipelineError> {
        let full_frame = candidates.is_empty();
        let requests = if full_frame {
            vec![RecognitionRequest::full_frame(frame)]
        } else {
            crop_requests(frame, candidates)?
        };
        if let Some(dumper) = &self.dump {
            match dumper.write(frame.frame_index(), &requests).await {
                Ok(paths) => log::debug!(
                    "dumped {} crop(s) to {}",
                    paths.len(),
                    dumper.directory().display()
                ),
                Err(err) => log::warn!("roi dump failed: {err}"),
            }
        }
        let origins: Vec<Point> = requests.iter().map(RecognitionRequest::origin).collect();
        let batch_size = requests.len();

        let started = Instant::now();
        let results = self.call_engine(requests, full_frame).await?;
        let engine_time = started.elapsed();

        if results.len() != batch_size {
            return Err(EngineError::BatchMismatch {
                expected: batch_size,
                actual: results.len(),
            }
            .into());
        }

        let reconciler = CoordinateReconciler::for_frame(frame);
        let mut regions = Vec::new();
        for (result, origin) in results.into_iter().zip(origins) {
            for text in result.texts {
                if text.text.trim().is_empty() || text.confidence < self.min_confidence {
                    continue;
                }
                regions.push(reconciler.reconcile(text, origin));
            }
        }

        log::debug!(
            "engine={} batch_size={batch_size} full_frame={full_frame} regions={} elapsed_ms={}",
            self.engine.name(),
            regions.len(),
            engine_time.as_millis()
        );

        Ok(RecognitionOutcome {
            regions,
            full_frame,
            batch_size,
            engine_time,
        })
    }

    async fn call_engine(
        &self,
        requests: Vec<RecognitionRequest>,
        full_frame: bool,
    ) -> Result<Vec<RecognitionResult>, PipelineError> {
        let engine = Arc::clone(&self.engine);
        let task = tokio::task::spawn_blocking(move || {
            if full_frame {
                requests
                    .first()
                    .map(|request| engine.recognize(request).map(|result| vec![result]))
                    .unwrap_or_else(|| Ok(Vec::new()))
            } else {
                engine.recognize_batch(&requests)
            }
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(results))) => Ok(results),
            Ok(Ok(Err(err))) => Err(err.into()),
            Ok(Err(join_err)) => Err(PipelineError::engine(format!(
                "recognition task failed: {join_err}"
            ))),
            Err(_) => Err(PipelineError::engine(format!(
                "recognition timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

fn crop_requests(
    frame: &CaptureFrame,
    candidates: &[Rect],
) -> Result<Vec<RecognitionRequest>, PipelineError> {
    candidates
        .iter()
        .map(|rect| {
            let image = frame.buffer().crop(*rect)?;
            Ok(RecognitionRequest::new(image, rect.origin()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use capture_ocr_engine::{FixtureEngine, FixtureText, RecognizedText};
    use capture_ocr_types::{PixelBuffer, PixelFormat, Size};

    use super::*;

    fn frame(width: u32, height: u32) -> CaptureFrame {
        let data = vec![0u8; (width * height) as usize];
        CaptureFrame::new(PixelBuffer::packed(width, height, PixelFormat::Gray8, data).unwrap())
    }

    fn recognizer(engine: impl RecognitionEngine + 'static) -> BatchRecognizer {
        BatchRecognizer::new(Arc::new(engine), Duration::from_secs(5), 0.0)
    }

    #[tokio::test]
    async fn crops_are_submitted_in_one_batch() {
        let engine = Arc::new(FixtureEngine::new(vec![
            FixtureText::new("Start", Rect::new(110, 110, 60, 20), 0.9),
            FixtureText::new("Options", Rect::new(410, 310, 80, 20), 0.9),
        ]));
        let recognizer = BatchRecognizer::new(engine.clone(), Duration::from_secs(5), 0.0);
        let outcome = recognizer
            .recognize(
                &frame(640, 480),
                &[Rect::new(100, 100, 100, 50), Rect::new(400, 300, 100, 50)],
            )
            .await
            .unwrap();

        assert_eq!(engine.batch_calls(), 1);
        assert_eq!(engine.single_calls(), 0);
        assert_eq!(outcome.batch_size, 2);
        assert!(!outcome.full_frame);
        let bounds: Vec<Rect> = outcome.regions.iter().map(|r| r.bounds).collect();
        assert_eq!(
            bounds,
            vec![Rect::new(110, 110, 60, 20), Rect::new(410, 310, 80, 20)]
        );
    }

    #[tokio::test]
    async fn crops_are_dumped_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = recognizer(FixtureEngine::new(Vec::new())).with_dump(RoiDumper::new(
            crate::settings::RoiDumpSettings {
                dir: dir.path().to_path_buf(),
                format: crate::cli::DumpFormat::Png,
            },
        ));
        let frame = frame(640, 480).with_frame_index(Some(4));
        recognizer
            .recognize(
                &frame,
                &[Rect::new(100, 100, 100, 50), Rect::new(400, 300, 100, 50)],
            )
            .await
            .unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["frame_4_roi_0_100_100.png", "frame_4_roi_1_400_300.png"]
        );
    }

    #[tokio::test]
    async fn dump_failures_do_not_fail_recognition() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let recognizer = recognizer(FixtureEngine::new(vec![FixtureText::new(
            "Menu",
            Rect::new(5, 5, 40, 10),
            1.0,
        )]))
        .with_dump(RoiDumper::new(crate::settings::RoiDumpSettings {
            dir: file.path().join("not-a-dir"),
            format: crate::cli::DumpFormat::Png,
        }));
        let outcome = recognizer.recognize(&frame(100, 100), &[]).await.unwrap();
        assert_eq!(outcome.regions.len(), 1);
    }

    #[tokio::test]
    async fn empty_candidates_recognize_the_full_frame() {
        let engine = Arc::new(FixtureEngine::new(vec![FixtureText::new(
            "Menu",
            Rect::new(5, 5, 40, 10),
            1.0,
        )]));
        let recognizer = BatchRecognizer::new(engine.clone(), Duration::from_secs(5), 0.0);
        let outcome = recognizer.recognize(&frame(100, 100), &[]).await.unwrap();
        assert!(outcome.full_frame);
        assert_eq!(engine.single_calls(), 1);
        assert_eq!(outcome.regions[0].bounds, Rect::new(5, 5, 40, 10));
    }

    #[tokio::test]
    async fn rescaled_frames_restore_display_coordinates() {
        let frame = frame(960, 540)
            .with_original_window_size(Size::new(1920, 1080))
            .unwrap();
        let recognizer = recognizer(FixtureEngine::new(vec![FixtureText::new(
            "Quest",
            Rect::new(110, 204, 50, 12),
            1.0,
        )]));
        let outcome = recognizer
            .recognize(&frame, &[Rect::new(100, 200, 200, 60)])
            .await
            .unwrap();
        assert_eq!(outcome.regions[0].bounds, Rect::new(220, 408, 100, 24));
    }

    #[tokio::test]
    async fn blank_and_low_confidence_detections_are_dropped() {
        let engine = FixtureEngine::new(vec![
            FixtureText::new("   ", Rect::new(0, 0, 20, 10), 1.0),
            FixtureText::new("noise", Rect::new(30, 0, 20, 10), 0.2),
            FixtureText::new("Play", Rect::new(60, 0, 20, 10), 0.8),
        ]);
        let recognizer = BatchRecognizer::new(Arc::new(engine), Duration::from_secs(5), 0.5);
        let outcome = recognizer.recognize(&frame(100, 20), &[]).await.unwrap();
        let texts: Vec<&str> = outcome.regions.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["Play"]);
    }

    #[tokio::test]
    async fn engine_errors_become_engine_failures() {
        let recognizer = recognizer(FixtureEngine::failing("model not loaded"));
        let err = recognizer.recognize(&frame(10, 10), &[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::EngineFailure { .. }));
    }

    #[tokio::test]
    async fn slow_engines_time_out() {
        let engine = FixtureEngine::new(Vec::new()).with_latency(Duration::from_millis(300));
        let recognizer =
            BatchRecognizer::new(Arc::new(engine), Duration::from_millis(20), 0.0);
        let err = recognizer.recognize(&frame(10, 10), &[]).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    struct ShortBatch;

    impl RecognitionEngine for ShortBatch {
        fn name(&self) -> &'static str {
            "short"
        }

        fn recognize(&self, _: &RecognitionRequest) -> Result<RecognitionResult, EngineError> {
            Ok(RecognitionResult::new(
                vec![RecognizedText::new("x", Rect::new(0, 0, 1, 1))],
                Duration::ZERO,
            ))
        }

        fn recognize_batch(
            &self,
            _: &[RecognitionRequest],
        ) -> Result<Vec<RecognitionResult>, EngineError> {
            Ok(vec![RecognitionResult::empty()])
        }
    }

    #[tokio::test]
    async fn batch_count_mismatch_is_an_engine_failure() {
        let err = recognizer(ShortBatch)
            .recognize(
                &frame(100, 100),
                &[Rect::new(0, 0, 10, 10), Rect::new(50, 50, 10, 10)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EngineFailure { .. }));
    }

    #[tokio::test]
    async fn out_of_bounds_candidates_are_rejected() {
        let err = recognizer(ShortBatch)
            .recognize(&frame(100, 100), &[Rect::new(90, 90, 20, 20)])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ResourceUnavailable { .. }));
    }
}
