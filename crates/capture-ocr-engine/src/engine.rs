use crate::error::EngineError;
use crate::request::RecognitionRequest;
use crate::response::RecognitionResult;

/// Common interface for all recognition engines.
///
/// Calls are blocking; async callers are expected to move them onto a
/// blocking thread.
pub trait RecognitionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn warm_up(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn recognize(&self, request: &RecognitionRequest) -> Result<RecognitionResult, EngineError>;

    /// Recognizes several images in one round trip. Results are returned in
    /// request order, one per request.
    fn recognize_batch(
        &self,
        requests: &[RecognitionRequest],
    ) -> Result<Vec<RecognitionResult>, EngineError> {
        requests.iter().map(|request| self.recognize(request)).collect()
    }
}

/// Placeholder engine used while a real backend is not wired.
#[derive(Debug, Default)]
pub struct NoopRecognitionEngine;

impl RecognitionEngine for NoopRecognitionEngine {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn recognize(&self, _: &RecognitionRequest) -> Result<RecognitionResult, EngineError> {
        Ok(RecognitionResult::empty())
    }
}
