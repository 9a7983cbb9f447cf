use capture_ocr_engine::EngineError;
use capture_ocr_types::FrameError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {reason}")]
    InputInvalid { reason: String },

    #[error("frame resource unavailable: {reason}")]
    ResourceUnavailable { reason: String },

    #[error("recognition engine failure: {message}")]
    EngineFailure { message: String },

    #[error("inconsistent configuration: '{field}' = {value}")]
    ConfigurationInconsistent { field: &'static str, value: String },

    #[error("pipeline run cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InputInvalid {
            reason: reason.into(),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::EngineFailure {
            message: message.into(),
        }
    }

    pub fn inconsistent(field: &'static str, value: impl ToString) -> Self {
        Self::ConfigurationInconsistent {
            field,
            value: value.to_string(),
        }
    }
}

impl From<EngineError> for PipelineError {
    fn from(err: EngineError) -> Self {
        Self::engine(err.to_string())
    }
}

impl From<FrameError> for PipelineError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::InvalidFrame { reason } => Self::InputInvalid { reason },
            other @ FrameError::RegionOutOfBounds { .. } => Self::ResourceUnavailable {
                reason: other.to_string(),
            },
        }
    }
}
