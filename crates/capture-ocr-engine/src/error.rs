use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine unavailable: {message}")]
    Unavailable { message: String },
    #[error("batch returned {actual} results for {expected} requests")]
    BatchMismatch { expected: usize, actual: usize },
    #[error("failed to load fixtures from {}: {message}", .path.display())]
    Fixture { path: PathBuf, message: String },
    #[error("backend error: {message}")]
    Backend { message: String },
}

impl EngineError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}
