pub mod cli;
pub mod collaborators;
pub mod error;
pub mod frames;
pub mod geometry;
pub mod output;
pub mod pipeline;
pub mod recognition;
pub mod region;
pub mod settings;

pub use error::PipelineError;
pub use pipeline::{
    ExclusivityGate, PipelineBuilder, PipelineExecutor, PipelineResult, PipelineStageResult,
    StageKind, StagePayload, TextBatch,
};
pub use region::{FallbackReason, RegionSelection, RegionSelector};
