pub mod executor;
pub mod gate;
pub mod metrics;

use std::fmt;
use std::time::Duration;

use capture_ocr_types::DetectedTextRegion;
use serde::Serialize;

use crate::collaborators::ChangeDetection;
use crate::recognition::TextChange;
use crate::region::RegionSelection;

pub use executor::{PipelineBuilder, PipelineExecutor, StagePlan};
pub use gate::ExclusivityGate;
pub use metrics::{PipelineMetrics, StageMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    ChangeDetection,
    Recognition,
    TextChangeDetection,
    TranslationDispatch,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::ChangeDetection => "change_detection",
            StageKind::Recognition => "recognition",
            StageKind::TextChangeDetection => "text_change_detection",
            StageKind::TranslationDispatch => "translation_dispatch",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run currently is, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Acquiring,
    Selecting,
    Recognizing,
    Reconciling,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionReport {
    pub selection: RegionSelection,
    pub regions: Vec<DetectedTextRegion>,
    pub batch_size: usize,
    pub engine_time: Duration,
}

/// What a stage produced, tagged by the stage that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum StagePayload {
    None,
    Change(ChangeDetection),
    Recognition(RecognitionReport),
    TextChange(TextChange),
    Dispatch { delivered: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStageResult {
    pub kind: StageKind,
    pub success: bool,
    pub error: Option<String>,
    pub elapsed: Duration,
    pub payload: StagePayload,
}

impl PipelineStageResult {
    pub fn succeeded(kind: StageKind, elapsed: Duration, payload: StagePayload) -> Self {
        Self {
            kind,
            success: true,
            error: None,
            elapsed,
            payload,
        }
    }

    pub fn failed(kind: StageKind, elapsed: Duration, error: impl ToString) -> Self {
        Self {
            kind,
            success: false,
            error: Some(error.to_string()),
            elapsed,
            payload: StagePayload::None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineResult {
    pub frame_index: Option<u64>,
    pub stages: Vec<PipelineStageResult>,
    pub skipped: Vec<StageKind>,
    pub early_terminated: bool,
    pub success: bool,
    pub first_error: Option<String>,
    pub elapsed: Duration,
}

impl PipelineResult {
    pub fn stage(&self, kind: StageKind) -> Option<&PipelineStageResult> {
        self.stages.iter().find(|stage| stage.kind == kind)
    }

    pub fn executed(&self) -> Vec<StageKind> {
        self.stages.iter().map(|stage| stage.kind).collect()
    }

    pub fn recognition(&self) -> Option<&RecognitionReport> {
        self.stages.iter().find_map(|stage| match &stage.payload {
            StagePayload::Recognition(report) => Some(report),
            _ => None,
        })
    }

    /// Final regions of the run; empty when recognition did not succeed.
    pub fn regions(&self) -> &[DetectedTextRegion] {
        self.recognition()
            .map(|report| report.regions.as_slice())
            .unwrap_or(&[])
    }
}

/// Recognized text handed to the downstream translation consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBatch {
    pub frame_index: Option<u64>,
    pub timestamp: Option<Duration>,
    pub regions: Vec<DetectedTextRegion>,
}
