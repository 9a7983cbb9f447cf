use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use capture_ocr_engine::RecognitionEngine;
use capture_ocr_types::CaptureFrame;
use futures_util::future::{AbortRegistration, Abortable, Aborted};
use tokio::sync::mpsc;

use super::gate::ExclusivityGate;
use super::metrics::PipelineMetrics;
use super::{
    PipelineResult, PipelineStageResult, RecognitionReport, RunPhase, StageKind, StagePayload,
    TextBatch,
};
use crate::collaborators::{
    ChangeDetection, ChangeDetector, GridDiffDetector, RegionMerger, RoiLearner, SnapshotRoiLearner,
};
use crate::error::PipelineError;
use crate::output::RoiDumper;
use crate::recognition::{
    BatchRecognizer, Deduplicator, TextChange, TextChangeTracker, normalized_text,
};
use crate::region::{ProximityMerger, RegionSelector};
use crate::settings::{PipelineSettings, SelectionSettings};

/// Ordered stages an executor runs, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<StageKind>,
    staged: bool,
}

impl StagePlan {
    pub fn from_settings(settings: &PipelineSettings, dispatch: bool) -> Self {
        let mut stages = if settings.staging_enabled {
            vec![
                StageKind::ChangeDetection,
                StageKind::Recognition,
                StageKind::TextChangeDetection,
            ]
        } else {
            vec![StageKind::Recognition]
        };
        if dispatch {
            stages.push(StageKind::TranslationDispatch);
        }
        Self {
            stages,
            staged: settings.staging_enabled,
        }
    }

    pub fn stages(&self) -> &[StageKind] {
        &self.stages
    }

    /// False for the flat plan, which runs every stage without predicates.
    pub fn is_staged(&self) -> bool {
        self.staged
    }
}

struct RunContext<'a> {
    frame: &'a CaptureFrame,
    label: String,
    change: Option<ChangeDetection>,
    recognition: Option<RecognitionReport>,
    text_change: Option<TextChange>,
    pending_baseline: Option<String>,
}

impl<'a> RunContext<'a> {
    fn new(frame: &'a CaptureFrame) -> Self {
        Self {
            frame,
            label: frame_label(frame),
            change: None,
            recognition: None,
            text_change: None,
            pending_baseline: None,
        }
    }

    fn enter(&self, phase: RunPhase) {
        log::debug!("frame={} phase={phase:?}", self.label);
    }
}

fn frame_label(frame: &CaptureFrame) -> String {
    frame
        .frame_index()
        .map_or_else(|| "-".to_string(), |index| index.to_string())
}

fn should_execute(kind: StageKind, ctx: &RunContext<'_>) -> bool {
    match kind {
        StageKind::ChangeDetection => true,
        StageKind::Recognition => ctx.change.as_ref().is_none_or(|change| change.changed),
        StageKind::TextChangeDetection => ctx.recognition.is_some(),
        StageKind::TranslationDispatch => {
            let Some(recognition) = ctx.recognition.as_ref() else {
                return false;
            };
            !recognition.regions.is_empty()
                && ctx.text_change.is_none_or(|change| change.changed)
        }
    }
}

/// Runs the recognition pipeline for one frame at a time.
pub struct PipelineExecutor {
    gate: Arc<ExclusivityGate>,
    plan: StagePlan,
    settings: PipelineSettings,
    detector: Arc<dyn ChangeDetector>,
    selector: RegionSelector,
    recognizer: BatchRecognizer,
    deduplicator: Deduplicator,
    text_tracker: TextChangeTracker,
    dispatch: Option<mpsc::Sender<TextBatch>>,
    metrics: Mutex<PipelineMetrics>,
}

impl PipelineExecutor {
    pub fn builder(engine: Arc<dyn RecognitionEngine>) -> PipelineBuilder {
        PipelineBuilder::new(engine)
    }

    pub fn gate(&self) -> &Arc<ExclusivityGate> {
        &self.gate
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    pub fn selector(&self) -> &RegionSelector {
        &self.selector
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.lock_metrics().clone()
    }

    /// Text committed by the last completed run, if any.
    pub fn text_baseline(&self) -> Option<String> {
        self.text_tracker.baseline()
    }

    pub async fn execute(&self, frame: &CaptureFrame) -> Result<PipelineResult, PipelineError> {
        log::debug!("frame={} phase={:?}", frame_label(frame), RunPhase::Acquiring);
        self.gate.run_exclusively(|| self.run(frame)).await
    }

    /// Like [`execute`](Self::execute), but aborts when `registration` fires.
    /// An aborted run commits nothing and releases the gate.
    pub async fn execute_cancellable(
        &self,
        frame: &CaptureFrame,
        registration: AbortRegistration,
    ) -> Result<PipelineResult, PipelineError> {
        match Abortable::new(self.execute(frame), registration).await {
            Ok(result) => result,
            Err(Aborted) => {
                self.lock_metrics().record_cancelled();
                log::info!("frame={} run cancelled", frame_label(frame));
                Err(PipelineError::Cancelled)
            }
        }
    }

    async fn run(&self, frame: &CaptureFrame) -> PipelineResult {
        let started = Instant::now();
        let mut ctx = RunContext::new(frame);
        let mut result = PipelineResult {
            frame_index: frame.frame_index(),
            success: true,
            ..PipelineResult::default()
        };

        for &kind in self.plan.stages() {
            if self.plan.is_staged()
                && !self.settings.force_complete_execution
                && !should_execute(kind, &ctx)
            {
                self.lock_metrics().record_skipped(kind);
                result.skipped.push(kind);
                // A predicate that fails because an earlier stage failed is a
                // skip, not an early termination.
                if self.settings.early_termination && result.success {
                    log::debug!("frame={} stage={kind} early termination", ctx.label);
                    result.early_terminated = true;
                    break;
                }
                log::debug!("frame={} stage={kind} skipped", ctx.label);
                continue;
            }

            let stage = self.run_stage(kind, &mut ctx).await;
            self.lock_metrics()
                .record_executed(kind, stage.elapsed, stage.success);
            let failed = !stage.success;
            if failed {
                log::warn!(
                    "frame={} stage={kind} failed: {}",
                    ctx.label,
                    stage.error.as_deref().unwrap_or("unknown error")
                );
                result.success = false;
                if result.first_error.is_none() {
                    result.first_error = stage.error.clone();
                }
            } else {
                log::debug!(
                    "frame={} stage={kind} elapsed_ms={}",
                    ctx.label,
                    stage.elapsed.as_millis()
                );
            }
            result.stages.push(stage);
            if failed && self.settings.stop_on_first_error {
                break;
            }
        }

        if let Some(text) = ctx.pending_baseline.take() {
            self.text_tracker.commit(text);
        }
        if ctx.change.is_some() && ctx.recognition.is_some() {
            self.detector.commit();
        }
        result.elapsed = started.elapsed();
        self.lock_metrics()
            .record_run(result.success, result.early_terminated);
        log::debug!(
            "frame={} stages={} regions={} success={} elapsed_ms={}",
            ctx.label,
            result.stages.len(),
            result.regions().len(),
            result.success,
            result.elapsed.as_millis()
        );
        ctx.enter(RunPhase::Idle);
        result
    }

    async fn run_stage(&self, kind: StageKind, ctx: &mut RunContext<'_>) -> PipelineStageResult {
        let started = Instant::now();
        let outcome = match kind {
            StageKind::ChangeDetection => Ok(self.detect_changes(ctx)),
            StageKind::Recognition => self.recognize(ctx).await,
            StageKind::TextChangeDetection => Ok(self.detect_text_change(ctx)),
            StageKind::TranslationDispatch => self.dispatch(ctx).await,
        };
        let elapsed = started.elapsed();
        match outcome {
            Ok(payload) => PipelineStageResult::succeeded(kind, elapsed, payload),
            Err(err) => PipelineStageResult::failed(kind, elapsed, err),
        }
    }

    fn detect_changes(&self, ctx: &mut RunContext<'_>) -> StagePayload {
        let detection = self.detector.detect(ctx.frame);
        ctx.change = Some(detection.clone());
        StagePayload::Change(detection)
    }

    async fn recognize(&self, ctx: &mut RunContext<'_>) -> Result<StagePayload, PipelineError> {
        ctx.enter(RunPhase::Selecting);
        let changes = ctx
            .change
            .as_ref()
            .map(|change| change.regions.as_slice())
            .unwrap_or(&[]);
        let selection = self.selector.select(ctx.frame.size(), changes);

        ctx.enter(RunPhase::Recognizing);
        let outcome = self
            .recognizer
            .recognize(ctx.frame, selection.candidates())
            .await?;

        ctx.enter(RunPhase::Reconciling);
        let report = RecognitionReport {
            selection,
            regions: self.deduplicator.dedup(outcome.regions),
            batch_size: outcome.batch_size,
            engine_time: outcome.engine_time,
        };
        ctx.recognition = Some(report.clone());
        Ok(StagePayload::Recognition(report))
    }

    fn detect_text_change(&self, ctx: &mut RunContext<'_>) -> StagePayload {
        let current = ctx
            .recognition
            .as_ref()
            .map(|report| normalized_text(&report.regions))
            .unwrap_or_default();
        let change = self.text_tracker.evaluate(&current);
        log::debug!(
            "frame={} text_change_ratio={:.3} changed={}",
            ctx.label,
            change.ratio,
            change.changed
        );
        ctx.text_change = Some(change);
        ctx.pending_baseline = Some(current);
        StagePayload::TextChange(change)
    }

    async fn dispatch(&self, ctx: &mut RunContext<'_>) -> Result<StagePayload, PipelineError> {
        let Some(sender) = self.dispatch.as_ref() else {
            return Ok(StagePayload::Dispatch { delivered: 0 });
        };
        let regions = ctx
            .recognition
            .as_ref()
            .map(|report| report.regions.clone())
            .unwrap_or_default();
        let delivered = regions.len();
        let batch = TextBatch {
            frame_index: ctx.frame.frame_index(),
            timestamp: ctx.frame.timestamp(),
            regions,
        };
        sender
            .send(batch)
            .await
            .map_err(|_| PipelineError::ResourceUnavailable {
                reason: "translation channel closed".to_string(),
            })?;
        Ok(StagePayload::Dispatch { delivered })
    }

    fn lock_metrics(&self) -> MutexGuard<'_, PipelineMetrics> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Wires an executor from its collaborators. Anything not supplied falls back
/// to the bundled default implementation.
pub struct PipelineBuilder {
    engine: Arc<dyn RecognitionEngine>,
    selection: SelectionSettings,
    pipeline: PipelineSettings,
    learner: Arc<dyn RoiLearner>,
    detector: Arc<dyn ChangeDetector>,
    merger: Arc<dyn RegionMerger>,
    gate: Arc<ExclusivityGate>,
    dispatch: Option<mpsc::Sender<TextBatch>>,
}

impl PipelineBuilder {
    pub fn new(engine: Arc<dyn RecognitionEngine>) -> Self {
        Self {
            engine,
            selection: SelectionSettings::default(),
            pipeline: PipelineSettings::default(),
            learner: Arc::new(SnapshotRoiLearner::disabled()),
            detector: Arc::new(GridDiffDetector::default()),
            merger: Arc::new(ProximityMerger::default()),
            gate: Arc::new(ExclusivityGate::new()),
            dispatch: None,
        }
    }

    pub fn selection(mut self, settings: SelectionSettings) -> Self {
        self.selection = settings;
        self
    }

    pub fn pipeline(mut self, settings: PipelineSettings) -> Self {
        self.pipeline = settings;
        self
    }

    pub fn learner(mut self, learner: Arc<dyn RoiLearner>) -> Self {
        self.learner = learner;
        self
    }

    pub fn change_detector(mut self, detector: Arc<dyn ChangeDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn merger(mut self, merger: Arc<dyn RegionMerger>) -> Self {
        self.merger = merger;
        self
    }

    /// Shares an existing gate, e.g. with another executor over the same frames.
    pub fn gate(mut self, gate: Arc<ExclusivityGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn dispatch_to(mut self, sender: mpsc::Sender<TextBatch>) -> Self {
        self.dispatch = Some(sender);
        self
    }

    pub fn build(self) -> Result<PipelineExecutor, PipelineError> {
        self.selection.validate()?;
        self.pipeline.validate()?;

        let plan = StagePlan::from_settings(&self.pipeline, self.dispatch.is_some());
        log::debug!(
            "pipeline plan={:?} engine={}",
            plan.stages(),
            self.engine.name()
        );
        let mut recognizer = BatchRecognizer::new(
            self.engine,
            self.pipeline.recognition_timeout,
            self.selection.min_confidence,
        );
        if let Some(dump) = self.pipeline.roi_dump.clone() {
            log::info!("dumping roi crops to {}", dump.dir.display());
            recognizer = recognizer.with_dump(RoiDumper::new(dump));
        }
        Ok(PipelineExecutor {
            gate: self.gate,
            plan,
            detector: self.detector,
            deduplicator: Deduplicator::new(self.selection.dedup_iou_threshold),
            text_tracker: TextChangeTracker::new(self.pipeline.text_change_threshold),
            selector: RegionSelector::new(self.selection, self.learner, self.merger),
            recognizer,
            dispatch: self.dispatch,
            settings: self.pipeline,
            metrics: Mutex::new(PipelineMetrics::default()),
        })
    }
}
