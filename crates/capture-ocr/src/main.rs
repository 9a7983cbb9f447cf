use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use capture_ocr::cli::parse_cli;
use capture_ocr::collaborators::{RoiLearner, SnapshotRoiLearner};
use capture_ocr::frames::{FrameLoadOptions, load_frame};
use capture_ocr::pipeline::{PipelineMetrics, StageKind, TextBatch};
use capture_ocr::settings::{ConfigError, resolve_settings};
use capture_ocr::{PipelineError, PipelineExecutor, PipelineResult, RegionSelection};
use capture_ocr_engine::{
    EngineError, FixtureEngine, NoopRecognitionEngine, RecognitionEngine, RetryPolicy,
    warm_up_with_retry,
};
use capture_ocr_types::{CaptureFrame, DetectedTextRegion, Rect, Size};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to encode report: {0}")]
    Report(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Serialize)]
struct StageReport {
    stage: StageKind,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    elapsed_ms: f64,
}

#[derive(Debug, Serialize)]
struct FrameReport {
    frame: PathBuf,
    frame_index: Option<u64>,
    size: Size,
    original_size: Size,
    #[serde(skip_serializing_if = "Option::is_none")]
    capture_region: Option<Rect>,
    success: bool,
    early_terminated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    selection: String,
    candidates: Vec<Rect>,
    stages: Vec<StageReport>,
    skipped: Vec<StageKind>,
    regions: Vec<DetectedTextRegion>,
}

impl FrameReport {
    fn new(path: PathBuf, frame: &CaptureFrame, outcome: Result<PipelineResult, PipelineError>) -> Self {
        let mut report = Self {
            frame: path,
            frame_index: frame.frame_index(),
            size: frame.size(),
            original_size: frame.original_window_size(),
            capture_region: frame.capture_region(),
            success: false,
            early_terminated: false,
            error: None,
            selection: "none".to_string(),
            candidates: Vec::new(),
            stages: Vec::new(),
            skipped: Vec::new(),
            regions: Vec::new(),
        };
        match outcome {
            Ok(result) => {
                if let Some(recognition) = result.recognition() {
                    report.selection = describe_selection(&recognition.selection);
                    report.candidates = recognition.selection.candidates().to_vec();
                    report.regions = recognition.regions.clone();
                }
                report.success = result.success;
                report.early_terminated = result.early_terminated;
                report.error = result.first_error;
                report.skipped = result.skipped;
                report.stages = result
                    .stages
                    .into_iter()
                    .map(|stage| StageReport {
                        stage: stage.kind,
                        success: stage.success,
                        error: stage.error,
                        elapsed_ms: stage.elapsed.as_secs_f64() * 1000.0,
                    })
                    .collect();
            }
            Err(err) => report.error = Some(err.to_string()),
        }
        report
    }
}

fn describe_selection(selection: &RegionSelection) -> String {
    match selection {
        RegionSelection::Partial(rects) => format!("partial ({} regions)", rects.len()),
        RegionSelection::FullFrame(reason) => format!("full frame: {reason}"),
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} frames [{elapsed_precise}] {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn log_metrics(metrics: &PipelineMetrics) {
    log::info!(
        "runs={} failed={} early_terminated={} cancelled={}",
        metrics.runs,
        metrics.failed_runs,
        metrics.early_terminations,
        metrics.cancelled_runs
    );
    for (kind, stage) in &metrics.stages {
        log::info!(
            "stage={kind} executed={} skipped={} failed={} avg_ms={:.2}",
            stage.executed,
            stage.skipped,
            stage.failed,
            stage.average_elapsed().as_secs_f64() * 1000.0
        );
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("capture-ocr: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AppError> {
    let (cli, sources) = parse_cli();
    let settings = resolve_settings(&cli, &sources)?;
    if let Some(path) = settings.config_path.as_ref() {
        log::info!("using config {}", path.display());
    }

    let engine: Arc<dyn RecognitionEngine> = match cli.fixtures.as_deref() {
        Some(path) => Arc::new(FixtureEngine::from_json_file(path)?),
        None => {
            log::warn!("no --fixtures given; recognition will report no text");
            Arc::new(NoopRecognitionEngine)
        }
    };
    let policy = RetryPolicy {
        max_attempts: settings.pipeline.engine_warmup_attempts,
        backoff: settings.pipeline.engine_warmup_backoff,
    };
    let warm_engine = Arc::clone(&engine);
    let attempts =
        tokio::task::spawn_blocking(move || warm_up_with_retry(warm_engine.as_ref(), policy))
            .await??;
    log::info!("engine={} ready after {attempts} attempt(s)", engine.name());

    let learner: Arc<dyn RoiLearner> = match cli.learner.as_deref() {
        Some(path) => Arc::new(SnapshotRoiLearner::from_json_file(path)?),
        None => Arc::new(SnapshotRoiLearner::disabled()),
    };

    let options = FrameLoadOptions {
        max_dimension: cli.max_dimension,
        original_size: cli.original_size,
    };
    let mut frames = Vec::with_capacity(cli.frames.len());
    for (index, path) in cli.frames.iter().enumerate() {
        let load_path = path.clone();
        let frame =
            tokio::task::spawn_blocking(move || load_frame(&load_path, options, index as u64))
                .await??;
        frames.push((path.clone(), frame));
    }

    let (batch_tx, mut batch_rx) = mpsc::channel::<TextBatch>(frames.len().max(1));
    let executor = PipelineExecutor::builder(engine)
        .selection(settings.selection)
        .pipeline(settings.pipeline)
        .learner(learner)
        .dispatch_to(batch_tx)
        .build()?;
    let consumer = tokio::spawn(async move {
        let mut delivered = 0usize;
        while let Some(batch) = batch_rx.recv().await {
            log::info!(
                "frame={:?} dispatched {} region(s) for translation",
                batch.frame_index,
                batch.regions.len()
            );
            delivered += 1;
        }
        delivered
    });

    // Change and text-change detection compare against the previous run, so
    // frames are fed in capture order.
    let bar = progress_bar(frames.len() as u64);
    let mut reports = Vec::with_capacity(frames.len());
    for (path, frame) in frames {
        let outcome = executor.execute(&frame).await;
        bar.inc(1);
        reports.push(FrameReport::new(path, &frame, outcome));
    }
    bar.finish_with_message("done");

    log_metrics(&executor.metrics());
    drop(executor);
    let delivered = consumer.await?;
    log::info!("dispatched {delivered} batch(es)");

    let output = if cli.pretty {
        serde_json::to_string_pretty(&reports)?
    } else {
        serde_json::to_string(&reports)?
    };
    println!("{output}");
    Ok(())
}
