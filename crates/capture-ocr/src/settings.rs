use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::cli::{CliArgs, CliSources, DumpFormat};
use crate::error::PipelineError;

const PROJECT_CONFIG_FILE: &str = "capture-ocr.toml";

/// Knobs that drive region selection, reconciliation and deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSettings {
    pub enable_partial_recognition: bool,
    pub min_region_width: u32,
    pub min_region_height: u32,
    pub max_coverage_ratio: f32,
    pub max_merged_regions: usize,
    /// Share of the width added on each horizontal side.
    pub horizontal_expansion_ratio: f32,
    /// Share of the height added in total, split evenly above and below.
    pub vertical_expansion_ratio: f32,
    pub padding_px: i32,
    pub learned_region_padding_px: i32,
    pub dedup_iou_threshold: f32,
    pub heatmap_threshold: f32,
    pub grid_size: u32,
    pub merge_vertical_overlap: f32,
    pub merge_horizontal_gap_px: i32,
    pub min_confidence: f32,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            enable_partial_recognition: true,
            min_region_width: 50,
            min_region_height: 50,
            max_coverage_ratio: 0.8,
            max_merged_regions: 8,
            horizontal_expansion_ratio: 0.15,
            vertical_expansion_ratio: 0.30,
            padding_px: 5,
            learned_region_padding_px: 5,
            dedup_iou_threshold: 0.3,
            heatmap_threshold: 0.05,
            grid_size: 4,
            merge_vertical_overlap: 0.5,
            merge_horizontal_gap_px: 50,
            min_confidence: 0.0,
        }
    }
}

fn check_unit(field: &'static str, value: f32) -> Result<(), PipelineError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(PipelineError::inconsistent(field, value));
    }
    Ok(())
}

fn check_non_negative(field: &'static str, value: i32) -> Result<(), PipelineError> {
    if value < 0 {
        return Err(PipelineError::inconsistent(field, value));
    }
    Ok(())
}

impl SelectionSettings {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.max_coverage_ratio > 0.0 && self.max_coverage_ratio <= 1.0) {
            return Err(PipelineError::inconsistent(
                "max_coverage_ratio",
                self.max_coverage_ratio,
            ));
        }
        if self.max_merged_regions == 0 {
            return Err(PipelineError::inconsistent("max_merged_regions", 0));
        }
        if self.grid_size == 0 {
            return Err(PipelineError::inconsistent("grid_size", 0));
        }
        if !(self.horizontal_expansion_ratio >= 0.0) {
            return Err(PipelineError::inconsistent(
                "horizontal_expansion_ratio",
                self.horizontal_expansion_ratio,
            ));
        }
        if !(self.vertical_expansion_ratio >= 0.0) {
            return Err(PipelineError::inconsistent(
                "vertical_expansion_ratio",
                self.vertical_expansion_ratio,
            ));
        }
        check_non_negative("padding_px", self.padding_px)?;
        check_non_negative("learned_region_padding_px", self.learned_region_padding_px)?;
        check_non_negative("merge_horizontal_gap_px", self.merge_horizontal_gap_px)?;
        check_unit("dedup_iou_threshold", self.dedup_iou_threshold)?;
        check_unit("heatmap_threshold", self.heatmap_threshold)?;
        check_unit("merge_vertical_overlap", self.merge_vertical_overlap)?;
        check_unit("min_confidence", self.min_confidence)?;
        Ok(())
    }
}

/// Where and how crops sent to the engine are written for debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoiDumpSettings {
    pub dir: PathBuf,
    pub format: DumpFormat,
}

/// Knobs that drive the staged executor.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub staging_enabled: bool,
    pub early_termination: bool,
    pub force_complete_execution: bool,
    pub stop_on_first_error: bool,
    pub recognition_timeout: Duration,
    pub engine_warmup_attempts: u32,
    pub engine_warmup_backoff: Duration,
    pub text_change_threshold: f32,
    pub roi_dump: Option<RoiDumpSettings>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            staging_enabled: true,
            early_termination: true,
            force_complete_execution: false,
            stop_on_first_error: false,
            recognition_timeout: Duration::from_secs(5),
            engine_warmup_attempts: 3,
            engine_warmup_backoff: Duration::from_millis(200),
            text_change_threshold: 0.1,
            roi_dump: None,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.recognition_timeout.is_zero() {
            return Err(PipelineError::inconsistent("recognition_timeout_ms", 0));
        }
        if self.engine_warmup_attempts == 0 {
            return Err(PipelineError::inconsistent("engine_warmup_attempts", 0));
        }
        check_unit("text_change_threshold", self.text_change_threshold)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    selection: SelectionFileConfig,
    pipeline: PipelineFileConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SelectionFileConfig {
    enable_partial_recognition: Option<bool>,
    min_region_width: Option<u32>,
    min_region_height: Option<u32>,
    max_coverage_ratio: Option<f32>,
    max_merged_regions: Option<usize>,
    horizontal_expansion_ratio: Option<f32>,
    vertical_expansion_ratio: Option<f32>,
    padding_px: Option<i32>,
    learned_region_padding_px: Option<i32>,
    dedup_iou_threshold: Option<f32>,
    heatmap_threshold: Option<f32>,
    grid_size: Option<u32>,
    merge_vertical_overlap: Option<f32>,
    merge_horizontal_gap_px: Option<i32>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PipelineFileConfig {
    staging_enabled: Option<bool>,
    early_termination: Option<bool>,
    force_complete_execution: Option<bool>,
    stop_on_first_error: Option<bool>,
    recognition_timeout_ms: Option<u64>,
    engine_warmup_attempts: Option<u32>,
    engine_warmup_backoff_ms: Option<u64>,
    text_change_threshold: Option<f32>,
    roi_dump_dir: Option<PathBuf>,
    roi_dump_format: Option<DumpFormat>,
}

#[derive(Debug, Clone)]
pub struct EffectiveSettings {
    pub selection: SelectionSettings,
    pub pipeline: PipelineSettings,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("config file {} does not exist", .path.display())]
    NotFound { path: PathBuf },
    #[error("invalid configuration: {source}")]
    Invalid {
        path: Option<PathBuf>,
        source: PipelineError,
    },
}

pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    merge(cli, sources, file, config_path)
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        return Ok((read_config(path)?, Some(path.to_path_buf())));
    }

    let candidates = [project_config_path(), default_config_path()];
    for path in candidates.into_iter().flatten() {
        if path.exists() {
            let config = read_config(&path)?;
            return Ok((config, Some(path)));
        }
    }
    Ok((FileConfig::default(), None))
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let FileConfig {
        selection: file_selection,
        pipeline: file_pipeline,
    } = file;

    let mut selection = SelectionSettings::default();
    let s = file_selection;
    set(&mut selection.enable_partial_recognition, s.enable_partial_recognition);
    set(&mut selection.min_region_width, s.min_region_width);
    set(&mut selection.min_region_height, s.min_region_height);
    set(&mut selection.max_coverage_ratio, s.max_coverage_ratio);
    set(&mut selection.max_merged_regions, s.max_merged_regions);
    set(&mut selection.horizontal_expansion_ratio, s.horizontal_expansion_ratio);
    set(&mut selection.vertical_expansion_ratio, s.vertical_expansion_ratio);
    set(&mut selection.padding_px, s.padding_px);
    set(&mut selection.learned_region_padding_px, s.learned_region_padding_px);
    set(&mut selection.dedup_iou_threshold, s.dedup_iou_threshold);
    set(&mut selection.heatmap_threshold, s.heatmap_threshold);
    set(&mut selection.grid_size, s.grid_size);
    set(&mut selection.merge_vertical_overlap, s.merge_vertical_overlap);
    set(&mut selection.merge_horizontal_gap_px, s.merge_horizontal_gap_px);
    set(&mut selection.min_confidence, s.min_confidence);

    set(&mut selection.enable_partial_recognition, cli.partial_recognition);
    set(&mut selection.max_coverage_ratio, cli.max_coverage_ratio);
    if sources.max_merged_regions_from_cli || s.max_merged_regions.is_none() {
        selection.max_merged_regions = cli.max_merged_regions as usize;
    }

    let mut pipeline = PipelineSettings::default();
    let p = file_pipeline;
    set(&mut pipeline.staging_enabled, p.staging_enabled);
    set(&mut pipeline.early_termination, p.early_termination);
    set(&mut pipeline.force_complete_execution, p.force_complete_execution);
    set(&mut pipeline.stop_on_first_error, p.stop_on_first_error);
    set(
        &mut pipeline.recognition_timeout,
        p.recognition_timeout_ms.map(Duration::from_millis),
    );
    set(&mut pipeline.engine_warmup_attempts, p.engine_warmup_attempts);
    set(
        &mut pipeline.engine_warmup_backoff,
        p.engine_warmup_backoff_ms.map(Duration::from_millis),
    );
    set(&mut pipeline.text_change_threshold, p.text_change_threshold);

    set(&mut pipeline.stop_on_first_error, cli.stop_on_first_error);
    if sources.recognition_timeout_from_cli || p.recognition_timeout_ms.is_none() {
        pipeline.recognition_timeout = Duration::from_millis(cli.recognition_timeout_ms);
    }
    pipeline.roi_dump = cli
        .roi_dump_dir
        .clone()
        .or(p.roi_dump_dir)
        .map(|dir| RoiDumpSettings {
            dir,
            format: cli.roi_dump_format.or(p.roi_dump_format).unwrap_or_default(),
        });

    let validated = selection.validate().and_then(|()| pipeline.validate());
    if let Err(source) = validated {
        return Err(ConfigError::Invalid {
            path: config_path,
            source,
        });
    }

    Ok(EffectiveSettings {
        selection,
        pipeline,
        config_path,
    })
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "capture-ocr", "capture-ocr")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir()
        .ok()
        .map(|dir| dir.join(PROJECT_CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::{CommandFactory, FromArgMatches};

    use super::*;

    fn cli(extra: &[&str], config: &Path) -> (CliArgs, CliSources) {
        let mut argv = vec![
            "capture-ocr".to_string(),
            "--frame".to_string(),
            "frame.png".to_string(),
            "--config".to_string(),
            config.display().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        let matches = CliArgs::command().get_matches_from(argv);
        let args = CliArgs::from_arg_matches(&matches).unwrap();
        let sources = CliSources {
            max_merged_regions_from_cli: extra.contains(&"--max-merged-regions"),
            recognition_timeout_from_cli: extra.contains(&"--recognition-timeout-ms"),
        };
        (args, sources)
    }

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_documented_values() {
        let selection = SelectionSettings::default();
        assert_eq!(selection.min_region_width, 50);
        assert_eq!(selection.grid_size, 4);
        assert_eq!(selection.padding_px, 5);
        assert!(selection.validate().is_ok());
        assert!(PipelineSettings::default().validate().is_ok());
    }

    #[test]
    fn file_values_apply_and_cli_wins() {
        let file = config_file(
            r#"
            [selection]
            max_coverage_ratio = 0.6
            max_merged_regions = 4
            heatmap_threshold = 0.2

            [pipeline]
            stop_on_first_error = true
            recognition_timeout_ms = 900
            "#,
        );
        let (args, sources) = cli(&["--max-merged-regions", "6"], file.path());
        let settings = resolve_settings(&args, &sources).unwrap();
        assert_eq!(settings.selection.max_coverage_ratio, 0.6);
        assert_eq!(settings.selection.max_merged_regions, 6);
        assert_eq!(settings.selection.heatmap_threshold, 0.2);
        assert!(settings.pipeline.stop_on_first_error);
        assert_eq!(
            settings.pipeline.recognition_timeout,
            Duration::from_millis(900)
        );
        assert_eq!(settings.config_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn roi_dump_comes_from_file_or_cli() {
        let file = config_file(
            r#"
            [pipeline]
            roi_dump_dir = "/tmp/rois"
            roi_dump_format = "jpeg"
            "#,
        );
        let (args, sources) = cli(&[], file.path());
        let settings = resolve_settings(&args, &sources).unwrap();
        assert_eq!(
            settings.pipeline.roi_dump,
            Some(RoiDumpSettings {
                dir: PathBuf::from("/tmp/rois"),
                format: DumpFormat::Jpeg,
            })
        );

        let (args, sources) = cli(&["--roi-dump-dir", "debug"], file.path());
        let settings = resolve_settings(&args, &sources).unwrap();
        let dump = settings.pipeline.roi_dump.unwrap();
        assert_eq!(dump.dir, PathBuf::from("debug"));
        assert_eq!(dump.format, DumpFormat::Jpeg);

        let empty = config_file("");
        let (args, sources) = cli(&[], empty.path());
        assert_eq!(resolve_settings(&args, &sources).unwrap().pipeline.roi_dump, None);
    }

    #[test]
    fn negative_padding_is_inconsistent() {
        let file = config_file("[selection]\npadding_px = -3\n");
        let (args, sources) = cli(&[], file.path());
        let err = resolve_settings(&args, &sources).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                source: PipelineError::ConfigurationInconsistent {
                    field: "padding_px",
                    ..
                },
                ..
            }
        ));
    }

    #[test]
    fn coverage_ratio_must_be_a_fraction() {
        let settings = SelectionSettings {
            max_coverage_ratio: 1.5,
            ..SelectionSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn missing_override_file_is_reported() {
        let (args, sources) = cli(&[], Path::new("/definitely/not/here.toml"));
        let err = resolve_settings(&args, &sources).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let file = config_file("[selection\n");
        let (args, sources) = cli(&[], file.path());
        let err = resolve_settings(&args, &sources).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
