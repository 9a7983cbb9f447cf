use std::path::PathBuf;

use capture_ocr_types::Size;
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};
use serde::Deserialize;

/// Encoding for dumped ROI crops.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpFormat {
    #[default]
    Png,
    Jpeg,
}

impl DumpFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DumpFormat::Png => "png",
            DumpFormat::Jpeg => "jpg",
        }
    }
}

#[derive(Debug, Default)]
pub struct CliSources {
    pub max_merged_regions_from_cli: bool,
    pub recognition_timeout_from_cli: bool,
}

impl CliSources {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            max_merged_regions_from_cli: value_from_cli(matches, "max_merged_regions"),
            recognition_timeout_from_cli: value_from_cli(matches, "recognition_timeout_ms"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    let command = CliArgs::command();
    let matches = command.get_matches();
    let args = match CliArgs::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    let sources = CliSources::from_matches(&matches);
    (args, sources)
}

fn parse_size(value: &str) -> Result<Size, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in '{value}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in '{value}'"))?;
    if width == 0 || height == 0 {
        return Err(format!("size must be non-zero, got '{value}'"));
    }
    Ok(Size::new(width, height))
}

#[derive(Debug, Parser)]
#[command(
    name = "capture-ocr",
    about = "Select, recognize and reconcile text regions in captured frames",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Captured frame image (repeatable; frames run in the order given)
    #[arg(long = "frame", value_name = "IMAGE", required = true)]
    pub frames: Vec<PathBuf>,

    /// JSON file of scripted detections replayed by the fixture engine
    #[arg(long = "fixtures", value_name = "FILE")]
    pub fixtures: Option<PathBuf>,

    /// JSON snapshot of the ROI learner (regions and heatmap)
    #[arg(long = "learner", value_name = "FILE")]
    pub learner: Option<PathBuf>,

    /// Window size the frames were captured from, e.g. 1920x1080
    #[arg(long = "original-size", value_name = "WxH", value_parser = parse_size)]
    pub original_size: Option<Size>,

    /// Downscale frames so the longest side is at most this many pixels
    #[arg(long = "max-dimension", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_dimension: Option<u32>,

    /// Enable or disable region-targeted recognition
    #[arg(
        long = "partial-recognition",
        id = "partial_recognition",
        value_parser = clap::value_parser!(bool)
    )]
    pub partial_recognition: Option<bool>,

    /// Largest share of the frame candidate regions may cover before falling back
    #[arg(long = "max-coverage-ratio", id = "max_coverage_ratio")]
    pub max_coverage_ratio: Option<f32>,

    /// Largest number of merged regions before falling back to the full frame
    #[arg(
        long = "max-merged-regions",
        id = "max_merged_regions",
        default_value_t = 8,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_merged_regions: u32,

    /// Halt the pipeline at the first failing stage
    #[arg(
        long = "stop-on-first-error",
        id = "stop_on_first_error",
        value_parser = clap::value_parser!(bool)
    )]
    pub stop_on_first_error: Option<bool>,

    /// Upper bound for one batched recognition round trip
    #[arg(
        long = "recognition-timeout-ms",
        id = "recognition_timeout_ms",
        default_value_t = 5000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub recognition_timeout_ms: u64,

    /// Write every crop sent to the engine into this directory
    #[arg(long = "roi-dump-dir", value_name = "DIR")]
    pub roi_dump_dir: Option<PathBuf>,

    /// Image format for dumped crops
    #[arg(long = "roi-dump-format", value_enum)]
    pub roi_dump_format: Option<DumpFormat>,

    /// Pretty-print the JSON report
    #[arg(long = "pretty")]
    pub pretty: bool,
}
