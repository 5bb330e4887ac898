//! filter_image - apply one filter to a still image
//!
//! No capture loop and no mirroring: the image is filtered exactly as stored.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use camfilter::detect::DetectorBackend;
use camfilter::ui::Ui;
use camfilter::{
    CascadeDetector, DetectParams, EdgeThresholds, FilterDispatcher, FilterMode, Frame,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input image.
    input: PathBuf,
    /// Output image; the format follows the extension.
    output: PathBuf,
    /// Filter to apply (none|grayscale|edge-detect|face-highlight).
    #[arg(long, default_value = "grayscale")]
    mode: FilterMode,
    /// First edge threshold.
    #[arg(long, default_value_t = 100)]
    threshold1: u8,
    /// Second edge threshold.
    #[arg(long, default_value_t = 200)]
    threshold2: u8,
    /// Cascade model (OpenCV Haar XML or JSON), required for face-highlight.
    #[arg(long, env = "CAMFILTER_CASCADE")]
    cascade: Option<PathBuf>,
    /// Detector window growth per scale step.
    #[arg(long, default_value_t = 1.1)]
    scale_factor: f32,
    /// Neighbouring raw hits required per detection.
    #[arg(long, default_value_t = 5)]
    min_neighbors: u32,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut dispatcher = FilterDispatcher::new();
    if args.mode.needs_detector() {
        let path = args
            .cascade
            .as_ref()
            .ok_or_else(|| anyhow!("--mode {} requires --cascade", args.mode))?;
        let _stage = ui.stage("Load cascade model");
        let params = DetectParams {
            scale_factor: args.scale_factor,
            min_neighbors: args.min_neighbors,
            min_size: None,
        };
        let detector = CascadeDetector::from_path(path, params)
            .with_context(|| format!("failed to load detector from {}", path.display()))?;
        detector.warm_up()?;
        dispatcher = dispatcher.with_detector(detector);
    }

    let frame = {
        let _stage = ui.stage("Decode input");
        let image = image::open(&args.input)
            .with_context(|| format!("failed to open image {}", args.input.display()))?;
        Frame::from_image(image.to_rgb8())
    };

    let filtered = {
        let _stage = ui.stage("Apply filter");
        dispatcher.apply(
            frame,
            args.mode,
            EdgeThresholds::new(args.threshold1, args.threshold2),
        )?
    };

    {
        let _stage = ui.stage("Write output");
        filtered.save(&args.output)?;
    }
    log::info!(
        "{} -> {} ({}, {}x{})",
        args.input.display(),
        args.output.display(),
        args.mode,
        filtered.width(),
        filtered.height()
    );
    Ok(())
}
