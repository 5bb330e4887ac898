//! camfilter - live camera filter loop
//!
//! Captures from a camera (or still image / `stub://` source), mirrors each frame,
//! applies the active filter and keeps an image file up to date with the result.
//!
//! While running, lines on stdin change the filter:
//! - `mode <none|grayscale|edge-detect|face-highlight>`
//! - `t1 <0-255>` / `t2 <0-255>` (edge thresholds)
//! - `snap` (keep the next frame and exit)
//!
//! Ctrl+C also requests a snapshot; a second Ctrl+C exits immediately.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use camfilter::detect::DetectorBackend;
use camfilter::ui::Ui;
use camfilter::{
    open_source, CamfilterConfig, CaptureLoop, CascadeDetector, ControlCommand, FilterControls,
    FilterDispatcher, FilterMode, ImageFilePresenter, Interrupt, LoopExit,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file (overrides CAMFILTER_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Camera device, `v4l2://N`, `stub://name`, or a still image path.
    #[arg(long)]
    device: Option<String>,
    /// Initial filter (none|grayscale|edge-detect|face-highlight).
    #[arg(long)]
    mode: Option<FilterMode>,
    /// First edge threshold.
    #[arg(long)]
    threshold1: Option<u8>,
    /// Second edge threshold.
    #[arg(long)]
    threshold2: Option<u8>,
    /// Cascade model (OpenCV Haar XML or JSON) for face highlighting.
    #[arg(long)]
    cascade: Option<PathBuf>,
    /// Image file kept up to date with the latest filtered frame.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Where the snapshot frame is written.
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Pause between frames in milliseconds.
    #[arg(long)]
    frame_delay_ms: Option<u64>,
    /// Stop after this many frames.
    #[arg(long)]
    frames: Option<u64>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = {
        let _stage = ui.stage("Load configuration");
        let mut cfg = CamfilterConfig::load_from(args.config.as_deref())?;
        apply_args(&mut cfg, &args);
        cfg.validate()?;
        cfg
    };

    let mut dispatcher = FilterDispatcher::new();
    if let Some(path) = &cfg.detector.cascade_path {
        let _stage = ui.stage("Load cascade model");
        let detector = CascadeDetector::from_path(path, cfg.detect_params())
            .with_context(|| format!("failed to load detector from {}", path.display()))?;
        detector.warm_up()?;
        log::info!(
            "cascade loaded: {} ({} stages, window {}x{})",
            path.display(),
            detector.model().stages.len(),
            detector.model().window.width,
            detector.model().window.height
        );
        dispatcher = dispatcher.with_detector(detector);
    }
    let detector_loaded = dispatcher.has_detector();

    let controls = Arc::new(cfg.initial_controls());
    install_interrupt_handler(controls.clone())?;
    spawn_command_reader(controls.clone(), detector_loaded)?;

    let mut capture = CaptureLoop::new(
        dispatcher,
        controls.clone(),
        cfg.loop_settings(args.frames),
    )?;
    let mut source = open_source(&cfg.source_config())?;
    let presenter = ImageFilePresenter::new(
        cfg.output.frame_path.clone(),
        cfg.output.snapshot_path.clone(),
    )?;
    log::info!(
        "camfilter running. writing frames to {}",
        cfg.output.frame_path.display()
    );
    let mut presenter = ui.live(presenter, controls);

    let exit = capture.run(&mut source, &mut presenter)?;
    // Close the status line before anything else reaches the terminal.
    drop(presenter);
    match exit {
        LoopExit::Snapshot { frames_shown } => {
            log::info!("snapshot captured after {} frame(s)", frames_shown);
            println!("{}", cfg.output.snapshot_path.display());
            Ok(ExitCode::SUCCESS)
        }
        LoopExit::FrameLimit { frames_shown } => {
            log::info!("stopped after {} frame(s)", frames_shown);
            Ok(ExitCode::SUCCESS)
        }
        // Already reported by the presenter.
        LoopExit::CaptureFailed { .. } => Ok(ExitCode::FAILURE),
    }
}

fn apply_args(cfg: &mut CamfilterConfig, args: &Args) {
    if let Some(device) = &args.device {
        cfg.capture.device = device.clone();
    }
    if let Some(mode) = args.mode {
        cfg.filter.mode = mode;
    }
    if let Some(value) = args.threshold1 {
        cfg.filter.thresholds.threshold1 = value;
    }
    if let Some(value) = args.threshold2 {
        cfg.filter.thresholds.threshold2 = value;
    }
    if let Some(path) = &args.cascade {
        cfg.detector.cascade_path = Some(path.clone());
    }
    if let Some(path) = &args.output {
        cfg.output.frame_path = path.clone();
    }
    if let Some(path) = &args.snapshot {
        cfg.output.snapshot_path = path.clone();
    }
    if let Some(millis) = args.frame_delay_ms {
        cfg.capture.frame_delay = Duration::from_millis(millis);
    }
}

fn install_interrupt_handler(controls: Arc<FilterControls>) -> Result<()> {
    ctrlc::set_handler(move || match controls.interrupt() {
        Interrupt::Snapshot => log::info!("interrupt received, capturing snapshot..."),
        Interrupt::Exit => {
            log::warn!("second interrupt, exiting without snapshot");
            std::process::exit(130);
        }
    })
    .context("error setting Ctrl-C handler")
}

fn spawn_command_reader(controls: Arc<FilterControls>, detector_loaded: bool) -> Result<()> {
    std::thread::Builder::new()
        .name("camfilter-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ControlCommand>() {
                    Ok(ControlCommand::Mode(mode)) if mode.needs_detector() && !detector_loaded => {
                        log::warn!("mode {} needs --cascade; ignoring", mode);
                    }
                    Ok(command) => {
                        log::info!("control: {:?}", command);
                        command.apply(&controls);
                    }
                    Err(err) => log::warn!("{:#}", err),
                }
            }
        })
        .context("spawn stdin command reader")?;
    Ok(())
}
