use anyhow::{anyhow, Result};
use image::ImageFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::LoopSettings;
use crate::controls::FilterControls;
use crate::detect::DetectParams;
use crate::filter::{EdgeThresholds, FilterMode};
use crate::ingest::{SourceConfig, DEFAULT_DEVICE};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_FRAME_DELAY_MS: u64 = 30;
const DEFAULT_THRESHOLD1: u8 = 100;
const DEFAULT_THRESHOLD2: u8 = 200;
const DEFAULT_SCALE_FACTOR: f32 = 1.1;
const DEFAULT_MIN_NEIGHBORS: u32 = 5;
const DEFAULT_FRAME_PATH: &str = "camfilter_live.png";
const DEFAULT_SNAPSHOT_PATH: &str = "camfilter_snapshot.png";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CamfilterConfigFile {
    capture: Option<CaptureConfigFile>,
    filter: Option<FilterConfigFile>,
    detector: Option<DetectorConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    frame_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct FilterConfigFile {
    mode: Option<String>,
    threshold1: Option<u8>,
    threshold2: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    cascade_path: Option<PathBuf>,
    scale_factor: Option<f32>,
    min_neighbors: Option<u32>,
    min_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    frame_path: Option<PathBuf>,
    snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CamfilterConfig {
    pub capture: CaptureSettings,
    pub filter: FilterSettings,
    pub detector: DetectorSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    pub frame_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct FilterSettings {
    pub mode: FilterMode,
    pub thresholds: EdgeThresholds,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub cascade_path: Option<PathBuf>,
    pub scale_factor: f32,
    pub min_neighbors: u32,
    pub min_size: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub frame_path: PathBuf,
    pub snapshot_path: PathBuf,
}

impl CamfilterConfig {
    /// File named by `CAMFILTER_CONFIG` (if any), then env overrides, then validation.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like `load`, but an explicit path takes precedence over `CAMFILTER_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var("CAMFILTER_CONFIG")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        };
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CamfilterConfigFile) -> Result<Self> {
        let capture = file.capture.unwrap_or_default();
        let filter = file.filter.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let output = file.output.unwrap_or_default();

        let mode = match filter.mode.as_deref() {
            Some(mode) => mode.parse()?,
            None => FilterMode::default(),
        };

        Ok(Self {
            capture: CaptureSettings {
                device: capture.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
                width: capture.width.unwrap_or(DEFAULT_WIDTH),
                height: capture.height.unwrap_or(DEFAULT_HEIGHT),
                target_fps: capture.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
                frame_delay: Duration::from_millis(
                    capture.frame_delay_ms.unwrap_or(DEFAULT_FRAME_DELAY_MS),
                ),
            },
            filter: FilterSettings {
                mode,
                thresholds: EdgeThresholds::new(
                    filter.threshold1.unwrap_or(DEFAULT_THRESHOLD1),
                    filter.threshold2.unwrap_or(DEFAULT_THRESHOLD2),
                ),
            },
            detector: DetectorSettings {
                cascade_path: detector.cascade_path,
                scale_factor: detector.scale_factor.unwrap_or(DEFAULT_SCALE_FACTOR),
                min_neighbors: detector.min_neighbors.unwrap_or(DEFAULT_MIN_NEIGHBORS),
                min_size: detector.min_size,
            },
            output: OutputSettings {
                frame_path: output
                    .frame_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_FRAME_PATH)),
                snapshot_path: output
                    .snapshot_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("CAMFILTER_DEVICE") {
            if !device.trim().is_empty() {
                self.capture.device = device;
            }
        }
        if let Ok(mode) = std::env::var("CAMFILTER_MODE") {
            if !mode.trim().is_empty() {
                self.filter.mode = mode.parse()?;
            }
        }
        if let Ok(value) = std::env::var("CAMFILTER_THRESHOLD1") {
            self.filter.thresholds.threshold1 = parse_threshold("CAMFILTER_THRESHOLD1", &value)?;
        }
        if let Ok(value) = std::env::var("CAMFILTER_THRESHOLD2") {
            self.filter.thresholds.threshold2 = parse_threshold("CAMFILTER_THRESHOLD2", &value)?;
        }
        if let Ok(path) = std::env::var("CAMFILTER_CASCADE") {
            if !path.trim().is_empty() {
                self.detector.cascade_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("CAMFILTER_OUTPUT") {
            if !path.trim().is_empty() {
                self.output.frame_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("CAMFILTER_SNAPSHOT") {
            if !path.trim().is_empty() {
                self.output.snapshot_path = PathBuf::from(path);
            }
        }
        if let Ok(delay) = std::env::var("CAMFILTER_FRAME_DELAY_MS") {
            let millis: u64 = delay.trim().parse().map_err(|_| {
                anyhow!("CAMFILTER_FRAME_DELAY_MS must be an integer number of milliseconds")
            })?;
            self.capture.frame_delay = Duration::from_millis(millis);
        }
        Ok(())
    }

    /// Checks run after every override layer; the CLI calls it again after its flags.
    pub fn validate(&self) -> Result<()> {
        if self.capture.device.trim().is_empty() {
            return Err(anyhow!("capture.device must not be empty"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!(
                "capture size must be non-zero (got {}x{})",
                self.capture.width,
                self.capture.height
            ));
        }
        if !self.detector.scale_factor.is_finite() || self.detector.scale_factor <= 1.0 {
            return Err(anyhow!(
                "detector.scale_factor must be greater than 1.0 (got {})",
                self.detector.scale_factor
            ));
        }
        if self.filter.mode.needs_detector() && self.detector.cascade_path.is_none() {
            return Err(anyhow!(
                "filter mode {} requires detector.cascade_path",
                self.filter.mode
            ));
        }
        for (name, path) in [
            ("output.frame_path", &self.output.frame_path),
            ("output.snapshot_path", &self.output.snapshot_path),
        ] {
            ImageFormat::from_path(path).map_err(|_| {
                anyhow!(
                    "{} must end in a known image extension (got {})",
                    name,
                    path.display()
                )
            })?;
        }
        Ok(())
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            uri: self.capture.device.clone(),
            target_fps: self.capture.target_fps,
            width: self.capture.width,
            height: self.capture.height,
        }
    }

    pub fn detect_params(&self) -> DetectParams {
        DetectParams {
            scale_factor: self.detector.scale_factor,
            min_neighbors: self.detector.min_neighbors,
            min_size: self.detector.min_size,
        }
    }

    pub fn loop_settings(&self, max_frames: Option<u64>) -> LoopSettings {
        LoopSettings {
            frame_delay: self.capture.frame_delay,
            max_frames,
            ..LoopSettings::default()
        }
    }

    pub fn initial_controls(&self) -> FilterControls {
        FilterControls::new(self.filter.mode, self.filter.thresholds)
    }
}

fn read_config_file(path: &Path) -> Result<CamfilterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_threshold(name: &str, value: &str) -> Result<u8> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be an integer in 0..=255 (got {:?})", name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() -> Result<()> {
        let cfg = CamfilterConfig::from_file(CamfilterConfigFile::default())?;
        assert_eq!(cfg.capture.device, DEFAULT_DEVICE);
        assert_eq!(cfg.capture.frame_delay, Duration::from_millis(30));
        assert_eq!(cfg.filter.mode, FilterMode::None);
        assert_eq!(cfg.filter.thresholds, EdgeThresholds::new(100, 200));
        assert_eq!(cfg.detect_params(), DetectParams::default());
        cfg.validate()?;
        Ok(())
    }

    #[test]
    fn face_mode_needs_cascade_path() -> Result<()> {
        let mut cfg = CamfilterConfig::from_file(CamfilterConfigFile::default())?;
        cfg.filter.mode = FilterMode::FaceHighlight;
        assert!(cfg.validate().is_err());
        cfg.detector.cascade_path = Some(PathBuf::from("face.json"));
        cfg.validate()?;
        Ok(())
    }

    #[test]
    fn rejects_bad_scale_and_output() -> Result<()> {
        let mut cfg = CamfilterConfig::from_file(CamfilterConfigFile::default())?;
        cfg.detector.scale_factor = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = CamfilterConfig::from_file(CamfilterConfigFile::default())?;
        cfg.output.frame_path = PathBuf::from("live.frame");
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn threshold_values_are_bounded() {
        assert_eq!(parse_threshold("T", " 42 ").ok(), Some(42));
        assert!(parse_threshold("T", "256").is_err());
        assert!(parse_threshold("T", "low").is_err());
    }
}
