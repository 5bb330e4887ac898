//! Boosted cascade of Haar-like features (Viola-Jones).
//!
//! Models are read either from OpenCV's cascade XML (see `haar_xml`) or from JSON:
//!
//! ```json
//! {
//!   "window": { "width": 24, "height": 24 },
//!   "stages": [
//!     { "threshold": -1.2,
//!       "classifiers": [
//!         { "rects": [ { "x": 0, "y": 0, "width": 24, "height": 12, "weight": -1.0 },
//!                      { "x": 0, "y": 6, "width": 24, "height": 6, "weight": 2.0 } ],
//!           "threshold": 0.004, "left": -0.8, "right": 0.9 } ] }
//!   ]
//! }
//! ```
//!
//! Variance normalization follows OpenCV: the statistics come from the window inset by
//! one model pixel on each side. With `n = area * stddev` over that rect, a weak
//! classifier votes `left` when `sum(weight * rect_sum) < threshold * n` and `right`
//! otherwise (`n` is 1 on a flat patch). A window passes a stage when the votes add up to
//! at least the stage threshold, and is a detection when it passes every stage. The
//! window is scanned over all positions and over scales growing by `scale_factor`; raw
//! hits are merged with `group_rectangles`.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};

use super::haar_xml::parse_opencv_cascade;
use crate::detect::backend::DetectorBackend;
use crate::detect::result::{group_rectangles, BoundingBox};

/// Similarity tolerance used when merging raw hits.
const GROUP_EPS: f64 = 0.2;

/// Position step at scale 1.0, in pixels.
const BASE_STEP: f32 = 2.0;

// ----------------------------------------------------------------------------
// Model file
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeakClassifier {
    pub rects: Vec<FeatureRect>,
    pub threshold: f32,
    pub left: f32,
    pub right: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub threshold: f32,
    pub classifiers: Vec<WeakClassifier>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CascadeModel {
    pub window: WindowSize,
    pub stages: Vec<Stage>,
}

impl CascadeModel {
    /// Read and validate a model file, OpenCV XML or JSON depending on its content.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cascade model {}", path.display()))?;
        let model = Self::parse(&raw)
            .with_context(|| format!("invalid cascade model {}", path.display()))?;
        model
            .validate()
            .with_context(|| format!("invalid cascade model {}", path.display()))?;
        Ok(model)
    }

    fn parse(raw: &str) -> Result<Self> {
        if raw.trim_start().starts_with('<') {
            parse_opencv_cascade(raw)
        } else {
            Ok(serde_json::from_str(raw)?)
        }
    }

    pub fn validate(&self) -> Result<()> {
        // The normalization rect is the window minus a one pixel border.
        if self.window.width < 3 || self.window.height < 3 {
            return Err(anyhow!(
                "window must be at least 3x3, got {}x{}",
                self.window.width,
                self.window.height
            ));
        }
        if self.stages.is_empty() {
            return Err(anyhow!("cascade has no stages"));
        }
        for (s, stage) in self.stages.iter().enumerate() {
            if stage.classifiers.is_empty() {
                return Err(anyhow!("stage {} has no classifiers", s));
            }
            for (c, classifier) in stage.classifiers.iter().enumerate() {
                if classifier.rects.is_empty() || classifier.rects.len() > 3 {
                    return Err(anyhow!(
                        "stage {} classifier {}: expected 1..=3 rects, got {}",
                        s,
                        c,
                        classifier.rects.len()
                    ));
                }
                for rect in &classifier.rects {
                    let inside = rect.width > 0
                        && rect.height > 0
                        && rect.x.saturating_add(rect.width) <= self.window.width
                        && rect.y.saturating_add(rect.height) <= self.window.height;
                    if !inside {
                        return Err(anyhow!(
                            "stage {} classifier {}: rect {:?} outside {}x{} window",
                            s,
                            c,
                            rect,
                            self.window.width,
                            self.window.height
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Detection parameters
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectParams {
    /// Window growth per pyramid level. Must be > 1.
    pub scale_factor: f32,
    /// Raw hits a merged detection needs beyond itself. 0 disables merging.
    pub min_neighbors: u32,
    /// Smallest window side in pixels. `None` means the model window.
    pub min_size: Option<u32>,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Detector
// ----------------------------------------------------------------------------

/// Cascade backend. Loading is the only fallible step that depends on the model file.
pub struct CascadeDetector {
    model: CascadeModel,
    params: DetectParams,
}

impl CascadeDetector {
    /// Load a model from disk. Any failure here is fatal to the caller.
    pub fn from_path<P: AsRef<Path>>(path: P, params: DetectParams) -> Result<Self> {
        Self::from_model(CascadeModel::from_path(path)?, params)
    }

    pub fn from_model(model: CascadeModel, params: DetectParams) -> Result<Self> {
        model.validate()?;
        if !(params.scale_factor > 1.0) || !params.scale_factor.is_finite() {
            return Err(anyhow!(
                "scale factor must be a finite value > 1.0, got {}",
                params.scale_factor
            ));
        }
        Ok(Self { model, params })
    }

    pub fn model(&self) -> &CascadeModel {
        &self.model
    }

    pub fn params(&self) -> DetectParams {
        self.params
    }

    /// Every window that passes all stages, before merging.
    pub fn detect_raw(&self, gray: &GrayImage) -> Vec<BoundingBox> {
        let (width, height) = gray.dimensions();
        let integral = IntegralImage::new(gray);
        let window = self.model.window;
        let min_side = self.params.min_size.unwrap_or(0);

        let mut hits = Vec::new();
        let mut scale = 1.0f32;
        loop {
            let win_w = (window.width as f32 * scale).round() as u32;
            let win_h = (window.height as f32 * scale).round() as u32;
            if win_w > width || win_h > height {
                break;
            }
            if win_w >= min_side && win_h >= min_side {
                let stages = self.scale_stages(scale);
                let norm = NormRect::at_scale(window, scale);
                let step = (BASE_STEP * scale).round().max(1.0) as usize;
                let (win_w, win_h) = (win_w as usize, win_h as usize);

                for y in (0..=(height as usize - win_h)).step_by(step) {
                    for x in (0..=(width as usize - win_w)).step_by(step) {
                        if passes(&integral, &stages, &norm, x, y) {
                            hits.push(BoundingBox::new(
                                x as u32,
                                y as u32,
                                win_w as u32,
                                win_h as u32,
                            ));
                        }
                    }
                }
            }
            scale *= self.params.scale_factor;
        }
        hits
    }

    /// Rescale every feature rectangle to the window size at `scale`.
    ///
    /// After rounding, the first rectangle's weight is corrected so the weighted areas
    /// still cancel out, keeping a uniform window at a zero response.
    fn scale_stages(&self, scale: f32) -> Vec<ScaledStage> {
        let scale_dim = |v: u32| (v as f32 * scale).round() as usize;
        self.model
            .stages
            .iter()
            .map(|stage| ScaledStage {
                threshold: f64::from(stage.threshold),
                classifiers: stage
                    .classifiers
                    .iter()
                    .map(|classifier| {
                        let mut rects: Vec<ScaledRect> = classifier
                            .rects
                            .iter()
                            .map(|r| ScaledRect {
                                x: scale_dim(r.x),
                                y: scale_dim(r.y),
                                width: scale_dim(r.width).max(1),
                                height: scale_dim(r.height).max(1),
                                weight: f64::from(r.weight),
                            })
                            .collect();
                        let original_balance: f64 = classifier
                            .rects
                            .iter()
                            .map(|r| f64::from(r.weight) * f64::from(r.width * r.height))
                            .sum();
                        if rects.len() > 1 && original_balance.abs() < 1e-6 {
                            let rest: f64 = rects[1..]
                                .iter()
                                .map(|r| r.weight * (r.width * r.height) as f64)
                                .sum();
                            let first_area = (rects[0].width * rects[0].height) as f64;
                            rects[0].weight = -rest / first_area;
                        }
                        ScaledClassifier {
                            rects,
                            threshold: f64::from(classifier.threshold),
                            left: f64::from(classifier.left),
                            right: f64::from(classifier.right),
                        }
                    })
                    .collect(),
            })
            .collect()
    }
}

impl DetectorBackend for CascadeDetector {
    fn name(&self) -> &'static str {
        "cascade"
    }

    fn detect(&self, luminance: &GrayImage) -> Result<Vec<BoundingBox>> {
        let raw = self.detect_raw(luminance);
        let mut grouped = group_rectangles(&raw, self.params.min_neighbors, GROUP_EPS);
        grouped.sort_by_key(|b| std::cmp::Reverse(b.area()));
        Ok(grouped)
    }

    fn warm_up(&self) -> Result<()> {
        let blank = GrayImage::new(self.model.window.width, self.model.window.height);
        self.detect(&blank).map(|_| ())
    }
}

// ----------------------------------------------------------------------------
// Evaluation
// ----------------------------------------------------------------------------

struct ScaledRect {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    weight: f64,
}

struct ScaledClassifier {
    rects: Vec<ScaledRect>,
    threshold: f64,
    left: f64,
    right: f64,
}

struct ScaledStage {
    threshold: f64,
    classifiers: Vec<ScaledClassifier>,
}

/// Window-relative rect the variance is measured over.
struct NormRect {
    offset: usize,
    width: usize,
    height: usize,
}

impl NormRect {
    fn at_scale(window: WindowSize, scale: f32) -> Self {
        let scale_dim = |v: u32| ((v as f32 * scale).round() as usize).max(1);
        Self {
            offset: scale.round() as usize,
            width: scale_dim(window.width - 2),
            height: scale_dim(window.height - 2),
        }
    }
}

fn passes(
    integral: &IntegralImage,
    stages: &[ScaledStage],
    norm_rect: &NormRect,
    x: usize,
    y: usize,
) -> bool {
    let (nx, ny) = (x + norm_rect.offset, y + norm_rect.offset);
    let area = (norm_rect.width * norm_rect.height) as f64;
    let sum = integral.sum(nx, ny, norm_rect.width, norm_rect.height) as f64;
    let sq_sum = integral.sq_sum(nx, ny, norm_rect.width, norm_rect.height) as f64;
    let spread = area * sq_sum - sum * sum;
    let norm = if spread > 0.0 { spread.sqrt() } else { 1.0 };

    stages.iter().all(|stage| {
        let votes: f64 = stage
            .classifiers
            .iter()
            .map(|classifier| {
                let value: f64 = classifier
                    .rects
                    .iter()
                    .map(|r| {
                        r.weight * integral.sum(x + r.x, y + r.y, r.width, r.height) as f64
                    })
                    .sum::<f64>();
                if value < classifier.threshold * norm {
                    classifier.left
                } else {
                    classifier.right
                }
            })
            .sum();
        votes >= stage.threshold
    })
}

/// Summed-area tables for pixel values and their squares.
struct IntegralImage {
    stride: usize,
    sum: Vec<u64>,
    sq: Vec<u64>,
}

impl IntegralImage {
    fn new(gray: &GrayImage) -> Self {
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq = vec![0u64; stride * (h + 1)];
        let pixels = gray.as_raw();
        for y in 0..h {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = u64::from(pixels[y * w + x]);
                row_sum += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row_sum;
                sq[i] = sq[i - stride] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    fn rect(&self, table: &[u64], x: usize, y: usize, w: usize, h: usize) -> u64 {
        // Clip to the table; scaled rects can round one pixel past the window.
        let rows = table.len() / self.stride;
        let x1 = (x + w).min(self.stride - 1);
        let y1 = (y + h).min(rows - 1);
        let x0 = x.min(x1);
        let y0 = y.min(y1);
        let s = self.stride;
        (table[y1 * s + x1] + table[y0 * s + x0]) - table[y0 * s + x1] - table[y1 * s + x0]
    }

    fn sum(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        self.rect(&self.sum, x, y, w, h)
    }

    fn sq_sum(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        self.rect(&self.sq, x, y, w, h)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
