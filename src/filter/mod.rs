//! Per-frame filter dispatch.
//!
//! `FilterDispatcher::apply` maps one frame and the active `FilterMode` to one output
//! frame. It keeps no state between frames; the only thing it owns is the (optional)
//! detector used by `FilterMode::FaceHighlight`.

mod draw;
mod edge;

use anyhow::{anyhow, Result};
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::detect::DetectorBackend;
use crate::frame::{expand_gray, Frame};

pub use draw::{draw_outline, OutlineStyle};
pub use edge::detect_edges;

/// Output value of an edge pixel.
pub const EDGE: u8 = 255;

// ----------------------------------------------------------------------------
// FilterMode
// ----------------------------------------------------------------------------

/// The active filter. Exactly one is applied per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterMode {
    #[default]
    None,
    Grayscale,
    EdgeDetect,
    FaceHighlight,
}

impl FilterMode {
    pub const ALL: [FilterMode; 4] = [
        FilterMode::None,
        FilterMode::Grayscale,
        FilterMode::EdgeDetect,
        FilterMode::FaceHighlight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterMode::None => "none",
            FilterMode::Grayscale => "grayscale",
            FilterMode::EdgeDetect => "edge-detect",
            FilterMode::FaceHighlight => "face-highlight",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            FilterMode::None => 0,
            FilterMode::Grayscale => 1,
            FilterMode::EdgeDetect => 2,
            FilterMode::FaceHighlight => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => FilterMode::Grayscale,
            2 => FilterMode::EdgeDetect,
            3 => FilterMode::FaceHighlight,
            _ => FilterMode::None,
        }
    }

    /// Whether this mode needs a loaded detector.
    pub fn needs_detector(self) -> bool {
        matches!(self, FilterMode::FaceHighlight)
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(FilterMode::None),
            "grayscale" | "gray" | "grey" => Ok(FilterMode::Grayscale),
            "edge-detect" | "edge" | "edges" | "canny" => Ok(FilterMode::EdgeDetect),
            "face-highlight" | "face" | "faces" => Ok(FilterMode::FaceHighlight),
            other => Err(anyhow!(
                "unknown filter mode '{}' (expected one of: none, grayscale, edge-detect, face-highlight)",
                other
            )),
        }
    }
}

// ----------------------------------------------------------------------------
// EdgeThresholds
// ----------------------------------------------------------------------------

/// Hysteresis thresholds for `FilterMode::EdgeDetect`.
///
/// The two values are independent; `ordered()` returns them as (lower, upper).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeThresholds {
    pub threshold1: u8,
    pub threshold2: u8,
}

impl EdgeThresholds {
    pub fn new(threshold1: u8, threshold2: u8) -> Self {
        Self {
            threshold1,
            threshold2,
        }
    }

    /// (lower, upper). A reversed pair is swapped.
    pub fn ordered(self) -> (u8, u8) {
        if self.threshold1 <= self.threshold2 {
            (self.threshold1, self.threshold2)
        } else {
            (self.threshold2, self.threshold1)
        }
    }
}

impl Default for EdgeThresholds {
    fn default() -> Self {
        Self::new(100, 200)
    }
}

// ----------------------------------------------------------------------------
// FilterDispatcher
// ----------------------------------------------------------------------------

/// Applies the active filter to one frame.
pub struct FilterDispatcher {
    detector: Option<Box<dyn DetectorBackend>>,
    outline: OutlineStyle,
}

impl FilterDispatcher {
    /// Dispatcher without a detector. `FaceHighlight` is rejected.
    pub fn new() -> Self {
        Self {
            detector: None,
            outline: OutlineStyle::default(),
        }
    }

    pub fn with_detector<D: DetectorBackend + 'static>(mut self, detector: D) -> Self {
        self.detector = Some(Box::new(detector));
        self
    }

    pub fn with_boxed_detector(mut self, detector: Box<dyn DetectorBackend>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_outline(mut self, outline: OutlineStyle) -> Self {
        self.outline = outline;
        self
    }

    pub fn has_detector(&self) -> bool {
        self.detector.is_some()
    }

    pub fn detector_name(&self) -> Option<&'static str> {
        self.detector.as_ref().map(|d| d.name())
    }

    /// Transform one frame.
    ///
    /// - `None`: input returned as-is
    /// - `Grayscale`: luminance, expanded to three equal channels
    /// - `EdgeDetect`: binary edge map (0 / 255), expanded to three channels
    /// - `FaceHighlight`: outline drawn around every detected box on the color frame
    pub fn apply(&self, frame: Frame, mode: FilterMode, params: EdgeThresholds) -> Result<Frame> {
        match mode {
            FilterMode::None => Ok(frame),
            FilterMode::Grayscale => {
                let gray = frame.luminance();
                Ok(frame.replace_image(expand_gray(&gray)))
            }
            FilterMode::EdgeDetect => {
                let (lower, upper) = params.ordered();
                let edges = detect_edges(&frame.luminance(), lower, upper);
                Ok(frame.replace_image(expand_gray(&edges)))
            }
            FilterMode::FaceHighlight => {
                let detector = self
                    .detector
                    .as_deref()
                    .ok_or_else(|| anyhow!("face highlight requires a loaded detector"))?;
                let boxes = detector.detect(&frame.luminance())?;
                log::trace!(
                    "{} detector: {} box(es) in frame #{}",
                    detector.name(),
                    boxes.len(),
                    frame.sequence()
                );
                let mut frame = frame;
                for bbox in &boxes {
                    draw_outline(frame.as_image_mut(), bbox, self.outline);
                }
                Ok(frame)
            }
        }
    }
}

impl Default for FilterDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Default outline: green, two pixels wide.
pub const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const OUTLINE_STROKE: u32 = 2;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use image::RgbImage;

    fn noisy_frame(width: u32, height: u32) -> Frame {
        let image = RgbImage::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(37) ^ y.wrapping_mul(101);
            Rgb([(v % 256) as u8, ((v / 3) % 256) as u8, ((v * 7) % 256) as u8])
        });
        Frame::from_image(image)
    }

    struct FixedBoxes(Vec<BoundingBox>);

    impl DetectorBackend for FixedBoxes {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&self, _luminance: &image::GrayImage) -> Result<Vec<BoundingBox>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn mode_parses_aliases() {
        assert_eq!("gray".parse::<FilterMode>().unwrap(), FilterMode::Grayscale);
        assert_eq!("Canny".parse::<FilterMode>().unwrap(), FilterMode::EdgeDetect);
        assert_eq!(" face ".parse::<FilterMode>().unwrap(), FilterMode::FaceHighlight);
        assert!("sepia".parse::<FilterMode>().is_err());
        for mode in FilterMode::ALL {
            assert_eq!(mode.as_str().parse::<FilterMode>().unwrap(), mode);
            assert_eq!(FilterMode::from_u8(mode.to_u8()), mode);
        }
    }

    #[test]
    fn none_returns_input_pixels() {
        let frame = noisy_frame(17, 9);
        let before = frame.pixels().to_vec();
        let out = FilterDispatcher::new()
            .apply(frame, FilterMode::None, EdgeThresholds::default())
            .unwrap();
        assert_eq!(out.pixels(), before.as_slice());
    }

    #[test]
    fn grayscale_channels_are_equal() {
        let out = FilterDispatcher::new()
            .apply(noisy_frame(23, 11), FilterMode::Grayscale, EdgeThresholds::default())
            .unwrap();
        assert_eq!((out.width(), out.height()), (23, 11));
        for px in out.pixels().chunks_exact(3) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
    }

    #[test]
    fn edge_detect_zero_thresholds_marks_every_pixel() {
        let out = FilterDispatcher::new()
            .apply(noisy_frame(19, 13), FilterMode::EdgeDetect, EdgeThresholds::new(0, 0))
            .unwrap();
        assert!(out.pixels().iter().all(|&v| v == EDGE));
    }

    #[test]
    fn edge_detect_output_is_binary_and_order_insensitive() {
        let dispatcher = FilterDispatcher::new();
        let a = dispatcher
            .apply(noisy_frame(31, 17), FilterMode::EdgeDetect, EdgeThresholds::new(60, 180))
            .unwrap();
        let b = dispatcher
            .apply(noisy_frame(31, 17), FilterMode::EdgeDetect, EdgeThresholds::new(180, 60))
            .unwrap();
        assert_eq!(a.pixels(), b.pixels());
        assert!(a.pixels().iter().all(|&v| v == 0 || v == EDGE));
    }

    #[test]
    fn face_highlight_without_detector_fails() {
        let err = FilterDispatcher::new()
            .apply(noisy_frame(4, 4), FilterMode::FaceHighlight, EdgeThresholds::default())
            .unwrap_err();
        assert!(err.to_string().contains("detector"));
    }

    #[test]
    fn face_highlight_with_no_boxes_keeps_frame() {
        let frame = noisy_frame(20, 20);
        let before = frame.pixels().to_vec();
        let out = FilterDispatcher::new()
            .with_detector(FixedBoxes(vec![]))
            .apply(frame, FilterMode::FaceHighlight, EdgeThresholds::default())
            .unwrap();
        assert_eq!(out.pixels(), before.as_slice());
    }

    #[test]
    fn face_highlight_draws_outline_only() {
        let frame = noisy_frame(20, 20);
        let before = noisy_frame(20, 20);
        let bbox = BoundingBox::new(4, 5, 10, 8);
        let out = FilterDispatcher::new()
            .with_detector(FixedBoxes(vec![bbox]))
            .apply(frame, FilterMode::FaceHighlight, EdgeThresholds::default())
            .unwrap();

        // Corners and edges are painted, the interior keeps its color.
        assert_eq!(out.pixel(4, 5), OUTLINE_COLOR.0);
        assert_eq!(out.pixel(13, 12), OUTLINE_COLOR.0);
        assert_eq!(out.pixel(5, 6), OUTLINE_COLOR.0);
        assert_eq!(out.pixel(8, 9), before.pixel(8, 9));
        assert_eq!(out.pixel(0, 0), before.pixel(0, 0));
    }
}
