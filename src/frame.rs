//! Frame ownership layer.
//!
//! - `Frame`: one captured RGB image. Owned by exactly one dispatch step.
//! - `SnapshotSlot`: the single retained frame of a capture run.
//!
//! `Frame` has no `Clone` impl. The only way a frame outlives its loop iteration is by
//! being moved into the `SnapshotSlot`, which accepts at most one frame per run.

use anyhow::{anyhow, Context, Result};
use image::{imageops, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use std::path::Path;
use std::time::{Duration, Instant};

/// Channel count of every frame handed to filters and presenters.
pub const CHANNELS: usize = 3;

/// BT.601 luma weights in Q14 (0.299, 0.587, 0.114), summing to `1 << 14`.
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

// ----------------------------------------------------------------------------
// Frame: exclusively-owned RGB image
// ----------------------------------------------------------------------------

/// One captured image: a `width x height` grid of 8-bit RGB samples.
pub struct Frame {
    image: RgbImage,
    /// Capture sequence number assigned by the source (1-based, 0 = not from a source).
    sequence: u64,
    /// Monotonic capture instant.
    captured_at: Instant,
}

// Explicitly NOT implementing Clone. Frames move through the pipeline.

impl Frame {
    /// Build a frame from tightly packed RGB bytes.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::from_image(image))
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self {
            image,
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Time since capture.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    /// Packed RGB bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.image.get_pixel(x, y).0
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    pub(crate) fn as_image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Single-channel brightness of this frame, BT.601 weighted and rounded.
    pub fn luminance(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            let [r, g, b] = self.image.get_pixel(x, y).0;
            let weighted = u32::from(r) * LUMA_R + u32::from(g) * LUMA_G + u32::from(b) * LUMA_B;
            Luma([((weighted + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT) as u8])
        })
    }

    /// Swap pixel content while keeping capture metadata.
    pub(crate) fn replace_image(mut self, image: RgbImage) -> Self {
        self.image = image;
        self
    }

    /// Mirror left-to-right.
    pub fn mirror(mut self) -> Self {
        imageops::flip_horizontal_in_place(&mut self.image);
        self
    }

    /// Write the frame to disk; the encoding follows the path extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        let format = ImageFormat::from_path(path)
            .with_context(|| format!("unknown image format for {}", path.display()))?;
        self.save_with_format(path, format)
    }

    pub(crate) fn save_with_format(&self, path: &Path, format: ImageFormat) -> Result<()> {
        self.image
            .save_with_format(path, format)
            .with_context(|| format!("write frame to {}", path.display()))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Expand a luminance image back to three equal channels.
pub(crate) fn expand_gray(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let l = gray.get_pixel(x, y)[0];
        Rgb([l, l, l])
    })
}

// ----------------------------------------------------------------------------
// SnapshotSlot: single retained frame
// ----------------------------------------------------------------------------

/// Holds the one frame retained on a snapshot request.
///
/// - Cleared at the start of every capture run
/// - Filled at most once per run (the run halts right after)
#[derive(Debug, Default)]
pub struct SnapshotSlot {
    frame: Option<Frame>,
}

impl SnapshotSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.frame = None;
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_none()
    }

    /// Move a frame into the slot. Refuses to overwrite.
    pub fn retain(&mut self, frame: Frame) -> Result<&Frame> {
        if self.frame.is_some() {
            return Err(anyhow!("snapshot slot already holds a frame"));
        }
        Ok(self.frame.insert(frame))
    }

    pub fn get(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn take(&mut self) -> Option<Frame> {
        self.frame.take()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
