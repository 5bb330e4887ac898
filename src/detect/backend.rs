use anyhow::Result;
use image::GrayImage;

use super::result::BoundingBox;

/// Detector backend trait.
///
/// Implementations take the luminance-derived frame and return zero or more
/// axis-aligned boxes in its pixel coordinates. `detect` takes `&self`: a backend is a
/// fixed model, not a tracker, and must not carry state from one frame to the next.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one frame.
    fn detect(&self, luminance: &GrayImage) -> Result<Vec<BoundingBox>>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
