//! Still image frame source.
//!
//! `StillSource` decodes one local image file and hands out a copy of it on every pull.
//! Useful for tuning thresholds or checking a cascade model without a camera attached.
//! Only local paths are accepted; URL schemes are rejected up front.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub struct StillSource {
    path: String,
    image: Option<RgbImage>,
    frame_count: u64,
}

impl StillSource {
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if !is_local_file_path(&path) {
            return Err(anyhow!(
                "still image sources only support local paths (no URL schemes): {}",
                path
            ));
        }
        Ok(Self {
            path,
            image: None,
            frame_count: 0,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FrameSource for StillSource {
    fn describe(&self) -> String {
        format!("{} (still image)", self.path)
    }

    fn open(&mut self) -> Result<()> {
        let image = image::open(&self.path)
            .with_context(|| format!("failed to open image {}", self.path))?
            .to_rgb8();
        log::info!(
            "StillSource: loaded {} ({}x{})",
            self.path,
            image.width(),
            image.height()
        );
        self.image = Some(image);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| anyhow!("still image {} not opened", self.path))?;
        self.frame_count += 1;
        Ok(Frame::from_image(image.clone()).with_sequence(self.frame_count))
    }

    fn release(&mut self) {
        self.image = None;
    }

    fn is_healthy(&self) -> bool {
        self.image.is_some()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.path.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn rejects_urls_and_empty_paths() {
        assert!(StillSource::new("http://example.com/a.png").is_err());
        assert!(StillSource::new("rtsp://camera/stream").is_err());
        assert!(StillSource::new("  ").is_err());
        assert!(StillSource::new("frames/a.png").is_ok());
    }

    #[test]
    fn repeats_the_decoded_image() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("still.png");
        let mut image = RgbImage::new(4, 3);
        image.put_pixel(1, 2, Rgb([10, 20, 30]));
        image.save(&path)?;

        let mut source = StillSource::new(path.to_string_lossy().into_owned())?;
        source.open()?;
        let first = source.next_frame()?;
        let second = source.next_frame()?;
        assert_eq!((first.width(), first.height()), (4, 3));
        assert_eq!(first.pixel(1, 2), [10, 20, 30]);
        assert_eq!(first.pixels(), second.pixels());
        assert_eq!(second.sequence(), 2);

        source.release();
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[test]
    fn open_fails_for_missing_file() {
        let mut source = StillSource::new("/nonexistent/camfilter/still.png").unwrap();
        assert!(source.open().is_err());
        assert!(!source.is_healthy());
    }
}
