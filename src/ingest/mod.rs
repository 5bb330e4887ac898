//! Frame sources.
//!
//! This module provides the sources a capture loop can pull frames from:
//! - USB/V4L2 camera devices (feature: ingest-v4l2)
//! - Still image files, repeated on every pull
//! - Synthetic moving pattern (`stub://` URIs, testing)
//!
//! Every source produces tightly packed RGB `Frame`s. A source is opened once, pulled
//! until it fails or the loop stops, and released; it is not restartable within a run.

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod still;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::frame::Frame;

pub use still::StillSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Default camera: index 0.
pub const DEFAULT_DEVICE: &str = "/dev/video0";

/// A lazy, non-restartable sequence of frames.
pub trait FrameSource {
    /// Human-readable source location, for logs.
    fn describe(&self) -> String;

    /// Acquire the underlying device. Fails when it is unavailable.
    fn open(&mut self) -> Result<()>;

    /// Pull the next frame. Fails when the device stops delivering.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Give the device back. Safe to call more than once.
    fn release(&mut self);

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn next_frame(&mut self) -> Result<Frame> {
        (**self).next_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Requested capture geometry for a source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// `/dev/videoN`, `v4l2://N`, `stub://name`, or a local image path.
    pub uri: String,
    /// Target frame rate (frames per second), passed to devices that support it.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_DEVICE.to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

/// Which backend a source URI selects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Synthetic,
    Device(String),
    Still(String),
}

impl SourceKind {
    pub fn classify(uri: &str) -> SourceKind {
        let uri = uri.trim();
        if uri.starts_with("stub://") {
            return SourceKind::Synthetic;
        }
        if let Some(index) = uri.strip_prefix("v4l2://") {
            return SourceKind::Device(format!("/dev/video{}", index));
        }
        if uri.starts_with("/dev/") {
            return SourceKind::Device(uri.to_string());
        }
        SourceKind::Still(uri.to_string())
    }
}

/// Build the source a URI names. Nothing is opened yet.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    match SourceKind::classify(&config.uri) {
        SourceKind::Synthetic => Ok(Box::new(SyntheticSource::new(config.clone()))),
        SourceKind::Still(path) => Ok(Box::new(StillSource::new(path)?)),
        SourceKind::Device(device) => {
            #[cfg(feature = "ingest-v4l2")]
            {
                let config = SourceConfig {
                    uri: device,
                    ..config.clone()
                };
                Ok(Box::new(V4l2Source::new(config)))
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                anyhow::bail!("camera {} requires the ingest-v4l2 feature", device)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_source_uris() {
        assert_eq!(SourceKind::classify("stub://front"), SourceKind::Synthetic);
        assert_eq!(
            SourceKind::classify("v4l2://2"),
            SourceKind::Device("/dev/video2".to_string())
        );
        assert_eq!(
            SourceKind::classify(DEFAULT_DEVICE),
            SourceKind::Device(DEFAULT_DEVICE.to_string())
        );
        assert_eq!(
            SourceKind::classify("face.png"),
            SourceKind::Still("face.png".to_string())
        );
    }

    #[test]
    fn open_source_builds_synthetic() -> Result<()> {
        let mut source = open_source(&SourceConfig {
            uri: "stub://test".to_string(),
            width: 8,
            height: 6,
            ..SourceConfig::default()
        })?;
        source.open()?;
        let frame = source.next_frame()?;
        assert_eq!((frame.width(), frame.height()), (8, 6));
        source.release();
        Ok(())
    }
}
