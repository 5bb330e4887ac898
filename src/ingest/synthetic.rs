//! Synthetic frame source (`stub://` URIs) for tests and demos.

use anyhow::{anyhow, Result};

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

/// Generates a moving diagonal pattern.
///
/// The scene shifts every frame and changes "state" every 50 frames, so filters have
/// something to work with.
pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    scene_state: u8,
    opened: bool,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
            opened: false,
        }
    }

    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.config.width * self.config.height * 3) as usize;

        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("{} (synthetic)", self.config.uri)
    }

    /// Synthetic sources are always available.
    fn open(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.config.uri,
            self.config.width,
            self.config.height
        );
        self.opened = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.opened {
            return Err(anyhow!("synthetic source {} not opened", self.config.uri));
        }
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        Ok(Frame::from_rgb(pixels, self.config.width, self.config.height)?
            .with_sequence(self.frame_count))
    }

    fn release(&mut self) {
        self.opened = false;
    }

    fn is_healthy(&self) -> bool {
        self.opened
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.uri.clone(),
        }
    }
}
