//! V4L2 camera source.
//!
//! `V4l2Source` captures from a local device node (e.g. /dev/video0) through memory
//! mapped buffers. The device is asked for packed RGB; when it refuses, whatever format
//! it reports is used and converted (YUYV and NV12 are understood).

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

pub struct V4l2Source {
    config: SourceConfig,
    state: Option<DeviceV4l2State>,
    pixel_format: PixelFormat,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            pixel_format: PixelFormat::Rgb24,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    /// Negotiated frame size; the requested size until the device is opened.
    pub fn resolution(&self) -> (u32, u32) {
        (self.active_width, self.active_height)
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

impl FrameSource for V4l2Source {
    fn describe(&self) -> String {
        format!("{} (v4l2)", self.config.uri)
    }

    fn open(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.uri)
            .with_context(|| format!("open v4l2 device {}", self.config.uri))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.config.uri,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "v4l2 device {} delivers unsupported pixel format {}",
                self.config.uri,
                format.fourcc
            )
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.uri,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.pixel_format = pixel_format;
        self.last_error = None;

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{}, {:?})",
            self.config.uri,
            self.active_width,
            self.active_height,
            self.pixel_format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.active_width, self.active_height, self.pixel_format);
        let state = self.state.as_mut().context("v4l2 device not opened")?;
        let captured = state.with_mut(|fields| {
            fields.stream.next().map(|(buf, meta)| {
                let used = (meta.bytesused as usize).min(buf.len());
                // Some drivers report zero bytesused for full buffers.
                let data = if used == 0 { buf } else { &buf[..used] };
                normalize_to_rgb(data, width, height, format)
            })
        });
        let rgb = match captured {
            Ok(Ok(rgb)) => rgb,
            Ok(Err(err)) => {
                self.last_error = Some(err.to_string());
                return Err(err.context("convert v4l2 frame"));
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                return Err(anyhow::Error::new(err).context("capture v4l2 frame"));
            }
        };

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(Frame::from_rgb(rgb, width, height)?.with_sequence(self.frame_count))
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Source: released {}", self.config.uri);
        }
    }

    fn is_healthy(&self) -> bool {
        if self.state.is_none() || self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.uri.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_device() -> SourceConfig {
        SourceConfig {
            uri: "/dev/camfilter-missing-video".to_string(),
            ..SourceConfig::default()
        }
    }

    #[test]
    fn open_fails_for_missing_device() {
        let mut source = V4l2Source::new(missing_device());
        assert!(source.open().is_err());
        assert!(!source.is_healthy());
    }

    #[test]
    fn pull_before_open_fails_and_release_is_idempotent() {
        let mut source = V4l2Source::new(missing_device());
        assert!(source.next_frame().is_err());
        source.release();
        source.release();
        assert_eq!(source.stats().frames_captured, 0);
        assert_eq!(source.resolution(), (640, 480));
    }

    #[test]
    fn health_grace_scales_with_fps() {
        let mut config = missing_device();
        config.target_fps = 1;
        assert_eq!(V4l2Source::new(config).health_grace(), Duration::from_millis(6_000));
        assert_eq!(
            V4l2Source::new(missing_device()).health_grace(),
            Duration::from_millis(2_000)
        );
    }
}
