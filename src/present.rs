//! Where filtered frames go.
//!
//! A `Presenter` sees every frame the loop produces and exactly one terminal state:
//! an error ("unable to access camera") or a snapshot.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::ImageFormat;

use crate::frame::Frame;

pub trait Presenter {
    /// Replace the displayed frame. Nothing is buffered.
    fn show(&mut self, frame: &Frame) -> Result<()>;

    /// Terminal failure display.
    fn error(&mut self, message: &str);

    /// Terminal success display for the retained frame.
    fn snapshot(&mut self, frame: &Frame) -> Result<()>;
}

impl<P: Presenter + ?Sized> Presenter for &mut P {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        (**self).show(frame)
    }

    fn error(&mut self, message: &str) {
        (**self).error(message)
    }

    fn snapshot(&mut self, frame: &Frame) -> Result<()> {
        (**self).snapshot(frame)
    }
}

/// Keeps one image file up to date with the latest frame.
///
/// Each frame is written to a sibling temp file and renamed over the target, so a viewer
/// polling the file never reads a half-written image.
pub struct ImageFilePresenter {
    frame_path: PathBuf,
    snapshot_path: PathBuf,
    format: ImageFormat,
    frames_written: u64,
    last_error: Option<String>,
}

impl ImageFilePresenter {
    pub fn new(frame_path: impl Into<PathBuf>, snapshot_path: impl Into<PathBuf>) -> Result<Self> {
        let frame_path = frame_path.into();
        let format = ImageFormat::from_path(&frame_path)
            .with_context(|| format!("unsupported output image type {}", frame_path.display()))?;
        Ok(Self {
            frame_path,
            snapshot_path: snapshot_path.into(),
            format,
            frames_written: 0,
            last_error: None,
        })
    }

    pub fn frame_path(&self) -> &Path {
        &self.frame_path
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Message of the terminal error, if one was displayed.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .frame_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.frame_path.with_file_name(name)
    }
}

impl Presenter for ImageFilePresenter {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let temp = self.temp_path();
        frame.save_with_format(&temp, self.format)?;
        std::fs::rename(&temp, &self.frame_path).with_context(|| {
            format!(
                "failed to replace {} with {}",
                self.frame_path.display(),
                temp.display()
            )
        })?;
        self.frames_written += 1;
        Ok(())
    }

    fn error(&mut self, message: &str) {
        log::error!("{}", message);
        self.last_error = Some(message.to_string());
    }

    fn snapshot(&mut self, frame: &Frame) -> Result<()> {
        frame.save(&self.snapshot_path)?;
        log::info!(
            "snapshot captured: {} ({}x{})",
            self.snapshot_path.display(),
            frame.width(),
            frame.height()
        );
        Ok(())
    }
}

/// Discards frames; terminal states only reach the log.
#[derive(Debug, Default)]
pub struct NullPresenter {
    pub frames_shown: u64,
}

impl NullPresenter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Presenter for NullPresenter {
    fn show(&mut self, _frame: &Frame) -> Result<()> {
        self.frames_shown += 1;
        Ok(())
    }

    fn error(&mut self, message: &str) {
        log::error!("{}", message);
    }

    fn snapshot(&mut self, frame: &Frame) -> Result<()> {
        log::info!("snapshot captured: frame #{}", frame.sequence());
        Ok(())
    }
}
