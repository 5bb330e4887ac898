//! The capture loop: pull, mirror, filter, show, until a terminal state.
//!
//! One iteration:
//! 1. Sample (and clear) the snapshot signal
//! 2. Pull one frame from the source
//! 3. Mirror it left-to-right
//! 4. Read the live controls and dispatch the active filter
//! 5. Show the result
//! 6. On a sampled snapshot signal, retain the frame and stop
//!
//! The source is released on every exit path, including errors.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::controls::FilterControls;
use crate::filter::FilterDispatcher;
use crate::frame::{Frame, SnapshotSlot};
use crate::ingest::FrameSource;
use crate::present::Presenter;

/// Prefix of the one error display when the camera cannot be opened or stops delivering.
pub const CAMERA_UNAVAILABLE: &str = "unable to access camera";

pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(30);
const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct LoopSettings {
    /// Pause between iterations.
    pub frame_delay: Duration,
    /// Stop after this many frames have been shown. Unbounded when `None`.
    pub max_frames: Option<u64>,
    /// How often loop statistics are logged.
    pub stats_interval: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            frame_delay: DEFAULT_FRAME_DELAY,
            max_frames: None,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

/// How a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// A snapshot was requested; the retained frame is in the snapshot slot.
    Snapshot { frames_shown: u64 },
    /// The source could not be opened or stopped delivering frames.
    CaptureFailed { frames_shown: u64, error: String },
    /// `max_frames` frames were shown.
    FrameLimit { frames_shown: u64 },
}

impl LoopExit {
    pub fn frames_shown(&self) -> u64 {
        match self {
            LoopExit::Snapshot { frames_shown }
            | LoopExit::CaptureFailed { frames_shown, .. }
            | LoopExit::FrameLimit { frames_shown } => *frames_shown,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, LoopExit::CaptureFailed { .. })
    }
}

pub struct CaptureLoop {
    dispatcher: FilterDispatcher,
    controls: Arc<FilterControls>,
    settings: LoopSettings,
    snapshot: SnapshotSlot,
}

impl CaptureLoop {
    /// Fails when the initial mode needs a detector the dispatcher does not have.
    pub fn new(
        dispatcher: FilterDispatcher,
        controls: Arc<FilterControls>,
        settings: LoopSettings,
    ) -> Result<Self> {
        let mode = controls.mode();
        if mode.needs_detector() && !dispatcher.has_detector() {
            return Err(anyhow!(
                "filter mode {} requires a detector; none is loaded",
                mode
            ));
        }
        Ok(Self {
            dispatcher,
            controls,
            settings,
            snapshot: SnapshotSlot::new(),
        })
    }

    pub fn controls(&self) -> &Arc<FilterControls> {
        &self.controls
    }

    pub fn dispatcher(&self) -> &FilterDispatcher {
        &self.dispatcher
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Frame retained by the last run, if it ended in a snapshot.
    pub fn snapshot(&self) -> Option<&Frame> {
        self.snapshot.get()
    }

    pub fn take_snapshot(&mut self) -> Option<Frame> {
        self.snapshot.take()
    }

    /// Run until a snapshot, a capture failure, or the frame limit.
    ///
    /// Capture failures are reported once through `presenter.error` (as
    /// `"unable to access camera: <cause>"`) and returned as `LoopExit::CaptureFailed`. Filter and presenter failures are returned as `Err`.
    pub fn run<S, P>(&mut self, source: &mut S, presenter: &mut P) -> Result<LoopExit>
    where
        S: FrameSource + ?Sized,
        P: Presenter + ?Sized,
    {
        self.snapshot.clear();
        let mut device = DeviceGuard::new(source);

        if let Err(err) = device.open() {
            return Ok(capture_failed(presenter, 0, err));
        }
        log::info!(
            "capture running on {} (mode={}, detector={})",
            device.describe(),
            self.controls.mode(),
            self.dispatcher.detector_name().unwrap_or("none")
        );

        let started = Instant::now();
        let mut last_stats_log = Instant::now();
        let mut frames_shown = 0u64;

        loop {
            if let Some(max) = self.settings.max_frames {
                if frames_shown >= max {
                    log::info!("frame limit reached after {} frame(s)", frames_shown);
                    return Ok(LoopExit::FrameLimit { frames_shown });
                }
            }

            let snapshot_requested = self.controls.take_snapshot_request();

            let frame = match device.next_frame() {
                Ok(frame) => frame,
                Err(err) => return Ok(capture_failed(presenter, frames_shown, err)),
            };
            let frame = frame.mirror();

            let mode = self.controls.mode();
            let thresholds = self.controls.thresholds();
            let frame = self.dispatcher.apply(frame, mode, thresholds)?;
            log::trace!(
                "frame #{} mode={} age={:?}",
                frame.sequence(),
                mode,
                frame.age()
            );

            presenter.show(&frame)?;
            frames_shown += 1;

            if snapshot_requested {
                let retained = self.snapshot.retain(frame)?;
                presenter.snapshot(retained)?;
                log::info!(
                    "snapshot retained: frame #{} ({}) after {} frame(s)",
                    retained.sequence(),
                    mode,
                    frames_shown
                );
                return Ok(LoopExit::Snapshot { frames_shown });
            }

            if last_stats_log.elapsed() >= self.settings.stats_interval {
                let stats = device.stats();
                let elapsed = started.elapsed().as_secs_f64();
                log::info!(
                    "capture health={} frames={} shown={} fps={:.1} mode={} source={}",
                    device.is_healthy(),
                    stats.frames_captured,
                    frames_shown,
                    if elapsed > 0.0 {
                        frames_shown as f64 / elapsed
                    } else {
                        0.0
                    },
                    mode,
                    stats.source
                );
                last_stats_log = Instant::now();
            }

            if !self.settings.frame_delay.is_zero() {
                std::thread::sleep(self.settings.frame_delay);
            }
        }
    }
}

/// The single report of a capture failure; the cause is carried in the presenter message
/// and in the returned exit.
fn capture_failed<P: Presenter + ?Sized>(
    presenter: &mut P,
    frames_shown: u64,
    err: anyhow::Error,
) -> LoopExit {
    let error = format!("{:#}", err);
    presenter.error(&format!("{}: {}", CAMERA_UNAVAILABLE, error));
    LoopExit::CaptureFailed {
        frames_shown,
        error,
    }
}

// ----------------------------------------------------------------------------
// DeviceGuard: releases the source on drop
// ----------------------------------------------------------------------------

struct DeviceGuard<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
}

impl<'a, S: FrameSource + ?Sized> DeviceGuard<'a, S> {
    fn new(source: &'a mut S) -> Self {
        Self { source }
    }
}

impl<S: FrameSource + ?Sized> Deref for DeviceGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.source
    }
}

impl<S: FrameSource + ?Sized> DerefMut for DeviceGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.source
    }
}

impl<S: FrameSource + ?Sized> Drop for DeviceGuard<'_, S> {
    fn drop(&mut self) {
        self.source.release();
        log::debug!("released {}", self.source.describe());
    }
}
