//! Live filter controls shared between the capture loop and its operators.
//!
//! The loop reads these once per iteration. Anything holding an `Arc<FilterControls>`
//! (a stdin reader, a Ctrl+C handler, a test) may change them at any time.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use anyhow::{anyhow, Context, Result};

use crate::filter::{EdgeThresholds, FilterMode};

#[derive(Debug)]
pub struct FilterControls {
    mode: AtomicU8,
    threshold1: AtomicU8,
    threshold2: AtomicU8,
    snapshot: AtomicBool,
    /// Interrupts seen so far. Unlike `snapshot`, the loop never resets it.
    interrupts: AtomicU32,
}

/// What an operator interrupt should do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    /// First interrupt: a snapshot was requested.
    Snapshot,
    /// A repeated interrupt: the caller should exit.
    Exit,
}

impl FilterControls {
    pub fn new(mode: FilterMode, thresholds: EdgeThresholds) -> Self {
        Self {
            mode: AtomicU8::new(mode.to_u8()),
            threshold1: AtomicU8::new(thresholds.threshold1),
            threshold2: AtomicU8::new(thresholds.threshold2),
            snapshot: AtomicBool::new(false),
            interrupts: AtomicU32::new(0),
        }
    }

    pub fn mode(&self) -> FilterMode {
        FilterMode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    pub fn set_mode(&self, mode: FilterMode) {
        self.mode.store(mode.to_u8(), Ordering::Relaxed);
    }

    pub fn thresholds(&self) -> EdgeThresholds {
        EdgeThresholds::new(
            self.threshold1.load(Ordering::Relaxed),
            self.threshold2.load(Ordering::Relaxed),
        )
    }

    pub fn set_threshold1(&self, value: u8) {
        self.threshold1.store(value, Ordering::Relaxed);
    }

    pub fn set_threshold2(&self, value: u8) {
        self.threshold2.store(value, Ordering::Relaxed);
    }

    /// Ask the loop to keep the next frame it produces and stop.
    pub fn request_snapshot(&self) {
        self.snapshot.store(true, Ordering::SeqCst);
    }

    pub fn snapshot_requested(&self) -> bool {
        self.snapshot.load(Ordering::SeqCst)
    }

    /// Record an interrupt. The first one requests a snapshot, any later one asks for
    /// exit, even after the loop has already consumed the snapshot signal.
    pub fn interrupt(&self) -> Interrupt {
        if self.interrupts.fetch_add(1, Ordering::SeqCst) == 0 {
            self.request_snapshot();
            Interrupt::Snapshot
        } else {
            Interrupt::Exit
        }
    }

    /// Read and clear the snapshot signal.
    pub(crate) fn take_snapshot_request(&self) -> bool {
        self.snapshot.swap(false, Ordering::SeqCst)
    }
}

impl Default for FilterControls {
    fn default() -> Self {
        Self::new(FilterMode::default(), EdgeThresholds::default())
    }
}

/// One line of operator input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    Mode(FilterMode),
    Threshold1(u8),
    Threshold2(u8),
    Snapshot,
}

impl ControlCommand {
    pub fn apply(self, controls: &FilterControls) {
        match self {
            ControlCommand::Mode(mode) => controls.set_mode(mode),
            ControlCommand::Threshold1(value) => controls.set_threshold1(value),
            ControlCommand::Threshold2(value) => controls.set_threshold2(value),
            ControlCommand::Snapshot => controls.request_snapshot(),
        }
    }
}

impl FromStr for ControlCommand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let command = parts
            .next()
            .ok_or_else(|| anyhow!("empty command"))?
            .to_ascii_lowercase();
        let argument = parts.next();
        if parts.next().is_some() {
            return Err(anyhow!("too many arguments in {:?}", s.trim()));
        }

        let threshold = |arg: Option<&str>| -> Result<u8> {
            let arg = arg.ok_or_else(|| anyhow!("{} needs a value in 0..=255", command))?;
            arg.parse::<u8>()
                .with_context(|| format!("invalid threshold {:?} (expected 0..=255)", arg))
        };

        match command.as_str() {
            "mode" | "m" => {
                let name = argument.ok_or_else(|| anyhow!("mode needs a filter name"))?;
                Ok(ControlCommand::Mode(name.parse()?))
            }
            "t1" | "threshold1" => Ok(ControlCommand::Threshold1(threshold(argument)?)),
            "t2" | "threshold2" => Ok(ControlCommand::Threshold2(threshold(argument)?)),
            "snap" | "snapshot" | "s" if argument.is_none() => Ok(ControlCommand::Snapshot),
            _ => Err(anyhow!("unknown command {:?}", s.trim())),
        }
    }
}
