//! camfilter: live camera filters
//!
//! Frames are pulled from a camera (or a still image / synthetic source), mirrored,
//! passed through exactly one filter and handed to a presenter. The active filter and
//! its thresholds can change between frames; a snapshot request keeps the next filtered
//! frame and ends the run.
//!
//! # Module Structure
//!
//! - `frame`: owned RGB frames and the single snapshot slot
//! - `ingest`: frame sources (V4L2 devices, still images, `stub://` patterns)
//! - `filter`: per-frame dispatch (none, grayscale, edge detect, face highlight)
//! - `detect`: cascade object detector used by face highlight
//! - `controls`: live mode / threshold / snapshot controls shared with operators
//! - `capture`: the capture loop and its exit states
//! - `present`: where filtered frames go
//! - `config`: file + env configuration
//! - `ui`: terminal progress helpers

pub mod capture;
pub mod config;
pub mod controls;
pub mod detect;
pub mod filter;
pub mod frame;
pub mod ingest;
pub mod present;
pub mod ui;

pub use capture::{CaptureLoop, LoopExit, LoopSettings, CAMERA_UNAVAILABLE};
pub use config::CamfilterConfig;
pub use controls::{ControlCommand, FilterControls, Interrupt};
pub use detect::{BoundingBox, CascadeDetector, CascadeModel, DetectParams, DetectorBackend};
pub use filter::{EdgeThresholds, FilterDispatcher, FilterMode};
pub use frame::{Frame, SnapshotSlot};
pub use ingest::{open_source, FrameSource, SourceConfig, SourceStats, StillSource, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::V4l2Source;
pub use present::{ImageFilePresenter, NullPresenter, Presenter};
