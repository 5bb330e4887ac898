//! Object detection for the highlight filter.
//!
//! Backends receive a luminance image and return pixel-space boxes. They keep no state
//! between frames; every frame is detected on its own.

mod backend;
mod backends;
mod result;

pub use backend::DetectorBackend;
pub use backends::cascade::{
    CascadeDetector, CascadeModel, DetectParams, FeatureRect, Stage, WeakClassifier, WindowSize,
};
pub use result::{group_rectangles, BoundingBox};
