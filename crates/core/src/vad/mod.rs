//! Voice Activity Detector.

mod detector;

pub use detector::{VadConfig, VadDetector, VadState, VadTransition};
