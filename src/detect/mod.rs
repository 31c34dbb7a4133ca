//! Real-time object detection.
//!
//! The model itself is an external [`DetectionEngine`]; this module owns the
//! [`DetectionLoop`] that drives it and the result types it publishes.

pub mod detection_loop;
pub mod engine;
pub mod types;

pub use detection_loop::DetectionLoop;
pub use engine::{DetectionEngine, MockDetectionEngine};
pub use types::{BoundingBox, Detection, DetectionSet};
