//! Data types for object detection results.

use serde::{Deserialize, Serialize};

/// Axis-aligned box in source-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clamp every component to be non-negative (NaN becomes 0).
    fn clamped(self) -> Self {
        fn non_negative(v: f32) -> f32 {
            if v.is_nan() { 0.0 } else { v.max(0.0) }
        }
        Self {
            x: non_negative(self.x),
            y: non_negative(self.y),
            width: non_negative(self.width),
            height: non_negative(self.height),
        }
    }
}

/// One recognized object instance, as returned by a detection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: &str, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.to_string(),
            confidence,
            bbox,
        }
    }
}

/// Detections produced by one inference cycle. Immutable once published.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSet {
    detections: Vec<Detection>,
}

impl DetectionSet {
    /// An empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a publishable set from raw engine output.
    ///
    /// Keeps detections whose confidence is strictly above `min_confidence` and
    /// at most 1.0, drops unlabeled ones, and clamps boxes to non-negative values.
    pub fn from_raw(raw: Vec<Detection>, min_confidence: f32) -> Self {
        let detections = raw
            .into_iter()
            .filter(|d| {
                d.confidence.is_finite()
                    && d.confidence > min_confidence
                    && d.confidence <= 1.0
                    && !d.label.trim().is_empty()
            })
            .map(|d| Detection {
                bbox: d.bbox.clamped(),
                ..d
            })
            .collect();
        Self { detections }
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Labels in this set, in detection order (duplicates kept).
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.detections.iter().map(|d| d.label.as_str())
    }
}
