use crate::detect::types::{BoundingBox, Detection};
use crate::error::{Result, SightlineError};
use crate::frame::PixelBuffer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Trait for object-detection inference backends.
///
/// This trait allows swapping implementations (real model vs mock). Latency is
/// unbounded; callers cancel by ignoring the result.
#[async_trait::async_trait]
pub trait DetectionEngine: Send + Sync {
    /// Run inference on one frame. Returns unfiltered detections.
    async fn detect(&self, frame: &PixelBuffer) -> Result<Vec<Detection>>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;

    /// Check if the model is loaded and inference can run
    fn is_ready(&self) -> bool;
}

/// Implement DetectionEngine for Arc<T> to allow sharing across loops.
#[async_trait::async_trait]
impl<T: DetectionEngine + ?Sized> DetectionEngine for Arc<T> {
    async fn detect(&self, frame: &PixelBuffer) -> Result<Vec<Detection>> {
        (**self).detect(frame).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Mock detection engine for testing
#[derive(Debug)]
pub struct MockDetectionEngine {
    model_name: String,
    response: Vec<Detection>,
    delay: Duration,
    should_fail: bool,
    ready: AtomicBool,
    calls: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

impl MockDetectionEngine {
    /// Create a new ready mock engine that detects one person
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: vec![Detection::new(
                "person",
                0.9,
                BoundingBox::new(10.0, 10.0, 100.0, 200.0),
            )],
            delay: Duration::ZERO,
            should_fail: false,
            ready: AtomicBool::new(true),
            calls: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
        }
    }

    /// Configure the mock to return specific detections
    pub fn with_response(mut self, response: Vec<Detection>) -> Self {
        self.response = response;
        self
    }

    /// Configure how long each inference takes
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Configure the mock to fail on detect
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure the mock as not yet loaded
    pub fn not_ready(self) -> Self {
        self.ready.store(false, Ordering::SeqCst);
        self
    }

    /// Finish (or undo) loading after construction
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Number of detect calls issued so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent detect calls observed
    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DetectionEngine for MockDetectionEngine {
    async fn detect(&self, _frame: &PixelBuffer) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.should_fail {
            Err(SightlineError::Detection {
                message: "mock detection failure".to_string(),
            })
        } else {
            Ok(self.response.clone())
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> PixelBuffer {
        PixelBuffer::filled(2, 2, [0, 0, 0])
    }

    #[tokio::test]
    async fn test_mock_engine_returns_response() {
        let engine = MockDetectionEngine::new("coco-ssd").with_response(vec![Detection::new(
            "cup",
            0.7,
            BoundingBox::new(0.0, 0.0, 5.0, 5.0),
        )]);

        let result = engine.detect(&frame()).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].label, "cup");
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_engine_failure() {
        let engine = MockDetectionEngine::new("coco-ssd").with_failure();
        match engine.detect(&frame()).await {
            Err(SightlineError::Detection { message }) => {
                assert_eq!(message, "mock detection failure");
            }
            other => panic!("Expected Detection error, got {:?}", other),
        }
    }

    #[test]
    fn test_mock_engine_readiness() {
        assert!(MockDetectionEngine::new("m").is_ready());
        let engine = MockDetectionEngine::new("m").not_ready();
        assert!(!engine.is_ready());
        engine.set_ready(true);
        assert!(engine.is_ready());
    }

    #[tokio::test]
    async fn test_engine_trait_is_object_safe() {
        let engine: Arc<dyn DetectionEngine> = Arc::new(MockDetectionEngine::new("boxed"));
        assert_eq!(engine.model_name(), "boxed");
        assert_eq!(engine.detect(&frame()).await.unwrap().len(), 1);
    }
}
