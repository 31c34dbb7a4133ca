use crate::defaults;
use crate::error::{Result, SightlineError};
use crate::frame::FrameSnapshot;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// One scene-description request: a fixed instruction plus one encoded still.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptionRequest {
    pub instruction: String,
    pub image: FrameSnapshot,
}

impl DescriptionRequest {
    pub fn new(instruction: &str, image: FrameSnapshot) -> Self {
        Self {
            instruction: instruction.to_string(),
            image,
        }
    }
}

/// Trait for vision-description backends.
///
/// This trait allows swapping implementations (hosted model vs mock).
#[async_trait::async_trait]
pub trait DescriptionService: Send + Sync {
    /// Describe the image. Returns the raw (possibly empty) description text.
    async fn describe(&self, api_key: &str, request: &DescriptionRequest) -> Result<String>;

    /// Name for logging/debugging.
    fn name(&self) -> &str;
}

/// Map a non-success HTTP status from the description service to an error.
///
/// 429 is always `RateLimited`, so the user gets actionable guidance instead of
/// a generic network failure.
pub fn description_error_for_status(status: u16) -> SightlineError {
    match status {
        429 => SightlineError::RateLimited {
            message: defaults::RATE_LIMIT_GUIDANCE.to_string(),
        },
        401 | 403 => SightlineError::Unauthenticated {
            service: "Gemini".to_string(),
        },
        _ => SightlineError::NetworkFailure {
            message: format!("Gemini API error: {status}"),
        },
    }
}

/// Scripted reply of [`MockDescriptionService`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Text(String),
    Status(u16),
}

/// Mock description service for testing
#[derive(Debug)]
pub struct MockDescriptionService {
    replies: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    delay: Duration,
    calls: AtomicU32,
    requests: Mutex<Vec<DescriptionRequest>>,
}

impl MockDescriptionService {
    /// Create a mock that always describes "A clear hallway."
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: MockReply::Text("A clear hallway.".to_string()),
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Configure the reply used once scripted replies run out
    pub fn with_response(mut self, text: &str) -> Self {
        self.fallback = MockReply::Text(text.to_string());
        self
    }

    /// Configure every call to fail with an HTTP status
    pub fn with_status(mut self, status: u16) -> Self {
        self.fallback = MockReply::Status(status);
        self
    }

    /// Queue replies returned in order before the fallback
    pub fn with_replies(self, replies: Vec<MockReply>) -> Self {
        if let Ok(mut queue) = self.replies.lock() {
            queue.extend(replies);
        }
        self
    }

    /// Configure how long each call takes
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of describe calls issued so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<DescriptionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self) -> MockReply {
        self.replies
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for MockDescriptionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DescriptionService for MockDescriptionService {
    async fn describe(&self, _api_key: &str, request: &DescriptionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.next_reply() {
            MockReply::Text(text) => Ok(text),
            MockReply::Status(status) => Err(description_error_for_status(status)),
        }
    }

    fn name(&self) -> &str {
        "mock-description"
    }
}
