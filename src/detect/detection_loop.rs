//! Continuous object detection against a live frame source.
//!
//! The loop is self-paced: a cycle grabs the current frame, runs inference,
//! filters and publishes the result, then waits one frame tick before the next
//! cycle. Slow inference lowers the detection rate instead of queueing frames.

use crate::defaults;
use crate::detect::engine::DetectionEngine;
use crate::detect::types::DetectionSet;
use crate::error::{ErrorKind, Result, SightlineError};
use crate::frame::FrameSource;
use crate::pipeline::error::{ErrorReporter, LogReporter, Origin};
use crate::pipeline::events::{EventSender, PipelineEvent};
use crate::pipeline::scheduler::{CancelToken, FrameTicker, IntervalTicker, RepeatingTask};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Drives a [`DetectionEngine`] against a [`FrameSource`] and publishes the
/// latest [`DetectionSet`].
pub struct DetectionLoop {
    engine: Arc<dyn DetectionEngine>,
    ticker: Arc<dyn FrameTicker>,
    min_confidence: f32,
    latest: Arc<watch::Sender<Arc<DetectionSet>>>,
    // Held for the duration of every inference call, across restarts.
    inference_gate: Arc<tokio::sync::Mutex<()>>,
    task: Mutex<Option<RepeatingTask>>,
    events: EventSender,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl DetectionLoop {
    /// Creates a loop paced at the default frame interval.
    pub fn new(engine: Arc<dyn DetectionEngine>) -> Self {
        let (latest, _) = watch::channel(Arc::new(DetectionSet::empty()));
        Self {
            engine,
            ticker: Arc::new(IntervalTicker::new(defaults::FRAME_INTERVAL)),
            min_confidence: defaults::MIN_CONFIDENCE,
            latest: Arc::new(latest),
            inference_gate: Arc::new(tokio::sync::Mutex::new(())),
            task: Mutex::new(None),
            events: EventSender::disabled(),
            error_reporter: Arc::new(LogReporter),
        }
    }

    /// Sets the pacing source between cycles.
    pub fn with_ticker(mut self, ticker: Arc<dyn FrameTicker>) -> Self {
        self.ticker = ticker;
        self
    }

    /// Sets the confidence threshold (detections must score strictly above it).
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_event_sender(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Whether the engine has finished loading. Callers check this before `start`.
    pub fn is_ready(&self) -> bool {
        self.engine.is_ready()
    }

    /// Whether a detection loop is currently scheduled.
    pub fn is_running(&self) -> bool {
        self.lock_task()
            .as_ref()
            .is_some_and(|task| !task.is_cancelled() && !task.is_finished())
    }

    /// Begin repeated detection. Must be called inside a tokio runtime.
    ///
    /// Returns `NotReady` (after reporting it) if the engine is not loaded.
    /// Starting an already running loop is a no-op.
    pub fn start(&self, source: Arc<dyn FrameSource>) -> Result<()> {
        if !self.engine.is_ready() {
            let error = SightlineError::NotReady {
                component: format!("Detection model {}", self.engine.model_name()),
            };
            self.error_reporter.report(Origin::Detection, &error);
            return Err(error);
        }

        let mut task = self.lock_task();
        if task
            .as_ref()
            .is_some_and(|t| !t.is_cancelled() && !t.is_finished())
        {
            return Ok(());
        }

        log::info!(
            "Starting continuous detection with {}",
            self.engine.model_name()
        );

        let cycle = DetectionCycle {
            engine: self.engine.clone(),
            source,
            min_confidence: self.min_confidence,
            latest: self.latest.clone(),
            inference_gate: self.inference_gate.clone(),
            events: self.events.clone(),
            error_reporter: self.error_reporter.clone(),
            failing: Arc::new(Mutex::new(None)),
        };
        *task = Some(RepeatingTask::spawn(self.ticker.clone(), move |token| {
            let cycle = cycle.clone();
            async move { cycle.run(token).await }
        }));
        Ok(())
    }

    /// Cancel the loop and clear the published set. Returns immediately.
    ///
    /// An inference call already in flight finishes in the background and its
    /// result is discarded. Safe to call repeatedly or before `start`.
    pub fn stop(&self) {
        if let Some(task) = self.lock_task().take() {
            task.cancel();
            log::info!("Stopped continuous detection");
        }
        self.latest.send_replace(Arc::new(DetectionSet::empty()));
    }

    /// Most recently published set (empty if never run or stopped).
    pub fn latest(&self) -> Arc<DetectionSet> {
        self.latest.borrow().clone()
    }

    /// Receiver that observes every published set.
    pub fn subscribe(&self) -> watch::Receiver<Arc<DetectionSet>> {
        self.latest.subscribe()
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<RepeatingTask>> {
        // The guarded Option stays consistent even if a holder panicked.
        match self.task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        if let Some(task) = self.lock_task().take() {
            task.cancel();
        }
    }
}

/// Everything one cycle needs, cloned into each iteration.
#[derive(Clone)]
struct DetectionCycle {
    engine: Arc<dyn DetectionEngine>,
    source: Arc<dyn FrameSource>,
    min_confidence: f32,
    latest: Arc<watch::Sender<Arc<DetectionSet>>>,
    inference_gate: Arc<tokio::sync::Mutex<()>>,
    events: EventSender,
    error_reporter: Arc<dyn ErrorReporter>,
    // Kind of the failure streak in progress, if any
    failing: Arc<Mutex<Option<ErrorKind>>>,
}

impl DetectionCycle {
    async fn run(&self, token: CancelToken) {
        let detections = match self.infer().await {
            Ok(set) => {
                *lock_streak(&self.failing) = None;
                set
            }
            Err(e) => {
                // Report each kind of failure once per streak, not on every frame.
                let new_kind = lock_streak(&self.failing).replace(e.kind()) != Some(e.kind());
                if new_kind && !token.is_cancelled() {
                    self.error_reporter.report(Origin::Detection, &e);
                } else {
                    log::debug!("detection cycle failed: {e}");
                }
                DetectionSet::empty()
            }
        };

        let set = Arc::new(detections);
        let published = self.latest.send_if_modified(|current| {
            if token.is_cancelled() {
                false
            } else {
                *current = set.clone();
                true
            }
        });
        if published {
            self.events.send(PipelineEvent::Detections {
                detections: (*set).clone(),
            });
        }
    }

    async fn infer(&self) -> Result<DetectionSet> {
        let _gate = self.inference_gate.lock().await;
        let frame = self.source.current_frame()?;
        let raw = self.engine.detect(&frame).await?;
        Ok(DetectionSet::from_raw(raw, self.min_confidence))
    }
}

fn lock_streak(streak: &Mutex<Option<ErrorKind>>) -> MutexGuard<'_, Option<ErrorKind>> {
    match streak.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
