//! Composition root: detection, description and narration wired together.

use crate::audio::AudioSink;
use crate::defaults;
use crate::describe::{DescriptionRequester, DescriptionService, TriggerOutcome};
use crate::detect::{DetectionEngine, DetectionLoop, DetectionSet};
use crate::error::{Result, SightlineError};
use crate::frame::FrameSource;
use crate::narrate::{NarrationPlayer, NarrationService, SubmitOutcome};
use crate::pipeline::error::{ErrorReporter, EventReporter};
use crate::pipeline::events::EventSender;
use crate::pipeline::scheduler::{IntervalTicker, RepeatingTask};
use crate::settings::Settings;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

/// Timing knobs for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Pause between detection cycles (self-paced, measured after each result)
    pub frame_interval: Duration,
    /// Detections at or below this confidence are dropped
    pub min_confidence: f32,
    /// Pause between automatic descriptions; zero means manual only
    pub auto_describe: Duration,
    /// Instruction sent with every description request
    pub prompt: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_interval: defaults::FRAME_INTERVAL,
            min_confidence: defaults::MIN_CONFIDENCE,
            auto_describe: Duration::from_secs(defaults::AUTO_DESCRIBE_SECS),
            prompt: defaults::DESCRIPTION_PROMPT.to_string(),
        }
    }
}

/// External collaborators the pipeline drives.
pub struct PipelineServices {
    /// None runs without object detection
    pub detection: Option<Arc<dyn DetectionEngine>>,
    pub description: Arc<dyn DescriptionService>,
    pub narration: Arc<dyn NarrationService>,
    pub audio: Arc<dyn AudioSink>,
}

/// The perception-and-narration pipeline.
///
/// Every published description is forwarded to the narration player; the
/// player decides whether to speak it (mute, missing key).
pub struct Pipeline {
    detection: Option<DetectionLoop>,
    requester: Arc<DescriptionRequester>,
    player: Arc<NarrationPlayer>,
    settings: Arc<Settings>,
    config: PipelineConfig,
    source: Mutex<Option<Arc<dyn FrameSource>>>,
    auto_describe: Mutex<Option<RepeatingTask>>,
}

impl Pipeline {
    pub fn new(
        services: PipelineServices,
        settings: Arc<Settings>,
        config: PipelineConfig,
        events: EventSender,
    ) -> Self {
        let reporter: Arc<dyn ErrorReporter> = Arc::new(EventReporter::new(events.clone()));

        let detection = services.detection.map(|engine| {
            DetectionLoop::new(engine)
                .with_ticker(Arc::new(IntervalTicker::new(config.frame_interval)))
                .with_min_confidence(config.min_confidence)
                .with_event_sender(events.clone())
                .with_error_reporter(reporter.clone())
        });

        let requester = DescriptionRequester::new(services.description, settings.clone())
            .with_instruction(&config.prompt)
            .with_event_sender(events.clone())
            .with_error_reporter(reporter.clone());

        let player = NarrationPlayer::new(services.narration, services.audio, settings.clone())
            .with_event_sender(events)
            .with_error_reporter(reporter);

        Self {
            detection,
            requester: Arc::new(requester),
            player: Arc::new(player),
            settings,
            config,
            source: Mutex::new(None),
            auto_describe: Mutex::new(None),
        }
    }

    /// Attach a frame source and start detection plus the auto-describe timer.
    ///
    /// A detection engine that is not ready yet is reported and skipped; the
    /// rest of the pipeline still runs. Calling start again swaps the source.
    pub fn start(&self, source: Arc<dyn FrameSource>) {
        self.stop_tasks();
        *lock(&self.source) = Some(source.clone());

        if let Err(e) = self.start_detection() {
            log::info!("Continuing without object detection: {}", e);
        }

        if self.config.auto_describe.is_zero() {
            return;
        }

        log::info!(
            "Describing the scene every {:.1}s",
            self.config.auto_describe.as_secs_f32()
        );
        let requester = self.requester.clone();
        let player = self.player.clone();
        let ticker = Arc::new(IntervalTicker::new(self.config.auto_describe));
        let task = RepeatingTask::spawn(ticker, move |token| {
            let requester = requester.clone();
            let player = player.clone();
            let source = source.clone();
            async move {
                match requester.trigger(source.as_ref()).await {
                    Ok(TriggerOutcome::Published(result)) if !token.is_cancelled() => {
                        player.submit(&result.text);
                    }
                    Ok(_) => {}
                    // Already reported by the requester, except a missing key
                    Err(e) => log::debug!("auto-describe skipped: {}", e),
                }
            }
        });
        *lock(&self.auto_describe) = Some(task);
    }

    /// Start object detection on the attached source.
    ///
    /// Independent of description and narration; use it to retry once a model
    /// that was still loading at `start` is ready. No-op if already detecting.
    pub fn start_detection(&self) -> Result<()> {
        let detection = self
            .detection
            .as_ref()
            .ok_or_else(|| SightlineError::NotReady {
                component: "Object detection".to_string(),
            })?;
        let source = self.current_source()?;
        detection.start(source)
    }

    /// Stop object detection only and clear the published set. Idempotent.
    pub fn stop_detection(&self) {
        if let Some(detection) = &self.detection {
            detection.stop();
        }
    }

    pub fn is_detecting(&self) -> bool {
        self.detection
            .as_ref()
            .is_some_and(DetectionLoop::is_running)
    }

    fn current_source(&self) -> Result<Arc<dyn FrameSource>> {
        lock(&self.source)
            .clone()
            .ok_or_else(|| SightlineError::NotReady {
                component: "Frame source".to_string(),
            })
    }

    /// Describe the current frame now and narrate the result if it is new.
    pub async fn describe_now(&self) -> Result<TriggerOutcome> {
        let source = self.current_source()?;

        let outcome = self.requester.trigger(source.as_ref()).await?;
        if let TriggerOutcome::Published(result) = &outcome {
            self.player.submit(&result.text);
        }
        Ok(outcome)
    }

    /// Narrate arbitrary text through the same latest-wins player.
    pub fn speak(&self, text: &str) -> SubmitOutcome {
        self.player.submit(text)
    }

    /// Mute or unmute narration. Muting silences the current utterance.
    pub fn set_muted(&self, muted: bool) {
        let was_muted = self.settings.set_muted(muted);
        if muted && !was_muted {
            log::info!("Narration muted");
        }
        if muted {
            self.player.stop();
        }
    }

    pub fn is_muted(&self) -> bool {
        self.settings.is_muted()
    }

    /// Stop everything: detection, auto-describe, outstanding descriptions, audio.
    ///
    /// Returns immediately; in-flight calls drain in the background and their
    /// results are discarded. Idempotent.
    pub fn stop(&self) {
        self.stop_tasks();
        self.requester.stop();
        self.player.stop();
        *lock(&self.source) = None;
    }

    fn stop_tasks(&self) {
        if let Some(task) = lock(&self.auto_describe).take() {
            task.cancel();
        }
        self.stop_detection();
    }

    pub fn is_running(&self) -> bool {
        lock(&self.source).is_some()
    }

    pub fn latest_detections(&self) -> Arc<DetectionSet> {
        match &self.detection {
            Some(detection) => detection.latest(),
            None => Arc::new(DetectionSet::empty()),
        }
    }

    /// Watch detection results. None when running without a detection engine.
    pub fn subscribe_detections(&self) -> Option<watch::Receiver<Arc<DetectionSet>>> {
        self.detection.as_ref().map(DetectionLoop::subscribe)
    }

    pub fn subscribe_playing(&self) -> watch::Receiver<bool> {
        self.player.subscribe_playing()
    }

    pub fn last_description(&self) -> Option<String> {
        self.requester.last_description()
    }

    pub fn player(&self) -> &NarrationPlayer {
        &self.player
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockAudioSink;
    use crate::describe::MockDescriptionService;
    use crate::detect::{BoundingBox, Detection, MockDetectionEngine};
    use crate::error::ErrorKind;
    use crate::frame::MockFrameSource;
    use crate::narrate::MockNarrationService;
    use crate::pipeline::error::Origin;
    use crate::pipeline::events::{PipelineEvent, event_channel};

    struct Fixture {
        pipeline: Pipeline,
        description: Arc<MockDescriptionService>,
        narration: Arc<MockNarrationService>,
        sink: Arc<MockAudioSink>,
        events: crossbeam_channel::Receiver<PipelineEvent>,
    }

    fn fixture(
        description: MockDescriptionService,
        settings: Settings,
        config: PipelineConfig,
    ) -> Fixture {
        let engine = MockDetectionEngine::new("mock").with_response(vec![Detection::new(
            "person",
            0.9,
            BoundingBox::new(1.0, 2.0, 3.0, 4.0),
        )]);
        fixture_with_engine(Arc::new(engine), description, settings, config)
    }

    fn fixture_with_engine(
        engine: Arc<MockDetectionEngine>,
        description: MockDescriptionService,
        settings: Settings,
        config: PipelineConfig,
    ) -> Fixture {
        let description = Arc::new(description);
        let narration = Arc::new(MockNarrationService::new());
        let sink = Arc::new(MockAudioSink::new());
        let (events, rx) = event_channel(defaults::EVENT_BUFFER);

        let pipeline = Pipeline::new(
            PipelineServices {
                detection: Some(engine),
                description: description.clone(),
                narration: narration.clone(),
                audio: sink.clone(),
            },
            Arc::new(settings),
            config,
            events,
        );

        Fixture {
            pipeline,
            description,
            narration,
            sink,
            events: rx,
        }
    }

    fn keys() -> Settings {
        Settings::new("gemini-key", "xi-key")
    }

    #[tokio::test]
    async fn test_describe_now_without_source_is_not_ready() {
        let f = fixture(MockDescriptionService::new(), keys(), PipelineConfig::default());
        assert!(matches!(
            f.pipeline.describe_now().await,
            Err(SightlineError::NotReady { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_description_is_forwarded_to_narration() {
        let f = fixture(
            MockDescriptionService::new().with_response("A bench ahead."),
            keys(),
            PipelineConfig::default(),
        );
        f.pipeline.start(Arc::new(MockFrameSource::new()));

        let outcome = f.pipeline.describe_now().await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Published(_)));
        f.pipeline.player().wait_idle().await;

        assert_eq!(f.narration.texts(), vec!["A bench ahead."]);
        assert_eq!(f.sink.started_texts(), vec!["A bench ahead."]);
        assert_eq!(f.pipeline.last_description().as_deref(), Some("A bench ahead."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_description_is_not_narrated_twice() {
        let f = fixture(
            MockDescriptionService::new().with_response("Same."),
            keys(),
            PipelineConfig::default(),
        );
        f.pipeline.start(Arc::new(MockFrameSource::new()));

        f.pipeline.describe_now().await.unwrap();
        f.pipeline.player().wait_idle().await;
        f.pipeline.describe_now().await.unwrap();
        f.pipeline.player().wait_idle().await;

        assert_eq!(f.description.calls(), 2);
        assert_eq!(f.narration.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_muted_pipeline_describes_but_stays_silent() {
        let f = fixture(
            MockDescriptionService::new(),
            keys().with_muted(true),
            PipelineConfig::default(),
        );
        f.pipeline.start(Arc::new(MockFrameSource::new()));

        f.pipeline.describe_now().await.unwrap();
        assert!(f.pipeline.last_description().is_some());
        assert_eq!(f.narration.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_stops_current_narration() {
        let f = fixture(MockDescriptionService::new(), keys(), PipelineConfig::default());
        f.pipeline.speak("Long narration");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(f.sink.is_active());

        f.pipeline.set_muted(true);
        assert!(!f.sink.is_active());
        assert!(!f.pipeline.player().is_playing());
        assert!(f.pipeline.is_muted());

        f.pipeline.set_muted(false);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(f.sink.started_texts(), vec!["Long narration"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_describe_runs_on_timer() {
        let config = PipelineConfig {
            auto_describe: Duration::from_secs(5),
            ..PipelineConfig::default()
        };
        let f = fixture(MockDescriptionService::new(), keys(), config);
        f.pipeline.start(Arc::new(MockFrameSource::new()));

        tokio::time::sleep(Duration::from_millis(12_500)).await;
        // Immediately, then after 5s and 10s
        assert_eq!(f.description.calls(), 3);

        f.pipeline.stop();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(f.description.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detections_are_published() {
        let f = fixture(MockDescriptionService::new(), keys(), PipelineConfig::default());
        f.pipeline.start(Arc::new(MockFrameSource::new()));
        let mut rx = f.pipeline.subscribe_detections().unwrap();

        rx.wait_for(|set| !set.is_empty()).await.unwrap();
        let labels: Vec<String> = f
            .pipeline
            .latest_detections()
            .labels()
            .map(str::to_string)
            .collect();
        assert_eq!(labels, vec!["person"]);

        f.pipeline.stop();
        assert!(f.pipeline.latest_detections().is_empty());
        assert!(!f.pipeline.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_published_with_origin() {
        let f = fixture(
            MockDescriptionService::new().with_status(429),
            keys(),
            PipelineConfig::default(),
        );
        f.pipeline.start(Arc::new(MockFrameSource::new()));

        assert!(f.pipeline.describe_now().await.is_err());
        let error = f
            .events
            .try_iter()
            .find(|e| matches!(e, PipelineEvent::Error { .. }));
        assert_eq!(
            error,
            Some(PipelineEvent::Error {
                origin: Origin::Description,
                kind: ErrorKind::RateLimited,
                message: defaults::RATE_LIMIT_GUIDANCE.to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_stop_twice_and_before_start() {
        let f = fixture(MockDescriptionService::new(), keys(), PipelineConfig::default());
        f.pipeline.stop();
        f.pipeline.stop();
        assert!(!f.pipeline.is_running());
        assert!(f.pipeline.latest_detections().is_empty());
        assert_eq!(f.pipeline.last_description(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_survive_long_detection_stream() {
        let f = fixture(
            MockDescriptionService::new().with_status(429),
            keys(),
            PipelineConfig::default(),
        );
        f.pipeline.start(Arc::new(MockFrameSource::new()));
        // Hundreds of detection cycles with nobody draining events
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(f.pipeline.describe_now().await.is_err());
        let kinds: Vec<ErrorKind> = f
            .events
            .try_iter()
            .filter_map(|e| match e {
                PipelineEvent::Error { kind, .. } => Some(kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![ErrorKind::RateLimited]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_starts_once_model_is_ready() {
        let engine = Arc::new(MockDetectionEngine::new("mock").not_ready());
        let f = fixture_with_engine(
            engine.clone(),
            MockDescriptionService::new(),
            keys(),
            PipelineConfig::default(),
        );
        f.pipeline.start(Arc::new(MockFrameSource::new()));
        assert!(f.pipeline.is_running());
        assert!(!f.pipeline.is_detecting());

        engine.set_ready(true);
        f.pipeline.start_detection().unwrap();
        assert!(f.pipeline.is_detecting());

        let mut rx = f.pipeline.subscribe_detections().unwrap();
        rx.wait_for(|set| !set.is_empty()).await.unwrap();
        assert!(engine.calls() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_detection_leaves_narration_running() {
        let f = fixture(
            MockDescriptionService::new().with_response("A bench ahead."),
            keys(),
            PipelineConfig::default(),
        );
        f.pipeline.start(Arc::new(MockFrameSource::new()));
        let mut rx = f.pipeline.subscribe_detections().unwrap();
        rx.wait_for(|set| !set.is_empty()).await.unwrap();

        f.pipeline.stop_detection();
        f.pipeline.stop_detection();
        assert!(!f.pipeline.is_detecting());
        assert!(f.pipeline.latest_detections().is_empty());
        assert!(f.pipeline.is_running());

        let outcome = f.pipeline.describe_now().await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Published(_)));
        f.pipeline.player().wait_idle().await;
        assert_eq!(f.sink.started_texts(), vec!["A bench ahead."]);

        f.pipeline.start_detection().unwrap();
        assert!(f.pipeline.is_detecting());
    }

    #[tokio::test]
    async fn test_start_detection_needs_source() {
        let f = fixture(MockDescriptionService::new(), keys(), PipelineConfig::default());
        assert!(matches!(
            f.pipeline.start_detection(),
            Err(SightlineError::NotReady { .. })
        ));
        assert!(!f.pipeline.is_detecting());
    }
}
