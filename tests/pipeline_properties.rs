//! End-to-end behavior of the pipeline components through the public API,
//! using the mock services on a paused tokio clock.

use sightline::audio::MockAudioSink;
use sightline::describe::{
    DescriptionRequester, MockDescriptionService, MockReply, TriggerOutcome,
};
use sightline::detect::{BoundingBox, Detection, DetectionLoop, MockDetectionEngine};
use sightline::frame::MockFrameSource;
use sightline::narrate::{MockNarrationService, NarrationPlayer, PlayerState, SubmitOutcome};
use sightline::pipeline::{
    IntervalTicker, Pipeline, PipelineConfig, PipelineEvent, PipelineServices, event_channel,
};
use sightline::{Settings, SightlineError};
use std::sync::Arc;
use std::time::Duration;

fn settings() -> Arc<Settings> {
    Arc::new(Settings::new("gemini-key", "xi-key"))
}

fn person(confidence: f32) -> Detection {
    Detection::new("person", confidence, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
}

#[tokio::test(start_paused = true)]
async fn concurrent_triggers_make_one_call() {
    let service =
        Arc::new(MockDescriptionService::new().with_delay(Duration::from_millis(500)));
    let requester = Arc::new(DescriptionRequester::new(service.clone(), settings()));
    let source = Arc::new(MockFrameSource::new());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let requester = requester.clone();
        let source = source.clone();
        handles.push(tokio::spawn(async move {
            requester.trigger(source.as_ref()).await
        }));
    }

    let mut published = 0;
    let mut busy = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            TriggerOutcome::Published(_) => published += 1,
            TriggerOutcome::Busy => busy += 1,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(service.calls(), 1);
    assert_eq!(published, 1);
    assert_eq!(busy, 7);
}

#[tokio::test]
async fn identical_descriptions_publish_once() {
    let service = Arc::new(MockDescriptionService::new().with_replies(vec![
        MockReply::Text("Two chairs by a window.".to_string()),
        MockReply::Text("Two chairs by a window.".to_string()),
    ]));
    let (events, rx) = event_channel(16);
    let requester = DescriptionRequester::new(service.clone(), settings()).with_event_sender(events);
    let source = MockFrameSource::new();

    let first = requester.trigger(&source).await.unwrap();
    let second = requester.trigger(&source).await.unwrap();

    assert!(matches!(first, TriggerOutcome::Published(_)));
    assert!(matches!(second, TriggerOutcome::Unchanged));
    assert_eq!(service.calls(), 2);
    let descriptions = rx
        .try_iter()
        .filter(|e| matches!(e, PipelineEvent::Description { .. }))
        .count();
    assert_eq!(descriptions, 1);
}

#[tokio::test(start_paused = true)]
async fn rapid_submissions_play_first_and_last() {
    let narration = Arc::new(MockNarrationService::new());
    let sink = Arc::new(MockAudioSink::new());
    let player = NarrationPlayer::new(narration.clone(), sink.clone(), settings());

    assert_eq!(player.submit("A"), SubmitOutcome::Started);
    assert_eq!(player.submit("B"), SubmitOutcome::Queued);
    assert_eq!(player.submit("C"), SubmitOutcome::Replaced);

    player.wait_idle().await;
    assert_eq!(sink.started_texts(), vec!["A", "C"]);
    assert_eq!(narration.texts(), vec!["A", "C"]);
    assert_eq!(player.state(), PlayerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn playback_never_overlaps() {
    let sink = Arc::new(MockAudioSink::new().with_clip_duration(Duration::from_millis(300)));
    let (events, rx) = event_channel(64);
    let player = NarrationPlayer::new(Arc::new(MockNarrationService::new()), sink.clone(), settings())
        .with_event_sender(events);

    for text in ["one", "two", "three", "four"] {
        player.submit(text);
        tokio::time::sleep(Duration::from_millis(120)).await;
    }
    player.wait_idle().await;

    assert_eq!(sink.overlaps(), 0);
    let mut sounding = false;
    let mut starts = 0;
    for event in rx.try_iter() {
        match event {
            PipelineEvent::NarrationStarted { .. } => {
                assert!(!sounding, "started while another clip was sounding");
                sounding = true;
                starts += 1;
            }
            PipelineEvent::NarrationFinished { .. } => {
                assert!(sounding);
                sounding = false;
            }
            _ => {}
        }
    }
    assert!(!sounding);
    assert!(starts >= 2);
}

#[tokio::test(start_paused = true)]
async fn slow_inference_lowers_detection_rate() {
    let engine = Arc::new(MockDetectionEngine::new("slow").with_delay(Duration::from_millis(100)));
    let detection = DetectionLoop::new(engine.clone())
        .with_ticker(Arc::new(IntervalTicker::new(Duration::ZERO)));

    detection.start(Arc::new(MockFrameSource::new())).unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    detection.stop();

    // ceil(1000 / 100) + 1
    assert!(engine.calls() <= 11, "issued {} calls", engine.calls());
    assert!(engine.calls() >= 5);
    assert_eq!(engine.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_everywhere() {
    let detection = DetectionLoop::new(Arc::new(MockDetectionEngine::new("mock")));
    detection.stop();
    detection.stop();
    assert!(!detection.is_running());
    assert!(detection.latest().is_empty());

    let requester = DescriptionRequester::new(Arc::new(MockDescriptionService::new()), settings());
    requester.stop();
    requester.stop();
    assert!(!requester.is_in_flight());
    assert_eq!(requester.last_description(), None);

    let player = NarrationPlayer::new(
        Arc::new(MockNarrationService::new()),
        Arc::new(MockAudioSink::new()),
        settings(),
    );
    player.stop();
    player.stop();
    assert_eq!(player.state(), PlayerState::Idle);
    assert_eq!(player.pending(), None);

    let (events, _rx) = event_channel(16);
    let pipeline = Pipeline::new(
        PipelineServices {
            detection: Some(Arc::new(MockDetectionEngine::new("mock"))),
            description: Arc::new(MockDescriptionService::new()),
            narration: Arc::new(MockNarrationService::new()),
            audio: Arc::new(MockAudioSink::new()),
        },
        settings(),
        PipelineConfig::default(),
        events,
    );
    pipeline.start(Arc::new(MockFrameSource::new()));
    pipeline.stop();
    pipeline.stop();
    assert!(!pipeline.is_running());
    assert!(pipeline.latest_detections().is_empty());
}

#[tokio::test(start_paused = true)]
async fn confidence_threshold_is_exclusive() {
    let engine = MockDetectionEngine::new("mock").with_response(vec![
        Detection::new("cup", 0.5, BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
        person(0.51),
    ]);
    let detection = DetectionLoop::new(Arc::new(engine));
    let mut rx = detection.subscribe();

    detection.start(Arc::new(MockFrameSource::new())).unwrap();
    rx.wait_for(|set| !set.is_empty()).await.unwrap();

    let labels: Vec<String> = detection.latest().labels().map(str::to_string).collect();
    assert_eq!(labels, vec!["person"]);
    detection.stop();
}

#[tokio::test]
async fn http_429_is_rate_limited() {
    let requester = DescriptionRequester::new(
        Arc::new(MockDescriptionService::new().with_status(429)),
        settings(),
    );

    let result = requester.trigger(&MockFrameSource::new()).await;
    assert!(
        matches!(result, Err(SightlineError::RateLimited { .. })),
        "expected RateLimited, got {:?}",
        result
    );
    assert!(!requester.is_in_flight());
}
