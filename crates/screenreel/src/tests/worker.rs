use crate::capture::{CaptureEngine, HeadlessEngine};
use crate::worker::run_with;

use screenreel_core::bus::{EventBus, MemoryBus, subscribe_once, topic};
use screenreel_core::events::send_event;
use screenreel_core::{RecorderError, WorkerOptions};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::timeout;

fn options_for(destination: &std::path::Path) -> WorkerOptions {
    WorkerOptions {
        destination: destination.to_path_buf(),
        frames_per_second: 30,
        crop_rect: None,
        show_cursor: true,
        highlight_clicks: false,
        screen_id: 0,
        audio_device_id: None,
        video_codec: Some("avc1".to_owned()),
    }
}

/// WHAT: The headless engine creates the destination on start and tracks
///       pause state
/// WHY: The protocol loop trusts `start` to make the file observable and
///      `is_paused` to be authoritative
#[test]
#[allow(clippy::unwrap_used)]
fn given_headless_engine_when_driven_then_file_exists_and_pause_tracks() {
    // Given: An engine and a scratch destination
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("capture.mp4");
    let mut engine = HeadlessEngine::default();

    // When: Starting
    engine.start(&options_for(&destination)).unwrap();

    // Then: The file exists and pause toggles
    assert!(destination.exists());
    assert!(!engine.is_paused());
    engine.pause();
    assert!(engine.is_paused());
    engine.resume();
    assert!(!engine.is_paused());
    engine.stop().unwrap();
}

/// WHAT: The protocol loop emits the lifecycle events and answers control
///       requests until shutdown
/// WHY: This is the worker half of the contract the controller's
///      orchestrator races against
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_worker_loop_when_driven_over_bus_then_contract_honoured() {
    // Given: A bus with lifecycle listeners registered before the worker
    let bus: Arc<dyn EventBus> = Arc::new(MemoryBus::new());
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("capture.mp4");
    let options_json = serde_json::to_string(&options_for(&destination)).unwrap();

    let (start_sub, start_rx) = subscribe_once(&bus, &topic::event_topic("w", "onStart"));
    let (ready_sub, ready_rx) = subscribe_once(&bus, &topic::event_topic("w", "onFileReady"));
    let (paused_sub, paused_rx) = subscribe_once(&bus, &topic::event_topic("w", "onPause"));
    let (finish_sub, finish_rx) = subscribe_once(&bus, &topic::event_topic("w", "onFinish"));

    // When: Running the protocol loop with an externally triggered shutdown
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let worker_bus = Arc::clone(&bus);
    let worker = tokio::spawn(async move {
        run_with(
            worker_bus,
            HeadlessEngine::default(),
            "w",
            &options_json,
            async move {
                let _ = shutdown_rx.await;
                Ok::<(), RecorderError>(())
            },
        )
        .await
    });

    // Then: onStart then onFileReady carrying the destination, which exists
    timeout(Duration::from_secs(2), start_rx)
        .await
        .unwrap()
        .unwrap();
    let ready = timeout(Duration::from_secs(2), ready_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        ready.payload.as_deref(),
        Some(destination.display().to_string().as_str())
    );
    assert!(destination.exists());

    // And: isPaused answers track pause/resume exchanges
    let reply = send_event(&bus, "w", "isPaused", None).await.unwrap();
    assert_eq!(reply.payload.as_deref(), Some("false"));

    send_event(&bus, "w", "pause", None).await.unwrap();
    let reply = send_event(&bus, "w", "isPaused", None).await.unwrap();
    assert_eq!(reply.payload.as_deref(), Some("true"));
    timeout(Duration::from_secs(2), paused_rx)
        .await
        .unwrap()
        .unwrap();

    send_event(&bus, "w", "resume", None).await.unwrap();
    let reply = send_event(&bus, "w", "isPaused", None).await.unwrap();
    assert_eq!(reply.payload.as_deref(), Some("false"));

    // When: Requesting shutdown
    shutdown_tx.send(()).unwrap();

    // Then: onFinish with no error payload and a clean exit
    let finish = timeout(Duration::from_secs(2), finish_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(finish.payload, None);
    worker.await.unwrap().unwrap();

    bus.unsubscribe(&start_sub);
    bus.unsubscribe(&ready_sub);
    bus.unsubscribe(&paused_sub);
    bus.unsubscribe(&finish_sub);
}

/// WHAT: Malformed options fail the loop before anything touches the bus
/// WHY: The controller serialized the options; garbage here is a
///      programming error, reported rather than half-started
#[tokio::test]
async fn given_malformed_options_when_running_worker_then_serialization_error() {
    let bus: Arc<dyn EventBus> = Arc::new(MemoryBus::new());
    let outcome = run_with(
        bus,
        HeadlessEngine::default(),
        "w",
        "{not json",
        async { Ok::<(), RecorderError>(()) },
    )
    .await;

    assert!(matches!(
        outcome,
        Err(RecorderError::Serialization { .. })
    ));
}
