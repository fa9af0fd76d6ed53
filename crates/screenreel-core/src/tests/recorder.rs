use crate::bus::{EventBus, MemoryBus, topic};
use crate::events::{ControlEvent, LifecycleEvent, answer_event, emit_event};
use crate::{
    CropArea, Recorder, RecorderConfig, RecorderError, RecorderOptions, RecorderState, Result,
    WorkerChild, WorkerSpawner,
};

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

/// How the fake worker behaves after being "spawned".
#[derive(Clone, Copy)]
enum Behavior {
    /// Acknowledges the start, reports the file, answers control requests.
    Normal,
    /// Stays alive but never emits anything.
    NeverStarts,
    /// Exits before acknowledging the start.
    ExitImmediately,
}

struct FakeChild {
    alive: Arc<watch::Sender<bool>>,
}

#[async_trait]
impl WorkerChild for FakeChild {
    fn terminate(&mut self) {
        let _ = self.alive.send_replace(false);
    }

    async fn kill(&mut self) -> Result<()> {
        let _ = self.alive.send_replace(false);
        Ok(())
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        let mut liveness = self.alive.subscribe();
        let _ = liveness.wait_for(|alive| !*alive).await;
        Ok(Some(0))
    }
}

/// In-process stand-in for the worker subprocess: a task on the same bus
/// honouring the worker's event contract.
struct FakeSpawner {
    bus: Arc<dyn EventBus>,
    behavior: Behavior,
    spawn_count: Arc<AtomicUsize>,
    children: Arc<Mutex<Vec<Arc<watch::Sender<bool>>>>>,
    process_ids: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl WorkerSpawner for FakeSpawner {
    #[allow(clippy::unwrap_used)]
    async fn spawn(&self, process_id: &str, _options_json: &str) -> Result<Box<dyn WorkerChild>> {
        self.spawn_count.fetch_add(1, Ordering::SeqCst);
        self.process_ids.lock().unwrap().push(process_id.to_owned());

        let initially_alive = !matches!(self.behavior, Behavior::ExitImmediately);
        let (alive, _) = watch::channel(initially_alive);
        let alive = Arc::new(alive);
        self.children.lock().unwrap().push(Arc::clone(&alive));

        if matches!(self.behavior, Behavior::Normal) {
            let paused = Arc::new(AtomicBool::new(false));

            let flag = Arc::clone(&paused);
            let _pause = answer_event(
                Arc::clone(&self.bus),
                process_id,
                ControlEvent::Pause.as_str(),
                move |_| flag.store(true, Ordering::SeqCst),
            );
            let flag = Arc::clone(&paused);
            let _resume = answer_event(
                Arc::clone(&self.bus),
                process_id,
                ControlEvent::Resume.as_str(),
                move |_| flag.store(false, Ordering::SeqCst),
            );
            let flag = Arc::clone(&paused);
            let _is_paused = answer_event(
                Arc::clone(&self.bus),
                process_id,
                ControlEvent::IsPaused.as_str(),
                move |incoming| {
                    let _ = incoming.answer(&flag.load(Ordering::SeqCst));
                },
            );

            emit_event(&self.bus, process_id, LifecycleEvent::Start.as_str(), None).await?;
            emit_event(
                &self.bus,
                process_id,
                LifecycleEvent::FileReady.as_str(),
                None,
            )
            .await?;
        }

        Ok(Box::new(FakeChild { alive }))
    }
}

struct Harness {
    recorder: Recorder,
    memory_bus: Arc<MemoryBus>,
    spawn_count: Arc<AtomicUsize>,
    children: Arc<Mutex<Vec<Arc<watch::Sender<bool>>>>>,
    process_ids: Arc<Mutex<Vec<String>>>,
}

fn harness(behavior: Behavior) -> Harness {
    let memory_bus = Arc::new(MemoryBus::new());
    let bus: Arc<dyn EventBus> = Arc::clone(&memory_bus) as Arc<dyn EventBus>;

    let spawn_count = Arc::new(AtomicUsize::new(0));
    let children = Arc::new(Mutex::new(Vec::new()));
    let process_ids = Arc::new(Mutex::new(Vec::new()));
    let spawner = FakeSpawner {
        bus: Arc::clone(&bus),
        behavior,
        spawn_count: Arc::clone(&spawn_count),
        children: Arc::clone(&children),
        process_ids: Arc::clone(&process_ids),
    };

    let config = RecorderConfig {
        start_timeout: Duration::from_millis(200),
        start_settle: Duration::ZERO,
        resume_settle: Duration::ZERO,
    };

    Harness {
        recorder: Recorder::with_parts(bus, Box::new(spawner), config),
        memory_bus,
        spawn_count,
        children,
        process_ids,
    }
}

/// WHAT: Starting twice without stopping fails and leaves the session alone
/// WHY: One orchestrator owns at most one worker handle
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_active_session_when_starting_again_then_already_started() {
    // Given: A started recording
    let mut h = harness(Behavior::Normal);
    h.recorder
        .start_recording(RecorderOptions::default())
        .await
        .unwrap();

    // When: Starting again
    let second = h.recorder.start_recording(RecorderOptions::default()).await;

    // Then: AlreadyStarted, only one spawn, and the first session still stops
    assert!(matches!(second, Err(RecorderError::AlreadyStarted { .. })));
    assert_eq!(h.spawn_count.load(Ordering::SeqCst), 1);
    assert!(h.recorder.stop_recording().await.is_ok());
}

/// WHAT: Control operations without a session fail with NotStarted
/// WHY: Fail fast instead of hanging on a worker that does not exist
#[tokio::test]
async fn given_no_session_when_controlling_then_not_started() {
    let mut h = harness(Behavior::Normal);

    assert!(matches!(
        h.recorder.pause().await,
        Err(RecorderError::NotStarted { .. })
    ));
    assert!(matches!(
        h.recorder.resume().await,
        Err(RecorderError::NotStarted { .. })
    ));
    assert!(matches!(
        h.recorder.is_paused().await,
        Err(RecorderError::NotStarted { .. })
    ));
    assert!(matches!(
        h.recorder.stop_recording().await,
        Err(RecorderError::NotStarted { .. })
    ));
    assert!(matches!(
        h.recorder.file_ready().await,
        Err(RecorderError::NotStarted { .. })
    ));
}

/// WHAT: A worker that never acknowledges is killed after the timeout
/// WHY: Bounded startup latency plus guaranteed reaping on the timeout path
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_silent_worker_when_timeout_elapses_then_killed_and_idle() {
    // Given: A worker that never emits onStart
    let mut h = harness(Behavior::NeverStarts);

    // When: Starting
    let outcome = h.recorder.start_recording(RecorderOptions::default()).await;

    // Then: StartTimeout, the worker is dead, and the recorder is reusable
    assert!(matches!(outcome, Err(RecorderError::StartTimeout { .. })));
    let children = h.children.lock().unwrap();
    assert!(!*children[0].borrow());
    assert_eq!(h.recorder.state(), RecorderState::Idle);
}

/// WHAT: A worker that exits before acknowledging fails the start
/// WHY: The caller gets the process failure, not a five-second stall
#[tokio::test]
async fn given_crashing_worker_when_starting_then_worker_process_error() {
    // Given: A worker that exits immediately
    let mut h = harness(Behavior::ExitImmediately);

    // When: Starting
    let outcome = h.recorder.start_recording(RecorderOptions::default()).await;

    // Then: WorkerProcess and back to Idle
    assert!(matches!(outcome, Err(RecorderError::WorkerProcess { .. })));
    assert_eq!(h.recorder.state(), RecorderState::Idle);
}

/// WHAT: Invalid options are rejected before any worker is spawned
/// WHY: Validation failures must have no side effects
#[tokio::test]
async fn given_invalid_options_when_starting_then_rejected_before_spawn() {
    let mut h = harness(Behavior::Normal);

    // Given/When: A non-finite crop field
    let bad_crop = RecorderOptions {
        crop_area: Some(CropArea {
            x: 0.0,
            y: 0.0,
            width: f64::NAN,
            height: 100.0,
        }),
        ..RecorderOptions::default()
    };
    let crop_outcome = h.recorder.start_recording(bad_crop).await;

    // And: An unknown codec name
    let bad_codec = RecorderOptions {
        video_codec: "av1".to_owned(),
        ..RecorderOptions::default()
    };
    let codec_outcome = h.recorder.start_recording(bad_codec).await;

    // Then: Both fail validation with zero spawns
    assert!(matches!(crop_outcome, Err(RecorderError::Validation { .. })));
    assert!(matches!(codec_outcome, Err(RecorderError::Validation { .. })));
    assert_eq!(h.spawn_count.load(Ordering::SeqCst), 0);
}

/// WHAT: Pause and resume round-trip through the worker's authoritative
///       pause state
/// WHY: The orchestrator's own state is advisory; isPaused asks the worker
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_live_recording_when_pausing_and_resuming_then_worker_state_tracks() {
    // Given: A live recording
    let mut h = harness(Behavior::Normal);
    h.recorder
        .start_recording(RecorderOptions::default())
        .await
        .unwrap();
    assert!(!h.recorder.is_paused().await.unwrap());

    // When: Pausing
    h.recorder.pause().await.unwrap();

    // Then: The worker reports paused
    assert!(h.recorder.is_paused().await.unwrap());
    assert_eq!(h.recorder.state(), RecorderState::Paused);

    // When: Resuming
    h.recorder.resume().await.unwrap();

    // Then: The worker reports running again
    assert!(!h.recorder.is_paused().await.unwrap());
    assert_eq!(h.recorder.state(), RecorderState::Recording);

    h.recorder.stop_recording().await.unwrap();
}

/// WHAT: Stop returns the destination established at start, and the
///       session's subscriptions are gone afterwards
/// WHY: Teardown must release every system-wide registration on every path
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_live_recording_when_stopped_then_path_returned_and_subscriptions_released() {
    // Given: A live recording whose file the worker already reported
    let mut h = harness(Behavior::Normal);
    h.recorder
        .start_recording(RecorderOptions::default())
        .await
        .unwrap();

    let ready_path = h.recorder.file_ready().await.unwrap();
    let process_id = h.process_ids.lock().unwrap()[0].clone();
    let ready_topic = topic::event_topic(&process_id, LifecycleEvent::FileReady.as_str());
    assert_eq!(h.memory_bus.subscriber_count(&ready_topic), 1);

    // When: Stopping
    let destination = h.recorder.stop_recording().await.unwrap();

    // Then: Same path as the file-ready future, and the listener is released
    assert_eq!(destination, ready_path);
    assert_eq!(h.memory_bus.subscriber_count(&ready_topic), 0);
    assert_eq!(h.recorder.state(), RecorderState::Idle);

    // And: The worker was reaped
    assert!(!*h.children.lock().unwrap()[0].borrow());
}
