//! The `record` protocol loop.
//!
//! Decodes the resolved options handed over by the controller, drives a
//! [`CaptureEngine`], and honours the event contract: Answerers for
//! `pause`/`resume`/`isPaused`, `onStart` then `onFileReady` once capture is
//! live, `onPause`/`onResume` on transitions, and `onFinish` after the
//! engine stopped. Runs until SIGTERM or SIGINT.

use crate::capture::{CaptureEngine, HeadlessEngine};

use screenreel_core::bus::EventBus;
use screenreel_core::events::{ControlEvent, LifecycleEvent, answer_event, emit_event};
use screenreel_core::{Result, WorkerOptions};

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

/// Run one recording session on the system-wide bus until signalled.
pub(crate) async fn run(process_id: &str, options_json: &str) -> Result<()> {
    let bus = system_bus()?;
    run_with(
        bus,
        HeadlessEngine::default(),
        process_id,
        options_json,
        shutdown_signal(),
    )
    .await
}

/// The bus shared with the controller process.
pub(crate) fn system_bus() -> Result<Arc<dyn EventBus>> {
    #[cfg(unix)]
    {
        let bus = screenreel_core::bus::SocketBus::new()?;
        Ok(Arc::new(bus))
    }
    #[cfg(not(unix))]
    {
        use error_location::ErrorLocation;
        use std::panic::Location;
        Err(screenreel_core::RecorderError::Bus {
            reason: "the system-wide event bus requires unix domain sockets".to_owned(),
            location: ErrorLocation::from(Location::caller()),
        })
    }
}

/// Resolves when the process is asked to stop (SIGTERM or SIGINT).
#[cfg(unix)]
pub(crate) async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigterm.recv() => {}
        outcome = tokio::signal::ctrl_c() => outcome?,
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

/// Protocol loop over explicit parts, the seam the tests drive.
pub(crate) async fn run_with<E, F>(
    bus: Arc<dyn EventBus>,
    engine: E,
    process_id: &str,
    options_json: &str,
    shutdown: F,
) -> Result<()>
where
    E: CaptureEngine + 'static,
    F: Future<Output = Result<()>>,
{
    let options: WorkerOptions = serde_json::from_str(options_json)?;
    let destination = options.destination.clone();

    let engine = Arc::new(Mutex::new(engine));
    lock(&engine).start(&options)?;

    // Answerers go up before the start announcement so the controller can
    // issue control requests the moment it sees onStart.
    let mut subscriptions = Vec::new();

    let handle = Arc::clone(&engine);
    let emitter = Arc::clone(&bus);
    let pid = process_id.to_owned();
    subscriptions.push(answer_event(
        Arc::clone(&bus),
        process_id,
        ControlEvent::Pause.as_str(),
        move |_| {
            lock(&handle).pause();
            announce(&emitter, &pid, LifecycleEvent::Pause);
        },
    ));

    let handle = Arc::clone(&engine);
    let emitter = Arc::clone(&bus);
    let pid = process_id.to_owned();
    subscriptions.push(answer_event(
        Arc::clone(&bus),
        process_id,
        ControlEvent::Resume.as_str(),
        move |_| {
            lock(&handle).resume();
            announce(&emitter, &pid, LifecycleEvent::Resume);
        },
    ));

    let handle = Arc::clone(&engine);
    subscriptions.push(answer_event(
        Arc::clone(&bus),
        process_id,
        ControlEvent::IsPaused.as_str(),
        move |incoming| {
            let paused = lock(&handle).is_paused();
            if let Err(e) = incoming.answer(&paused) {
                warn!(error = %e, "Failed to serialize pause state");
            }
        },
    ));

    emit_event(&bus, process_id, LifecycleEvent::Start.as_str(), None).await?;
    emit_event(
        &bus,
        process_id,
        LifecycleEvent::FileReady.as_str(),
        Some(destination.display().to_string()),
    )
    .await?;
    info!(process_id, destination = %destination.display(), "Session live");

    let shutdown_outcome = shutdown.await;
    info!(process_id, "Shutdown requested, stopping capture");

    let stop_outcome = lock(&engine).stop();
    let finish_payload = stop_outcome.as_ref().err().map(ToString::to_string);
    emit_event(
        &bus,
        process_id,
        LifecycleEvent::Finish.as_str(),
        finish_payload,
    )
    .await?;

    for subscription in &subscriptions {
        bus.unsubscribe(subscription);
    }

    stop_outcome?;
    shutdown_outcome
}

/// Broadcast a lifecycle transition from inside a sync Answerer handler.
fn announce(bus: &Arc<dyn EventBus>, process_id: &str, event: LifecycleEvent) {
    let bus = Arc::clone(bus);
    let process_id = process_id.to_owned();
    tokio::spawn(async move {
        if let Err(e) = emit_event(&bus, &process_id, event.as_str(), None).await {
            warn!(error = %e, event = event.as_str(), "Failed to announce transition");
        }
    });
}

fn lock<E: CaptureEngine>(engine: &Arc<Mutex<E>>) -> MutexGuard<'_, E> {
    match engine.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
