//! Worker orchestration: spawn, start-acknowledgement race, control
//! exchanges, and guaranteed teardown.

mod options;
mod spawner;

pub use options::{CropArea, RecorderOptions, WorkerOptions};
pub use spawner::{CommandSpawner, WorkerChild, WorkerSpawner};

use crate::bus::{EventBus, Subscription, subscribe_once, topic};
use crate::events::{ControlEvent, LifecycleEvent, send_event};
use crate::{RecorderError, Result, codecs};

use std::{
    panic::Location,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use error_location::ErrorLocation;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Tunables for one [`Recorder`].
///
/// The settle delays match the empirically observed lag between a worker's
/// acknowledgement and it actually producing frames; they are defaults, not
/// constants, so deployments can tune them without touching the state
/// machine.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// How long to wait for the worker's start acknowledgement before
    /// killing it and failing the start.
    pub start_timeout: Duration,
    /// Pause after the start acknowledgement before reporting success.
    pub start_settle: Duration,
    /// Pause after the resume acknowledgement before returning.
    pub resume_settle: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(5),
            start_settle: Duration::from_secs(1),
            resume_settle: Duration::from_secs(1),
        }
    }
}

/// Advisory recorder state.
///
/// Pause state is authoritative only in the worker; confirm it with
/// [`Recorder::is_paused`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// No session exists.
    Idle,
    /// A worker was spawned and its start acknowledgement is pending.
    Starting,
    /// The worker acknowledged the start.
    Recording,
    /// The worker acknowledged a pause request.
    Paused,
    /// Teardown is in progress.
    Stopping,
}

struct Session {
    process_id: String,
    destination: PathBuf,
    child: Box<dyn WorkerChild>,
    subscriptions: Vec<Subscription>,
    file_ready: watch::Receiver<Option<PathBuf>>,
}

enum StartOutcome {
    Acked(bool),
    TimedOut,
    Exited(Result<Option<i32>>),
}

/// Drives and observes one recorder worker process.
///
/// One `Recorder` owns at most one live session. Callers are expected to
/// serialize control calls on one instance; independent instances are fully
/// isolated from each other through their generated process-instance ids.
pub struct Recorder {
    bus: Arc<dyn EventBus>,
    spawner: Box<dyn WorkerSpawner>,
    config: RecorderConfig,
    state: RecorderState,
    session: Option<Session>,
}

impl Recorder {
    /// Recorder on the system-wide socket bus, spawning `worker_program`
    /// for each session.
    #[cfg(unix)]
    pub fn new(worker_program: impl Into<PathBuf>) -> Result<Self> {
        let bus: Arc<dyn EventBus> = Arc::new(crate::bus::SocketBus::new()?);
        Ok(Self::with_parts(
            bus,
            Box::new(CommandSpawner::new(worker_program)),
            RecorderConfig::default(),
        ))
    }

    /// Recorder over an explicit transport, spawner, and configuration.
    pub fn with_parts(
        bus: Arc<dyn EventBus>,
        spawner: Box<dyn WorkerSpawner>,
        config: RecorderConfig,
    ) -> Self {
        Self {
            bus,
            spawner,
            config,
            state: RecorderState::Idle,
            session: None,
        }
    }

    /// Current advisory state.
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Start a recording session.
    ///
    /// Validates the options and resolves the codec before anything is
    /// spawned, then races the worker's start acknowledgement against
    /// [`RecorderConfig::start_timeout`].
    ///
    /// # Errors
    ///
    /// `AlreadyStarted` if a session exists; `Validation` for a malformed
    /// crop area or unsupported codec; `StartTimeout` if the worker never
    /// acknowledged (it has been killed); `WorkerProcess` if it exited
    /// before acknowledging.
    #[instrument(skip(self, options))]
    pub async fn start_recording(&mut self, options: RecorderOptions) -> Result<()> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyStarted {
                location: ErrorLocation::from(Location::caller()),
            });
        }

        options.validate()?;
        let codec_tag = codecs::resolve(&options.video_codec)?;

        let process_id = Uuid::new_v4().simple().to_string();
        let destination = std::env::temp_dir().join(format!("screenreel-{process_id}.mp4"));
        let worker_options = options.resolved(&destination, codec_tag);
        let options_json = serde_json::to_string(&worker_options)?;

        // Listeners go up before the spawn so nothing the worker emits can
        // be missed.
        let start_topic = topic::event_topic(&process_id, LifecycleEvent::Start.as_str());
        let (start_sub, start_rx) = subscribe_once(&self.bus, &start_topic);

        let (ready_tx, ready_rx) = watch::channel(None);
        let ready_destination = destination.clone();
        let ready_sub = self.bus.subscribe(
            &topic::event_topic(&process_id, LifecycleEvent::FileReady.as_str()),
            Arc::new(move |_| {
                let _ = ready_tx.send(Some(ready_destination.clone()));
            }),
        );

        self.state = RecorderState::Starting;
        let mut child = match self.spawner.spawn(&process_id, &options_json).await {
            Ok(child) => child,
            Err(e) => {
                self.bus.unsubscribe(&start_sub);
                self.bus.unsubscribe(&ready_sub);
                self.state = RecorderState::Idle;
                return Err(e);
            }
        };

        let outcome = tokio::select! {
            acked = start_rx => StartOutcome::Acked(acked.is_ok()),
            () = tokio::time::sleep(self.config.start_timeout) => StartOutcome::TimedOut,
            code = child.wait() => StartOutcome::Exited(code),
        };
        self.bus.unsubscribe(&start_sub);

        match outcome {
            StartOutcome::Acked(true) => {
                tokio::time::sleep(self.config.start_settle).await;
                info!(process_id, destination = %destination.display(), "Recording started");
                self.session = Some(Session {
                    process_id,
                    destination,
                    child,
                    subscriptions: vec![ready_sub],
                    file_ready: ready_rx,
                });
                self.state = RecorderState::Recording;
                Ok(())
            }
            StartOutcome::Acked(false) => {
                let _ = child.kill().await;
                self.bus.unsubscribe(&ready_sub);
                self.state = RecorderState::Idle;
                Err(RecorderError::Bus {
                    reason: "start listener dropped before the worker acknowledged".to_owned(),
                    location: ErrorLocation::from(Location::caller()),
                })
            }
            StartOutcome::TimedOut => {
                warn!(process_id, "Worker did not acknowledge start, killing it");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill unresponsive worker");
                }
                self.bus.unsubscribe(&ready_sub);
                self.state = RecorderState::Idle;
                Err(RecorderError::StartTimeout {
                    timeout: self.config.start_timeout,
                    location: ErrorLocation::from(Location::caller()),
                })
            }
            StartOutcome::Exited(code) => {
                self.bus.unsubscribe(&ready_sub);
                self.state = RecorderState::Idle;
                let mut reason = match code {
                    Ok(code) => format!("worker exited with status {code:?} before acknowledging start"),
                    Err(e) => format!("worker became unwaitable before acknowledging start: {e}"),
                };
                if let Some(diagnostic) = child.diagnostic() {
                    reason.push_str(": ");
                    reason.push_str(&diagnostic);
                }
                Err(RecorderError::WorkerProcess {
                    reason,
                    location: ErrorLocation::from(Location::caller()),
                })
            }
        }
    }

    /// Pause the recording, waiting for the worker's acknowledgement.
    ///
    /// The exchange is unbounded: it assumes the worker stays live once
    /// started.
    #[instrument(skip(self))]
    pub async fn pause(&mut self) -> Result<()> {
        let process_id = self.require_session()?.process_id.clone();
        send_event(&self.bus, &process_id, ControlEvent::Pause.as_str(), None).await?;
        self.state = RecorderState::Paused;
        debug!(process_id, "Recording paused");
        Ok(())
    }

    /// Resume the recording, waiting for the worker's acknowledgement plus
    /// [`RecorderConfig::resume_settle`].
    #[instrument(skip(self))]
    pub async fn resume(&mut self) -> Result<()> {
        let process_id = self.require_session()?.process_id.clone();
        send_event(&self.bus, &process_id, ControlEvent::Resume.as_str(), None).await?;
        tokio::time::sleep(self.config.resume_settle).await;
        self.state = RecorderState::Recording;
        debug!(process_id, "Recording resumed");
        Ok(())
    }

    /// Query the worker's authoritative pause state.
    #[instrument(skip(self))]
    pub async fn is_paused(&self) -> Result<bool> {
        let process_id = self.require_session()?.process_id.clone();
        let reply = send_event(&self.bus, &process_id, ControlEvent::IsPaused.as_str(), None).await?;
        Ok(reply
            .payload
            .as_deref()
            .and_then(|payload| serde_json::from_str::<bool>(payload).ok())
            .unwrap_or(false))
    }

    /// Stop the recording and return the destination path.
    ///
    /// Unconditional: terminates the worker and reaps it without waiting
    /// for the worker's own finish event, whose flush can race the
    /// termination signal arbitrarily. Every subscription owned by the
    /// session is cancelled before this returns. The caller owns the
    /// returned file.
    #[instrument(skip(self))]
    pub async fn stop_recording(&mut self) -> Result<PathBuf> {
        let mut session = self.session.take().ok_or_else(|| RecorderError::NotStarted {
            location: ErrorLocation::from(Location::caller()),
        })?;
        self.state = RecorderState::Stopping;

        session.child.terminate();
        if let Err(e) = session.child.wait().await {
            warn!(error = %e, "Failed to reap worker");
        }
        for subscription in &session.subscriptions {
            self.bus.unsubscribe(subscription);
        }

        self.state = RecorderState::Idle;
        info!(
            process_id = session.process_id,
            destination = %session.destination.display(),
            "Recording stopped"
        );
        Ok(session.destination)
    }

    /// Wait until the worker reports the destination file exists and yield
    /// its path.
    ///
    /// Safe to call from several tasks at once. Resolves to `NotStarted` if
    /// the session is torn down before the worker ever reported the file.
    pub async fn file_ready(&self) -> Result<PathBuf> {
        let mut ready = self.require_session()?.file_ready.clone();
        loop {
            if let Some(path) = ready.borrow_and_update().clone() {
                return Ok(path);
            }
            ready.changed().await.map_err(|_| RecorderError::NotStarted {
                location: ErrorLocation::from(Location::caller()),
            })?;
        }
    }

    #[track_caller]
    fn require_session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or_else(|| RecorderError::NotStarted {
            location: ErrorLocation::from(Location::caller()),
        })
    }
}
