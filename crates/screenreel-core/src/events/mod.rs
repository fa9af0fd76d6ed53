//! Correlated request/response exchanges over the event bus.
//!
//! An exchange has two roles. The *Answerer* holds a long-lived subscription
//! on the fixed topic for `(process id, event)` and answers each incoming
//! request at most once; if its handler forgets to answer, an empty reply is
//! published automatically so the requester can never hang on a handled
//! request. The *Requester* mints a fresh response topic per call, publishes
//! the request, and suspends until the single reply arrives.
//!
//! There is no timeout at this layer. A request published while no Answerer
//! is subscribed is silently dropped by the bus, so callers needing bounded
//! latency must race the exchange against their own timer (the orchestrator's
//! start path does exactly that).

use crate::bus::{EventBus, Notification, Subscription, subscribe_once, topic};
use crate::{RecorderError, Result};

use std::{panic::Location, sync::Arc};

use error_location::ErrorLocation;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Lifecycle events emitted by a recorder worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The worker has begun capturing. Emitted once.
    Start,
    /// The destination file exists and is being written. Emitted once.
    FileReady,
    /// The worker acted on a pause request.
    Pause,
    /// The worker acted on a resume request.
    Resume,
    /// The worker is done, cleanly or not; it exits right after emitting
    /// this. On failure the payload carries the error message.
    Finish,
}

impl LifecycleEvent {
    /// Every lifecycle event, in emit order.
    pub const ALL: [LifecycleEvent; 5] = [
        LifecycleEvent::Start,
        LifecycleEvent::FileReady,
        LifecycleEvent::Pause,
        LifecycleEvent::Resume,
        LifecycleEvent::Finish,
    ];

    /// Wire name of the event.
    pub const fn as_str(self) -> &'static str {
        match self {
            LifecycleEvent::Start => "onStart",
            LifecycleEvent::FileReady => "onFileReady",
            LifecycleEvent::Pause => "onPause",
            LifecycleEvent::Resume => "onResume",
            LifecycleEvent::Finish => "onFinish",
        }
    }
}

/// Control requests a recorder worker answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Suspend capture. Answered with an empty ack.
    Pause,
    /// Resume capture. Answered with an empty ack.
    Resume,
    /// Query pause state. Answered with a boolean payload.
    IsPaused,
}

impl ControlEvent {
    /// Wire name of the request.
    pub const fn as_str(self) -> &'static str {
        match self {
            ControlEvent::Pause => "pause",
            ControlEvent::Resume => "resume",
            ControlEvent::IsPaused => "isPaused",
        }
    }
}

/// One incoming correlated request, answerable at most once.
pub struct EventNotification {
    notification: Notification,
    reply: Option<Option<String>>,
}

impl EventNotification {
    fn new(notification: Notification) -> Self {
        Self {
            notification,
            reply: None,
        }
    }

    /// Raw payload carried by the request, if any.
    pub fn data(&self) -> Option<&str> {
        self.notification.payload.as_deref()
    }

    /// Answer with a serialized value.
    ///
    /// Only the first answer per request has effect; later calls are no-ops
    /// so a reply can never be double-published.
    pub fn answer<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<()> {
        if self.reply.is_some() {
            debug!(topic = %self.notification.topic, "Request already answered, ignoring");
            return Ok(());
        }
        self.reply = Some(Some(serde_json::to_string(data)?));
        Ok(())
    }

    /// Answer with an empty payload.
    pub fn acknowledge(&mut self) {
        if self.reply.is_none() {
            self.reply = Some(None);
        }
    }
}

/// Register an Answerer for `(process_id, event)`.
///
/// `handler` runs once per incoming request, in arrival order, on a
/// dedicated task. If it returns without answering, an empty answer is
/// published automatically (liveness guarantee). The returned subscription
/// must be retained and cancelled at teardown; cancelling also stops the
/// answering task.
pub fn answer_event<F>(
    bus: Arc<dyn EventBus>,
    process_id: &str,
    event: &str,
    handler: F,
) -> Subscription
where
    F: Fn(&mut EventNotification) + Send + Sync + 'static,
{
    let request_topic = topic::event_topic(process_id, event);
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();

    let subscription = bus.subscribe(
        &request_topic,
        Arc::new(move |notification| {
            let _ = tx.send(notification);
        }),
    );

    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            let mut incoming = EventNotification::new(notification);
            handler(&mut incoming);

            let Some(response_topic) = incoming.notification.response_topic.clone() else {
                continue;
            };
            let payload = incoming.reply.flatten();
            let reply = Notification::new(response_topic, payload);
            if let Err(e) = bus.publish(reply).await {
                warn!(error = %e, "Failed to publish answer");
            }
        }
    });

    subscription
}

/// Perform one Requester exchange: publish `data` on the fixed topic for
/// `(process_id, event)` and suspend until the single correlated reply.
///
/// No timeout is imposed here; see the module docs.
pub async fn send_event(
    bus: &Arc<dyn EventBus>,
    process_id: &str,
    event: &str,
    data: Option<String>,
) -> Result<Notification> {
    let request_topic = topic::event_topic(process_id, event);
    let response_topic = topic::response_topic(&request_topic);

    let (subscription, reply_rx) = subscribe_once(bus, &response_topic);
    let request = Notification::with_response_topic(&request_topic, data, &response_topic);
    bus.publish(request).await?;

    let reply = reply_rx.await;
    bus.unsubscribe(&subscription);

    reply.map_err(|_| RecorderError::Bus {
        reason: format!("reply channel for `{event}` closed before a response arrived"),
        location: ErrorLocation::from(Location::caller()),
    })
}

/// Broadcast a lifecycle event with no reply expected.
pub async fn emit_event(
    bus: &Arc<dyn EventBus>,
    process_id: &str,
    event: &str,
    data: Option<String>,
) -> Result<()> {
    let notification = Notification::new(topic::event_topic(process_id, event), data);
    bus.publish(notification).await
}
