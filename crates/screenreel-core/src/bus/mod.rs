//! Publish/subscribe notification primitive with pluggable transports.
//!
//! The controller and the recorder worker are separate OS processes, so the
//! production transport ([`SocketBus`]) must be visible across process
//! boundaries. Tests and single-process embeddings substitute [`MemoryBus`]
//! through the [`EventBus`] seam.
//!
//! Delivery is at-most-once per live subscriber. A publish with no current
//! subscribers is a silent no-op: there is no queueing, and late subscribers
//! never see missed messages.

mod memory;
#[cfg(unix)]
mod socket;
pub mod topic;

pub use memory::MemoryBus;
#[cfg(unix)]
pub use socket::SocketBus;

use crate::Result;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

/// One message on the notification domain.
///
/// Constructed by the sender at publish time, read-only at the receiver,
/// discarded after the handler returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Addressable channel this message was published on.
    pub topic: String,
    /// Optional payload, serialized at the boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Present if and only if the sender expects exactly one answer there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_topic: Option<String>,
}

impl Notification {
    /// Fire-and-forget notification.
    pub fn new(topic: impl Into<String>, payload: Option<String>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            response_topic: None,
        }
    }

    /// Notification expecting exactly one answer on `response_topic`.
    pub fn with_response_topic(
        topic: impl Into<String>,
        payload: Option<String>,
        response_topic: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload,
            response_topic: Some(response_topic.into()),
        }
    }
}

/// Handler invoked at most once per notification published on a subscribed
/// topic. Must be re-invocable: a long-lived subscription sees one call per
/// publish for its whole lifetime.
pub type Handler = Arc<dyn Fn(Notification) + Send + Sync>;

/// Handle for one (topic → handler) binding.
///
/// Must be cancelled via [`EventBus::unsubscribe`] or the binding lives for
/// the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: Uuid,
    topic: String,
}

impl Subscription {
    pub(crate) fn new(topic: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.to_owned(),
        }
    }

    /// Topic this subscription is bound to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }
}

/// Publish/subscribe transport seam.
///
/// Implementations must keep `unsubscribe` idempotent and safe to call from
/// within a running handler (self-unsubscribing single-shot listeners).
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Register `handler` for `topic`, returning a cancellable handle.
    fn subscribe(&self, topic: &str, handler: Handler) -> Subscription;

    /// Cancel a subscription. No-op if already unsubscribed.
    fn unsubscribe(&self, subscription: &Subscription);

    /// Deliver `notification` to all current subscribers of its topic.
    /// Silent no-op when there are none.
    async fn publish(&self, notification: Notification) -> Result<()>;
}

/// Single-shot listener: resolves with the first notification on `topic`.
///
/// Later notifications are ignored. The caller owns the returned
/// [`Subscription`] and must still cancel it once the receiver has fired
/// (or when abandoning the wait).
pub fn subscribe_once(
    bus: &Arc<dyn EventBus>,
    topic: &str,
) -> (Subscription, oneshot::Receiver<Notification>) {
    let (tx, rx) = oneshot::channel();
    let slot = Mutex::new(Some(tx));
    let subscription = bus.subscribe(
        topic,
        Arc::new(move |notification| {
            let sender = match slot.lock() {
                Ok(mut guard) => guard.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            if let Some(sender) = sender {
                let _ = sender.send(notification);
            }
        }),
    );
    (subscription, rx)
}

/// Live subscription table shared by the bus implementations.
#[derive(Default)]
pub(crate) struct Registry {
    entries: Mutex<HashMap<String, Vec<(Uuid, Handler)>>>,
}

impl Registry {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(Uuid, Handler)>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn insert(&self, subscription: &Subscription, handler: Handler) {
        self.lock()
            .entry(subscription.topic().to_owned())
            .or_default()
            .push((subscription.id(), handler));
    }

    pub(crate) fn remove(&self, subscription: &Subscription) {
        let mut entries = self.lock();
        if let Some(handlers) = entries.get_mut(subscription.topic()) {
            handlers.retain(|(id, _)| *id != subscription.id());
            if handlers.is_empty() {
                entries.remove(subscription.topic());
            }
        }
    }

    /// Invoke every handler currently bound to the notification's topic.
    ///
    /// Handlers are cloned out of the table before invocation so a handler
    /// may unsubscribe (itself included) without deadlocking.
    pub(crate) fn dispatch(&self, notification: &Notification) {
        let handlers: Vec<Handler> = self
            .lock()
            .get(&notification.topic)
            .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in handlers {
            handler(notification.clone());
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self, topic: &str) -> usize {
        self.lock().get(topic).map_or(0, Vec::len)
    }
}
