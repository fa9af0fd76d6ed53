//! In-process bus for tests and single-process embeddings.

use crate::Result;
use crate::bus::{EventBus, Handler, Notification, Registry, Subscription};

use async_trait::async_trait;
use tracing::trace;

/// Event bus backed by a process-local subscription table.
///
/// Cross-process visibility is the [`SocketBus`](crate::bus::SocketBus)'s
/// job; this implementation exists so tests and single-process embeddings
/// can run without touching the filesystem.
#[derive(Default)]
pub struct MemoryBus {
    registry: Registry,
}

impl MemoryBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, topic: &str) -> usize {
        self.registry.len(topic)
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    fn subscribe(&self, topic: &str, handler: Handler) -> Subscription {
        let subscription = Subscription::new(topic);
        self.registry.insert(&subscription, handler);
        subscription
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        self.registry.remove(subscription);
    }

    async fn publish(&self, notification: Notification) -> Result<()> {
        trace!(topic = %notification.topic, "Dispatching notification");
        self.registry.dispatch(&notification);
        Ok(())
    }
}
