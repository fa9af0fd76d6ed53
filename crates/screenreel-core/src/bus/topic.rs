//! Topic naming for the notification domain.
//!
//! Every topic is scoped by a process-instance id so concurrent recorder
//! workers never cross-talk. Response topics additionally carry a freshly
//! generated correlation suffix so concurrent exchanges on the same event
//! name cannot collide either.

use uuid::Uuid;

/// Prefix shared by every topic in the notification domain.
pub const TOPIC_NAMESPACE: &str = "screenreel";

/// Fully-qualified topic for `event` scoped to one worker instance.
pub fn event_topic(process_id: &str, event: &str) -> String {
    format!("{TOPIC_NAMESPACE}.{process_id}.{event}")
}

/// Freshly correlated reply topic for one pending exchange.
///
/// The uuid suffix must be unique for the lifetime of the exchange; a new
/// topic is minted per call.
pub fn response_topic(request_topic: &str) -> String {
    format!("{request_topic}.response.{}", Uuid::new_v4())
}
