//! Operator tooling behind `events`: ad-hoc exchanges and live listeners.

use crate::worker::{shutdown_signal, system_bus};

use screenreel_core::Result;
use screenreel_core::bus::topic;
use screenreel_core::events::{LifecycleEvent, answer_event, send_event};

use std::sync::Arc;

use tokio::sync::mpsc;

/// Perform one request/response exchange and print the reply payload.
pub(crate) async fn send(process_id: &str, event: &str, data: Option<String>) -> Result<()> {
    let bus = system_bus()?;
    let reply = send_event(&bus, process_id, event, data).await?;
    println!("{}", reply.payload.unwrap_or_default());
    Ok(())
}

/// Answer requests for one event, printing each payload as it arrives.
pub(crate) async fn listen(process_id: &str, event: &str, exit_after_first: bool) -> Result<()> {
    let bus = system_bus()?;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let subscription = answer_event(Arc::clone(&bus), process_id, event, move |incoming| {
        println!("{}", incoming.data().unwrap_or_default());
        incoming.acknowledge();
        let _ = seen_tx.send(());
    });

    if exit_after_first {
        let _ = seen_rx.recv().await;
    } else {
        while seen_rx.recv().await.is_some() {}
    }

    bus.unsubscribe(&subscription);
    Ok(())
}

/// Print every lifecycle event for a process id until interrupted.
pub(crate) async fn listen_all(process_id: &str) -> Result<()> {
    let bus = system_bus()?;
    let mut subscriptions = Vec::new();
    for event in LifecycleEvent::ALL {
        subscriptions.push(bus.subscribe(
            &topic::event_topic(process_id, event.as_str()),
            Arc::new(move |notification| {
                println!("{}: {}", event.as_str(), notification.payload.unwrap_or_default());
            }),
        ));
    }

    let outcome = shutdown_signal().await;
    for subscription in &subscriptions {
        bus.unsubscribe(subscription);
    }
    outcome
}
