//! Cross-process bus over Unix datagram sockets.
//!
//! Every bus instance binds its own datagram socket inside a shared root
//! directory (one per notification domain, normally the per-user runtime
//! dir). Publishing fans one datagram out to every live socket in that
//! directory, the publisher's own included, so local subscribers observe
//! local publishes too. Any process on the same root can publish or
//! subscribe to any topic it can name; isolation comes from topic naming,
//! not from the transport.

use crate::bus::{EventBus, Handler, Notification, Registry, Subscription};
use crate::{RecorderError, Result};

use std::{
    panic::Location,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use directories::BaseDirs;
use error_location::ErrorLocation;
use tokio::net::UnixDatagram;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Upper bound for one serialized envelope. Topics and payloads are short
/// control strings; anything larger is a protocol violation.
const MAX_DATAGRAM_BYTES: usize = 64 * 1024;

/// Event bus visible to every process sharing a root directory.
pub struct SocketBus {
    registry: Arc<Registry>,
    root: PathBuf,
    socket_path: PathBuf,
    reader: JoinHandle<()>,
}

impl SocketBus {
    /// Bus on the default per-user notification domain.
    ///
    /// Must be created inside a tokio runtime: delivery runs on a spawned
    /// background task.
    pub fn new() -> Result<Self> {
        Self::with_root(default_root())
    }

    /// Bus rooted at an explicit directory.
    ///
    /// Buses share a domain exactly when they share a root; tests use a
    /// scratch directory per test for isolation.
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let socket_path = root.join(format!("{}.sock", Uuid::new_v4()));
        let socket = UnixDatagram::bind(&socket_path).map_err(|e| RecorderError::Bus {
            reason: format!("failed to bind {}: {e}", socket_path.display()),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let registry = Arc::new(Registry::default());
        let reader = tokio::spawn(Self::dispatch_loop(socket, Arc::clone(&registry)));

        debug!(socket = %socket_path.display(), "Socket bus bound");

        Ok(Self {
            registry,
            root,
            socket_path,
            reader,
        })
    }

    async fn dispatch_loop(socket: UnixDatagram, registry: Arc<Registry>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
        loop {
            match socket.recv(&mut buf).await {
                Ok(len) => match serde_json::from_slice::<Notification>(&buf[..len]) {
                    Ok(notification) => {
                        trace!(topic = %notification.topic, "Dispatching notification");
                        registry.dispatch(&notification);
                    }
                    Err(e) => warn!(error = %e, "Dropped malformed datagram"),
                },
                Err(e) => {
                    warn!(error = %e, "Socket bus receive failed, stopping dispatch");
                    break;
                }
            }
        }
    }

    fn is_stale_peer(kind: std::io::ErrorKind) -> bool {
        matches!(
            kind,
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotFound
        )
    }
}

#[async_trait]
impl EventBus for SocketBus {
    fn subscribe(&self, topic: &str, handler: Handler) -> Subscription {
        let subscription = Subscription::new(topic);
        self.registry.insert(&subscription, handler);
        subscription
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        self.registry.remove(subscription);
    }

    async fn publish(&self, notification: Notification) -> Result<()> {
        let bytes = serde_json::to_vec(&notification)?;
        let sender = UnixDatagram::unbound().map_err(|e| RecorderError::Bus {
            reason: format!("failed to open sending socket: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("sock") {
                continue;
            }

            if let Err(e) = sender.send_to(&bytes, &path).await {
                if Self::is_stale_peer(e.kind()) && path != self.socket_path {
                    // Left behind by a peer that died without cleanup.
                    debug!(socket = %path.display(), "Reaping stale bus socket");
                    let _ = tokio::fs::remove_file(&path).await;
                } else {
                    warn!(socket = %path.display(), error = %e, "Failed to deliver notification");
                }
            }
        }

        Ok(())
    }
}

impl Drop for SocketBus {
    fn drop(&mut self) {
        self.reader.abort();
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

fn default_root() -> PathBuf {
    BaseDirs::new()
        .and_then(|dirs| dirs.runtime_dir().map(Path::to_path_buf))
        .unwrap_or_else(std::env::temp_dir)
        .join("screenreel-bus")
}
