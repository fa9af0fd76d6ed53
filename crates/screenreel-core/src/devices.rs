//! Capability queries: screen and audio-device enumeration.
//!
//! Enumeration is delegated to the worker binary, which prints a JSON array
//! of `{id, name}` on its **error** stream, deliberately: the listing must
//! never mix with protocol traffic on standard output.

use crate::{RecorderError, Result};

use std::{panic::Location, path::Path};

use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

/// One enumerable screen or audio device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Stable identifier to select the device in [`RecorderOptions`]
    /// (screen ids parse as integers).
    ///
    /// [`RecorderOptions`]: crate::RecorderOptions
    pub id: String,
    /// Human-readable device name.
    pub name: String,
}

/// List the screens available for capture.
pub async fn screens(worker_program: impl AsRef<Path>) -> Result<Vec<Device>> {
    list(worker_program.as_ref(), "screens").await
}

/// List the audio input devices available for capture.
pub async fn audio_devices(worker_program: impl AsRef<Path>) -> Result<Vec<Device>> {
    list(worker_program.as_ref(), "audio-devices").await
}

async fn list(program: &Path, kind: &str) -> Result<Vec<Device>> {
    let output = Command::new(program)
        .arg("list")
        .arg(kind)
        .output()
        .await
        .map_err(|e| RecorderError::Enumeration {
            reason: format!("failed to run {} list {kind}: {e}", program.display()),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let raw = String::from_utf8_lossy(&output.stderr);
    let raw = raw.trim();

    if !output.status.success() {
        return Err(RecorderError::Enumeration {
            reason: format!("`list {kind}` exited with {}: {raw}", output.status),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    debug!(kind, raw, "Device listing received");
    serde_json::from_str(raw).map_err(|e| RecorderError::Enumeration {
        reason: format!("unparseable `list {kind}` output ({e}): {raw}"),
        location: ErrorLocation::from(Location::caller()),
    })
}
