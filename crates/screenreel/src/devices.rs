//! Capture-source enumeration backing the `list` subcommand.

use screenreel_core::{Device, RecorderError, Result};

use std::panic::Location;

use cpal::traits::{DeviceTrait, HostTrait};
use error_location::ErrorLocation;
use tracing::warn;

/// Screens available for capture.
///
/// The headless engine captures a single virtual display; a platform engine
/// replaces this with real output enumeration.
pub(crate) fn screens() -> Vec<Device> {
    vec![Device {
        id: "0".to_owned(),
        name: "Primary display".to_owned(),
    }]
}

/// Audio input devices known to the default host, keyed by name.
pub(crate) fn audio_devices() -> Result<Vec<Device>> {
    let host = cpal::default_host();
    let inputs = host
        .input_devices()
        .map_err(|e| RecorderError::Enumeration {
            reason: format!("audio input enumeration failed: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let mut devices = Vec::new();
    for input in inputs {
        match input.name() {
            Ok(name) => devices.push(Device {
                id: name.clone(),
                name,
            }),
            Err(e) => warn!(error = %e, "Skipping unnamed audio device"),
        }
    }
    Ok(devices)
}
