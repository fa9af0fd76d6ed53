use std::{panic::Location, result::Result as StdResult, time::Duration};

use error_location::ErrorLocation;
use thiserror::Error;

/// Errors surfaced by the recorder control plane.
///
/// All variants include `ErrorLocation` for call-site tracking.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Input rejected before any worker process was spawned.
    #[error("Invalid recording options: {reason} {location}")]
    Validation {
        /// Human-readable reason the options were rejected.
        reason: String,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// A control operation was called with no active recording session.
    #[error("Call `start_recording()` first {location}")]
    NotStarted {
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// `start_recording` was called while a session already exists.
    #[error("Call `stop_recording()` first {location}")]
    AlreadyStarted {
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// The worker did not acknowledge the start within the configured window.
    /// The worker process has been killed as part of handling this.
    #[error("Could not start recording within {timeout:?} {location}")]
    StartTimeout {
        /// The start-acknowledgement window that elapsed.
        timeout: Duration,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// The worker subprocess exited abnormally or reported a native failure.
    #[error("Recorder worker failed: {reason} {location}")]
    WorkerProcess {
        /// Diagnostic text produced by or about the worker.
        reason: String,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// Screen or audio device enumeration failed.
    #[error("Device enumeration failed: {reason} {location}")]
    Enumeration {
        /// Human-readable reason, including any raw listing output.
        reason: String,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// Event bus transport failure (bind, send, or a reply channel closed).
    #[error("Event bus error: {reason} {location}")]
    Bus {
        /// Human-readable reason for the transport failure.
        reason: String,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// Envelope, options, or listing (de)serialization failure.
    #[error("Serialization error: {source} {location}")]
    Serialization {
        /// The underlying serde_json error.
        #[source]
        source: serde_json::Error,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// IO error from filesystem or socket operations.
    #[error("IO error: {source} {location}")]
    Io {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
        /// Location where this error was created.
        location: ErrorLocation,
    },
}

// Manual From impls with location tracking.
// Cannot use #[from] because it does not support extra fields.
impl From<std::io::Error> for RecorderError {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        RecorderError::Io {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<serde_json::Error> for RecorderError {
    #[track_caller]
    fn from(source: serde_json::Error) -> Self {
        RecorderError::Serialization {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

/// Convenience type alias for Results using [`RecorderError`].
pub type Result<T> = StdResult<T, RecorderError>;
