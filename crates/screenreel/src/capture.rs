//! Capture engine seam.
//!
//! The protocol loop in [`worker`](crate::worker) is engine-agnostic; real
//! screen/audio capture plugs in behind [`CaptureEngine`]. The shipped
//! [`HeadlessEngine`] honours the full contract without capturing anything,
//! which is what the protocol tests and bus-level integration need.

use screenreel_core::{Result, WorkerOptions};

use std::fs::File;
use std::path::PathBuf;

use tracing::{debug, info};

/// One capture session's engine. Created per `record` invocation.
pub(crate) trait CaptureEngine: Send {
    /// Begin capturing. The destination file exists once this returns.
    fn start(&mut self, options: &WorkerOptions) -> Result<()>;

    /// Suspend capture. No-op while already paused.
    fn pause(&mut self);

    /// Resume capture. No-op while not paused.
    fn resume(&mut self);

    /// Authoritative pause state.
    fn is_paused(&self) -> bool;

    /// Stop capturing and flush the destination file.
    fn stop(&mut self) -> Result<()>;
}

/// Engine that performs no capture but keeps every observable promise:
/// the destination file exists after `start` and pause state is tracked.
#[derive(Default)]
pub(crate) struct HeadlessEngine {
    destination: Option<PathBuf>,
    paused: bool,
}

impl CaptureEngine for HeadlessEngine {
    fn start(&mut self, options: &WorkerOptions) -> Result<()> {
        File::create(&options.destination)?;
        info!(
            destination = %options.destination.display(),
            fps = options.frames_per_second,
            "Headless capture started"
        );
        self.destination = Some(options.destination.clone());
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
        debug!("Headless capture paused");
    }

    fn resume(&mut self) {
        self.paused = false;
        debug!("Headless capture resumed");
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(destination) = self.destination.take() {
            info!(destination = %destination.display(), "Headless capture stopped");
        }
        Ok(())
    }
}
