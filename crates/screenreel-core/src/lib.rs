//! Screenreel core library.
//!
//! Drives and observes a long-running recorder worker process through
//! asynchronous, correlated messages: a cross-process publish/subscribe bus,
//! single-shot request/response exchanges on top of it, and an orchestrator
//! that owns the worker's lifecycle end to end.
//!
//! # Example
//!
//! ```no_run
//! use screenreel_core::{Recorder, RecorderOptions};
//!
//! #[tokio::main]
//! async fn main() -> screenreel_core::Result<()> {
//!     let mut recorder = Recorder::new("screenreel")?;
//!     recorder.start_recording(RecorderOptions::default()).await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(3)).await;
//!
//!     let video = recorder.stop_recording().await?;
//!     println!("Recorded to {}", video.display());
//!     Ok(())
//! }
//! ```

pub mod bus;
mod codecs;
mod devices;
mod error;
pub mod events;
mod recorder;

pub use {
    codecs::{supports_hevc_hardware_encoding, video_codecs},
    devices::{Device, audio_devices, screens},
    error::{RecorderError, Result},
    recorder::{
        CommandSpawner, CropArea, Recorder, RecorderConfig, RecorderOptions, RecorderState,
        WorkerChild, WorkerOptions, WorkerSpawner,
    },
};

#[cfg(test)]
mod tests;
