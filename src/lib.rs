// SPDX-License-Identifier: GPL-3.0-only

//! Overlay Recorder - records a composited camera overlay with microphone audio
//!
//! The library synchronizes three independent producers into one MP4 file:
//! the display-synchronized render loop presenting frames, the capture
//! pipeline delivering camera and microphone samples, and the recording
//! session's own serial thread that converts, timestamps and appends them.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: camera and microphone capture, permissions, discovery
//! - [`pipelines`]: recording session, shared clock and render bridge
//! - [`media`]: pixel buffers, frame conversion, encoders and the writer
//! - [`gpu`]: explicitly owned wgpu device and frame readback
//! - [`dispatch`]: serial queues, one-shot completions, weak listener sets
//! - [`config`]: user configuration handling
//! - [`storage`]: output file locations
//!
//! # Example
//!
//! ```ignore
//! let session = RecordingSession::construct(destination)?;
//! session.start().await?;
//! notifier.add_listener(&bridge);      // frames flow from the renderer
//! session.finish().await?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod errors;
pub mod gpu;
pub mod media;
pub mod pipelines;
pub mod storage;

// Re-export commonly used types
pub use backends::camera::{CaptureSource, ConfigureReport, SampleListener};
pub use config::Config;
pub use constants::BitratePreset;
pub use errors::{AppError, AppResult, CaptureError, RecordingError};
pub use media::MediaDestination;
pub use pipelines::video::{
    FramePresentedListener, HostTime, PresentationNotifier, PresentedFrame, RecordingBridge,
    RecordingSession, WriterState,
};
