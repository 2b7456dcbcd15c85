// SPDX-License-Identifier: GPL-3.0-only

//! Capture backend abstraction
//!
//! ```text
//! ┌─────────────────────┐
//! │    CaptureSource    │  ← permissions, device choice, listener fan-out
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CaptureBackend trait│  ← enumerate, open one input per medium
//! └──────────┬──────────┘
//!            │
//!            ▼
//!      ┌───────────┐
//!      │ GStreamer │  ← concrete implementation
//!      └───────────┘
//! ```

use super::types::{CaptureDevice, CaptureSample, MediaType};
use crate::errors::CaptureResult;
use std::sync::Arc;

/// Receives every sample an input produces, on the backend's delivery thread
pub type SampleHandler = Arc<dyn Fn(CaptureSample) + Send + Sync>;

/// How an input should shape its output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputOptions {
    /// Flip video horizontally, the usual front camera convention
    pub mirror: bool,
}

impl Default for InputOptions {
    fn default() -> Self {
        Self { mirror: true }
    }
}

/// A running capture from one device
pub trait CaptureInput: Send {
    fn device(&self) -> &CaptureDevice;

    /// Native rate of an audio input, once known
    fn audio_sample_rate(&self) -> Option<u32> {
        None
    }

    /// Stop delivering samples and release the device
    fn stop(self: Box<Self>) -> CaptureResult<()>;
}

/// Platform capture implementation
pub trait CaptureBackend: Send + Sync {
    /// Devices currently available for `media`
    fn devices(&self, media: MediaType) -> Vec<CaptureDevice>;

    /// Start capturing from `device`, delivering samples to `handler`
    fn open_input(
        &self,
        device: &CaptureDevice,
        options: &InputOptions,
        handler: SampleHandler,
    ) -> CaptureResult<Box<dyn CaptureInput>>;
}
