// SPDX-License-Identifier: GPL-3.0-only

//! Camera and microphone capture
//!
//! - [`types`]: devices, samples and permission states
//! - [`discovery`]: ordered device fallback
//! - [`permissions`]: portal and fixed permission providers
//! - [`listeners`]: weakly held sample observers
//! - [`backend`]: the platform capture trait
//! - [`gst_backend`]: GStreamer implementation
//! - [`source`]: [`CaptureSource`], tying all of the above together

pub mod backend;
pub mod discovery;
pub mod gst_backend;
pub mod listeners;
pub mod permissions;
pub mod source;
pub mod types;

pub use backend::{CaptureBackend, CaptureInput, InputOptions, SampleHandler};
pub use discovery::{CATEGORY_FALLBACK, select_audio_device, select_video_device};
pub use gst_backend::GstCaptureBackend;
pub use listeners::SampleListener;
pub use permissions::{PermissionProvider, PortalPermissions, StaticPermissions};
pub use source::{CaptureOptions, CaptureSource, ConfigureReport, MediumOutcome};
pub use types::*;
