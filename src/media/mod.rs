// SPDX-License-Identifier: GPL-3.0-only

//! Media plumbing for recording
//!
//! # Frames
//!
//! Rendered frames reach the recorder as [`FrameTexture`]s. The
//! [`FrameConverter`] copies them into buffers from a [`PixelBufferPool`]
//! laid out exactly as the writer expects, so no allocation happens per
//! frame.
//!
//! # Encoding
//!
//! The [`encoders`] module picks the H.264 and AAC encoders available on
//! this system, hardware first. The [`writer`] module muxes both streams
//! into one MP4 file.
//!
//! # Modules
//!
//! - [`destination`]: output path, size and encoding profile
//! - [`pixel_pool`]: reusable CPU pixel buffers
//! - [`frame_converter`]: texture to pixel buffer copy
//! - [`encoders`]: encoder detection and selection
//! - [`writer`]: the muxing writer

pub mod destination;
pub mod encoders;
pub mod frame_converter;
pub mod pixel_pool;
pub mod writer;

pub use destination::{EncodeProfile, MediaDestination, PixelFormat, PixelLayout};
pub use frame_converter::{CpuFrame, FrameConverter, FrameTexture};
pub use pixel_pool::{PixelBuffer, PixelBufferPool};
pub use writer::{AudioSample, GstWriter, MediaChannel, MediaWriter, WriterStatus};
