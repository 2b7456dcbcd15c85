// SPDX-License-Identifier: GPL-3.0-only

//! Hardware access
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 Host / CLI                  │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │               Backend Layer                 │
//! │  ┌──────────────────────────────────────┐   │
//! │  │  Camera + microphone (GStreamer)     │   │
//! │  └──────────────────────────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! - [`camera`]: capture source, device discovery and permissions

pub mod camera;
