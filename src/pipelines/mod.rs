// SPDX-License-Identifier: GPL-3.0-only

//! Processing pipelines
//!
//! ```text
//! ┌──────────────┐  video   ┌──────────────┐  presented  ┌──────────────────┐     ┌──────────┐
//! │ CaptureSource│ ───────▶ │   Renderer   │ ──────────▶ │ RecordingSession │ ──▶ │ MP4 File │
//! │              │          │ (overlay)    │   texture   │  - convert       │     │          │
//! │              │  audio   └──────────────┘             │  - timestamp     │     │          │
//! │              │ ──────────────────────────────────────▶│  - append        │     │          │
//! └──────────────┘                                        └──────────────────┘     └──────────┘
//! ```
//!
//! - [`video`]: recording session, clock, and render bridge

pub mod video;
