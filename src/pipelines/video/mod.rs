// SPDX-License-Identifier: GPL-3.0-only

//! Recording of rendered video plus microphone audio
//!
//! - [`clock`]: shared monotonic time base and per-session origin
//! - [`session`]: the writer state machine
//! - [`bridge`]: presented-frame notifications from the renderer

pub mod bridge;
pub mod clock;
pub mod session;

pub use bridge::{FramePresentedListener, PresentationNotifier, PresentedFrame, RecordingBridge};
pub use clock::{HostTime, SessionClock};
pub use session::{RecordingSession, RecordingStats, WriterState};
