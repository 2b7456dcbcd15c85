// SPDX-License-Identifier: GPL-3.0-only

//! Hand-off from the render loop to the recorder
//!
//! The renderer calls [`PresentationNotifier::frame_presented`] once per
//! frame, right after presenting it. Listeners receive the exact texture
//! that was shown and may only use it until their callback returns; the
//! renderer is free to draw into it again afterwards.
//!
//! [`RecordingBridge`] is the listener that feeds a [`RecordingSession`]:
//! it stages a readback of GPU textures inside the callback and queues the
//! staged copy on the session, so the render loop never waits on encoding.
//! Frames presented while the session is not writing are skipped before any
//! readback is staged.

use crate::dispatch::ListenerSet;
use crate::gpu::{GpuContext, wgpu};
use crate::media::frame_converter::CpuFrame;
use crate::pipelines::video::clock::HostTime;
use crate::pipelines::video::session::RecordingSession;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{trace, warn};

/// The frame that was just put on screen
#[derive(Clone, Copy)]
pub enum PresentedFrame<'a> {
    Gpu(&'a wgpu::Texture),
    Cpu(&'a CpuFrame),
}

/// Receives a callback for every presented frame
pub trait FramePresentedListener: Send + Sync {
    /// `frame` is valid only for the duration of this call
    fn on_frame_presented(&self, frame: PresentedFrame<'_>, presented_at: HostTime);
}

/// Fan-out point owned by the renderer
#[derive(Default)]
pub struct PresentationNotifier {
    listeners: Mutex<ListenerSet<dyn FramePresentedListener>>,
}

impl PresentationNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: &Arc<dyn FramePresentedListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(listener);
    }

    pub fn remove_all_listeners(&self) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Notify every live listener that `frame` was presented now
    pub fn frame_presented(&self, frame: PresentedFrame<'_>) {
        let presented_at = HostTime::now();
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live();
        for listener in listeners {
            listener.on_frame_presented(frame, presented_at);
        }
    }
}

/// Forwards presented frames to the current recording session
pub struct RecordingBridge {
    gpu: Option<Arc<GpuContext>>,
    session: Mutex<Option<Arc<RecordingSession>>>,
}

impl RecordingBridge {
    /// `gpu` must be the context the renderer draws with; without one only
    /// CPU frames can be recorded.
    pub fn new(gpu: Option<Arc<GpuContext>>) -> Self {
        Self {
            gpu,
            session: Mutex::new(None),
        }
    }

    /// Route frames to `session` from now on
    pub fn attach(&self, session: Arc<RecordingSession>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    /// Stop routing frames and return the session that was attached
    pub fn detach(&self) -> Option<Arc<RecordingSession>> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn current(&self) -> Option<Arc<RecordingSession>> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FramePresentedListener for RecordingBridge {
    fn on_frame_presented(&self, frame: PresentedFrame<'_>, presented_at: HostTime) {
        let Some(session) = self.current() else {
            trace!("No session attached, presented frame ignored");
            return;
        };
        if !session.accepts_frames() {
            trace!("Session is not writing, presented frame ignored");
            return;
        }

        match frame {
            PresentedFrame::Cpu(frame) => session.submit_video_frame(frame.clone(), presented_at),
            PresentedFrame::Gpu(texture) => {
                let Some(gpu) = &self.gpu else {
                    warn!("GPU frame presented but the bridge has no GPU context");
                    return;
                };
                match gpu.snapshot(texture) {
                    Ok(readback) => session.submit_video_frame(readback, presented_at),
                    Err(e) => warn!(error = %e, "Failed to stage presented frame"),
                }
            }
        }
    }
}
