// SPDX-License-Identifier: GPL-3.0-only

//! Camera and microphone capture with listener fan-out
//!
//! [`CaptureSource::configure`] rebuilds the capture graph from scratch:
//! the old inputs are stopped, permission is resolved per medium, and an
//! input is opened only for media that ended up authorized and have a
//! device. A medium that fails leaves the other one running. When nothing
//! could be opened the graph stays empty and no samples are delivered;
//! that is reported in the [`ConfigureReport`], never as an error.
//!
//! Graph changes and listener changes run on the source's serial queue, so
//! they are ordered with respect to each other.

use super::backend::{CaptureBackend, CaptureInput, InputOptions, SampleHandler};
use super::discovery::{select_audio_device, select_video_device};
use super::listeners::{SampleListener, SampleListeners, dispatch_sample};
use super::permissions::{PermissionProvider, resolve_permission};
use super::types::{CaptureDevice, MediaType};
use crate::dispatch::{Completion, SerialQueue, completion_channel};
use crate::errors::{CaptureError, CaptureResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// What happened to one medium during configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediumOutcome {
    /// Not requested
    Unused,
    /// Capturing from this device
    Active(CaptureDevice),
    Failed(CaptureError),
}

impl MediumOutcome {
    pub fn is_active(&self) -> bool {
        matches!(self, MediumOutcome::Active(_))
    }
}

/// Per-medium result of [`CaptureSource::configure`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureReport {
    pub video: MediumOutcome,
    pub audio: MediumOutcome,
}

impl ConfigureReport {
    pub fn outcome(&self, media: MediaType) -> &MediumOutcome {
        match media {
            MediaType::Video => &self.video,
            MediaType::Audio => &self.audio,
        }
    }

    /// No medium is delivering samples
    pub fn is_empty(&self) -> bool {
        !self.video.is_active() && !self.audio.is_active()
    }
}

/// Options fixed for the lifetime of a source
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    pub input: InputOptions,
    /// Camera id that wins over the category fallback
    pub preferred_video_device: Option<String>,
}

#[derive(Default)]
struct CaptureGraph {
    video: Option<Box<dyn CaptureInput>>,
    audio: Option<Box<dyn CaptureInput>>,
}

impl CaptureGraph {
    fn teardown(&mut self) {
        for input in [self.video.take(), self.audio.take()].into_iter().flatten() {
            let name = input.device().name.clone();
            match input.stop() {
                Ok(()) => debug!(device = %name, "Capture input stopped"),
                Err(e) => warn!(device = %name, error = %e, "Failed to stop capture input"),
            }
        }
    }

    fn slot(&mut self, media: MediaType) -> &mut Option<Box<dyn CaptureInput>> {
        match media {
            MediaType::Video => &mut self.video,
            MediaType::Audio => &mut self.audio,
        }
    }
}

fn lock(graph: &Mutex<CaptureGraph>) -> MutexGuard<'_, CaptureGraph> {
    graph.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the capture graph and the listeners fed by it
pub struct CaptureSource {
    queue: SerialQueue,
    graph: Arc<Mutex<CaptureGraph>>,
    listeners: Arc<SampleListeners>,
    backend: Arc<dyn CaptureBackend>,
    permissions: Arc<dyn PermissionProvider>,
    options: CaptureOptions,
    /// Keeps concurrent configure calls from interleaving their phases
    configuring: tokio::sync::Mutex<()>,
}

impl CaptureSource {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        permissions: Arc<dyn PermissionProvider>,
        options: CaptureOptions,
    ) -> CaptureResult<Self> {
        let queue = SerialQueue::new("capture-source")
            .map_err(|e| CaptureError::Backend(format!("Failed to spawn capture queue: {}", e)))?;
        Ok(Self {
            queue,
            graph: Arc::new(Mutex::new(CaptureGraph::default())),
            listeners: Arc::new(SampleListeners::default()),
            backend,
            permissions,
            options,
            configuring: tokio::sync::Mutex::new(()),
        })
    }

    /// Devices the backend currently reports
    pub fn devices(&self, media: MediaType) -> Vec<CaptureDevice> {
        self.backend.devices(media)
    }

    /// Register a listener without keeping it alive
    pub fn add_listener(&self, listener: &Arc<dyn SampleListener>) {
        let listeners = self.listeners.clone();
        let weak = Arc::downgrade(listener);
        self.queue.dispatch(move || {
            if let Some(listener) = weak.upgrade() {
                listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .add(&listener);
            }
        });
    }

    pub fn remove_all_listeners(&self) {
        let listeners = self.listeners.clone();
        self.queue.dispatch(move || {
            listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        });
    }

    /// Native rate of the active microphone
    pub fn audio_sample_rate(&self) -> Option<u32> {
        lock(&self.graph)
            .audio
            .as_ref()
            .and_then(|input| input.audio_sample_rate())
    }

    /// Rebuild the capture graph for the requested media
    ///
    /// Fails only with [`CaptureError::CallerDestroyed`] when the source's
    /// queue went away mid-call; per-medium problems are in the report.
    pub async fn configure(
        &self,
        want_video: bool,
        want_audio: bool,
    ) -> CaptureResult<ConfigureReport> {
        let _guard = self.configuring.lock().await;
        info!(want_video, want_audio, "Configuring capture");

        self.run_on_queue(|graph, _| {
            graph.teardown();
            Ok(())
        })
        .await?;

        let mut authorized = Vec::new();
        for (media, wanted) in [(MediaType::Video, want_video), (MediaType::Audio, want_audio)] {
            if wanted {
                authorized.push((
                    media,
                    resolve_permission(self.permissions.as_ref(), media).await,
                ));
            }
        }

        let backend = self.backend.clone();
        let options = self.options.clone();
        let report = self
            .run_on_queue(move |graph, listeners| {
                let mut report = ConfigureReport {
                    video: MediumOutcome::Unused,
                    audio: MediumOutcome::Unused,
                };
                for (media, granted) in authorized {
                    let outcome = if granted {
                        open_medium(backend.as_ref(), &options, media, graph, listeners)
                    } else {
                        warn!(media = %media, "Capture permission not granted");
                        MediumOutcome::Failed(CaptureError::PermissionDenied(media))
                    };
                    match media {
                        MediaType::Video => report.video = outcome,
                        MediaType::Audio => report.audio = outcome,
                    }
                }
                Ok(report)
            })
            .await?;

        if report.is_empty() && (want_video || want_audio) {
            warn!("No capture input could be opened, no samples will be delivered");
        }
        Ok(report)
    }

    /// Stop all inputs
    pub async fn shutdown(&self) -> CaptureResult<()> {
        let _guard = self.configuring.lock().await;
        self.run_on_queue(|graph, _| {
            graph.teardown();
            Ok(())
        })
        .await
    }

    async fn run_on_queue<T: Send + 'static>(
        &self,
        job: impl FnOnce(&mut CaptureGraph, &Arc<SampleListeners>) -> CaptureResult<T>
        + Send
        + 'static,
    ) -> CaptureResult<T> {
        let (completion, result): (Completion<T, CaptureError>, _) = completion_channel();
        let graph = Arc::downgrade(&self.graph);
        let listeners = self.listeners.clone();
        self.queue.dispatch(move || {
            let Some(graph) = graph.upgrade() else {
                completion.resolve(Err(CaptureError::CallerDestroyed));
                return;
            };
            let outcome = job(&mut lock(&graph), &listeners);
            completion.resolve(outcome);
        });
        result.await
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        lock(&self.graph).teardown();
    }
}

fn open_medium(
    backend: &dyn CaptureBackend,
    options: &CaptureOptions,
    media: MediaType,
    graph: &mut CaptureGraph,
    listeners: &Arc<SampleListeners>,
) -> MediumOutcome {
    let devices = backend.devices(media);
    let device = match media {
        MediaType::Video => {
            select_video_device(&devices, options.preferred_video_device.as_deref())
        }
        MediaType::Audio => select_audio_device(&devices),
    };
    let Some(device) = device else {
        warn!(media = %media, available = devices.len(), "No usable capture device");
        return MediumOutcome::Failed(CaptureError::DeviceUnavailable(media));
    };

    // Listeners are reached through a weak handle so a running input never
    // keeps the source's state alive
    let weak_listeners = Arc::downgrade(listeners);
    let handler: SampleHandler = Arc::new(move |sample| {
        if let Some(listeners) = weak_listeners.upgrade() {
            dispatch_sample(&listeners, &sample);
        }
    });

    match backend.open_input(device, &options.input, handler) {
        Ok(input) => {
            info!(media = %media, device = %device, "Capture input opened");
            *graph.slot(media) = Some(input);
            MediumOutcome::Active(device.clone())
        }
        Err(e) => {
            warn!(media = %media, device = %device, error = %e, "Failed to open capture input");
            MediumOutcome::Failed(e)
        }
    }
}
