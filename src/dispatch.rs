// SPDX-License-Identifier: GPL-3.0-only

//! Serial execution contexts
//!
//! A [`SerialQueue`] owns one named worker thread that runs submitted jobs
//! strictly in submission order. Every state mutation of a recording session
//! or capture source is funneled through one of these, so callers on the
//! render loop or the capture delivery threads never touch that state
//! directly and never block on it.
//!
//! Results flow back through a [`Completion`], which is resolved exactly
//! once: either by the job, or with the owner's "caller destroyed" error if
//! the job is dropped without running (queue shut down, owner released).
//!
//! [`ListenerSet`] is the fan-out side: a list of weakly held observers
//! that never keeps a listener alive and forgets it once it is gone.

use std::sync::{Arc, Weak, mpsc};
use std::thread;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors that can report an owner released mid-operation
pub trait AbandonedError {
    fn abandoned() -> Self;
}

impl AbandonedError for crate::errors::RecordingError {
    fn abandoned() -> Self {
        crate::errors::RecordingError::CallerDestroyed
    }
}

impl AbandonedError for crate::errors::CaptureError {
    fn abandoned() -> Self {
        crate::errors::CaptureError::CallerDestroyed
    }
}

/// A single dedicated thread processing jobs in FIFO order
pub struct SerialQueue {
    label: String,
    sender: mpsc::Sender<Job>,
}

impl SerialQueue {
    /// Spawn the worker thread
    pub fn new(label: &str) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let thread_label = label.to_string();

        thread::Builder::new()
            .name(label.to_string())
            .spawn(move || {
                debug!(queue = %thread_label, "Serial queue started");
                while let Ok(job) = receiver.recv() {
                    job();
                }
                debug!(queue = %thread_label, "Serial queue drained and stopped");
            })?;

        Ok(Self {
            label: label.to_string(),
            sender,
        })
    }

    /// Submit a job without waiting for it
    ///
    /// If the worker is gone the job is dropped, which resolves any
    /// [`Completion`] it captured.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        if self.sender.send(Box::new(job)).is_err() {
            warn!(queue = %self.label, "Serial queue is closed, job dropped");
        }
    }
}

// Dropping the queue closes the channel; the worker finishes the jobs already
// queued and exits on its own. It is never joined, so dropping a queue from
// inside one of its own jobs cannot deadlock.

/// One-shot result callback resolved exactly once
pub struct Completion<T, E: AbandonedError> {
    callback: Option<Box<dyn FnOnce(Result<T, E>) + Send + 'static>>,
}

impl<T, E: AbandonedError> Completion<T, E> {
    pub fn new(callback: impl FnOnce(Result<T, E>) + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Deliver the result
    pub fn resolve(mut self, result: Result<T, E>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl<T, E: AbandonedError> Drop for Completion<T, E> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(E::abandoned()));
        }
    }
}

/// Pair a completion with a future resolving to its result
///
/// A completion dropped unresolved yields the abandoned error, and so does a
/// sender that vanished without sending.
pub fn completion_channel<T, E>() -> (
    Completion<T, E>,
    impl std::future::Future<Output = Result<T, E>> + Send + 'static,
)
where
    T: Send + 'static,
    E: AbandonedError + Send + 'static,
{
    let (tx, rx) = tokio::sync::oneshot::channel();
    let completion = Completion::new(move |result| {
        let _ = tx.send(result);
    });
    let future = async move { rx.await.unwrap_or_else(|_| Err(E::abandoned())) };
    (completion, future)
}

/// Weakly held observers, notified in insertion order
pub struct ListenerSet<L: ?Sized> {
    entries: Vec<Weak<L>>,
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register `listener` without taking ownership of it
    pub fn add(&mut self, listener: &Arc<L>) {
        self.entries.push(Arc::downgrade(listener));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Registered entries, including ones not yet compacted away
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live listeners in insertion order
    ///
    /// Entries whose listener has been dropped are removed as a side effect.
    pub fn live(&mut self) -> Vec<Arc<L>> {
        let mut live = Vec::with_capacity(self.entries.len());
        self.entries.retain(|entry| match entry.upgrade() {
            Some(listener) => {
                live.push(listener);
                true
            }
            None => false,
        });
        live
    }
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}
