// SPDX-License-Identifier: GPL-3.0-only

//! Reusable CPU pixel buffers for the encoder
//!
//! Buffers are allocated lazily up to the pool capacity and go back to the
//! pool when dropped, including when GStreamer releases a buffer it wrapped.
//! The capacity therefore also bounds how many frames can be in flight
//! between the session and the encoder.

use super::destination::PixelLayout;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, trace};

struct PoolShared {
    free: Mutex<Vec<Box<[u8]>>>,
    allocated: AtomicUsize,
}

/// Fixed-layout buffer pool owned by one recording session
pub struct PixelBufferPool {
    layout: PixelLayout,
    capacity: usize,
    shared: Arc<PoolShared>,
}

impl PixelBufferPool {
    pub fn new(layout: PixelLayout, capacity: usize) -> Self {
        debug!(
            width = layout.width,
            height = layout.height,
            bytes_per_row = layout.bytes_per_row,
            capacity,
            "Created pixel buffer pool"
        );
        Self {
            layout,
            capacity,
            shared: Arc::new(PoolShared {
                free: Mutex::new(Vec::with_capacity(capacity)),
                allocated: AtomicUsize::new(0),
            }),
        }
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffers currently sitting idle in the pool
    pub fn available(&self) -> usize {
        let free = self
            .shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        free + self.capacity - self.shared.allocated.load(Ordering::Acquire)
    }

    /// Take a buffer, or `None` when every buffer is in use
    pub fn acquire(&self) -> Option<PixelBuffer> {
        let recycled = self
            .shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let data = match recycled {
            Some(data) => data,
            None => {
                let grown = self.shared.allocated.fetch_update(
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    |n| (n < self.capacity).then_some(n + 1),
                );
                if grown.is_err() {
                    trace!(capacity = self.capacity, "Pixel buffer pool exhausted");
                    return None;
                }
                vec![0u8; self.layout.frame_size()].into_boxed_slice()
            }
        };

        Some(PixelBuffer {
            data: Some(data),
            layout: self.layout,
            pool: Arc::downgrade(&self.shared),
        })
    }
}

/// A pool-backed frame buffer
pub struct PixelBuffer {
    data: Option<Box<[u8]>>,
    layout: PixelLayout,
    pool: Weak<PoolShared>,
}

impl PixelBuffer {
    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    /// Exclusive access to the pixel memory
    ///
    /// The returned guard borrows the buffer mutably, so nothing else can
    /// read or write it until the guard is dropped.
    pub fn lock(&mut self) -> PixelBufferLock<'_> {
        let bytes_per_row = self.layout.bytes_per_row;
        PixelBufferLock {
            data: self.as_mut(),
            bytes_per_row,
        }
    }
}

impl AsRef<[u8]> for PixelBuffer {
    fn as_ref(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

impl AsMut<[u8]> for PixelBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PixelBuffer {
    fn drop(&mut self) {
        if let (Some(data), Some(pool)) = (self.data.take(), self.pool.upgrade()) {
            pool.free
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(data);
        }
    }
}

/// Locked view of a pixel buffer's memory
pub struct PixelBufferLock<'a> {
    data: &'a mut [u8],
    bytes_per_row: usize,
}

impl PixelBufferLock<'_> {
    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    pub fn data(&mut self) -> &mut [u8] {
        self.data
    }
}
