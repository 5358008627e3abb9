//! Shared frame buffer: a single-slot, last-writer-wins mailbox.
//!
//! The capture thread overwrites the whole slot on every grab while holding
//! the lock. Consumers lock the same mutex to read. Nothing is queued: a
//! consumer that reads slower than the driver delivers simply skips frames.
//!
//! Readers announce themselves before blocking on the lock so the capture
//! thread can step aside between grabs instead of re-taking the mutex
//! straight away and starving them.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use super::types::{CaptureError, Frame, Resolution};

/// Fixed-size BGR buffer shared between the capture thread and its consumers.
///
/// Cloning is cheap and yields another handle to the same slot.
#[derive(Debug, Clone)]
pub struct SharedFrameBuffer {
    resolution: Resolution,
    bytes: Arc<Mutex<Vec<u8>>>,
    waiting_readers: Arc<AtomicUsize>,
}

/// Exclusive access to the buffer bytes. The lock is released on drop.
pub struct FrameGuard<'a> {
    guard: MutexGuard<'a, Vec<u8>>,
}

impl Deref for FrameGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard
    }
}

impl SharedFrameBuffer {
    /// Allocate a zero-filled buffer sized for one BGR frame at `resolution`.
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            bytes: Arc::new(Mutex::new(vec![0; resolution.frame_len()])),
            waiting_readers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wrap caller-allocated bytes. The length must be `width * height * 3`.
    pub fn from_vec(resolution: Resolution, bytes: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = resolution.frame_len();
        if bytes.len() != expected {
            return Err(CaptureError::BufferSizeMismatch {
                resolution,
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            resolution,
            bytes: Arc::new(Mutex::new(bytes)),
            waiting_readers: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Length in bytes. Fixed for the lifetime of the buffer.
    pub fn len(&self) -> usize {
        self.resolution.frame_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock the slot. Blocks while the capture thread is inside a grab.
    pub fn lock(&self) -> Result<FrameGuard<'_>, CaptureError> {
        self.waiting_readers.fetch_add(1, Ordering::SeqCst);
        let result = self.bytes.lock();
        self.waiting_readers.fetch_sub(1, Ordering::SeqCst);
        let guard = result.map_err(|_| CaptureError::Poisoned)?;
        Ok(FrameGuard { guard })
    }

    /// Lock the slot for the capture thread (not counted as a reader).
    pub(crate) fn lock_for_write(&self) -> Result<FrameGuard<'_>, CaptureError> {
        let guard = self.bytes.lock().map_err(|_| CaptureError::Poisoned)?;
        Ok(FrameGuard { guard })
    }

    /// True while some consumer is blocked in [`SharedFrameBuffer::lock`].
    pub(crate) fn has_waiting_readers(&self) -> bool {
        self.waiting_readers.load(Ordering::SeqCst) > 0
    }

    /// Run `f` on the current frame bytes while holding the lock.
    pub fn with_frame<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R, CaptureError> {
        let guard = self.lock()?;
        Ok(f(&guard))
    }

    /// Copy the current frame out of the slot.
    ///
    /// `sequence` is recorded on the returned frame; pass the session's
    /// frame count if the caller tracks it, or 0.
    pub fn snapshot(&self, sequence: u64) -> Result<Frame, CaptureError> {
        let data = self.with_frame(|bytes| bytes.to_vec())?;
        Ok(Frame {
            data,
            width: self.resolution.width,
            height: self.resolution.height,
            sequence,
            timestamp: Instant::now(),
        })
    }

    /// Copy the current frame into `dst`, reusing its allocation.
    pub fn copy_into(&self, dst: &mut Vec<u8>) -> Result<(), CaptureError> {
        self.with_frame(|bytes| {
            dst.clear();
            dst.extend_from_slice(bytes);
        })
    }

    /// True if both handles refer to the same slot.
    pub fn same_slot(&self, other: &SharedFrameBuffer) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}
