//! Capture queue shared between the device callback and the protocol loop.
//!
//! The device callback is the only producer and runs on its own thread, so
//! appends take a short mutex and never wait on anything else. The protocol
//! loop drains the whole queue once per poll.

use std::sync::{
    Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};
use tracing::debug;

#[derive(Debug, Default)]
pub struct AudioBuffer {
    queue: Mutex<Vec<u8>>,
    recording: AtomicBool,
    receiving: AtomicBool,
}

impl AudioBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, Vec<u8>> {
        // A panicking producer leaves plain bytes behind; keep using them.
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends one captured frame if capture is enabled and the assistant is
    /// not speaking. Returns whether the frame was kept.
    pub fn push(&self, frame: &[u8]) -> bool {
        if !self.is_capturing() {
            return false;
        }
        self.queue().extend_from_slice(frame);
        true
    }

    /// Takes everything captured so far, or `None` if nothing was.
    pub fn drain(&self) -> Option<Vec<u8>> {
        let bytes = std::mem::take(&mut *self.queue());
        (!bytes.is_empty()).then_some(bytes)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn is_receiving(&self) -> bool {
        self.receiving.load(Ordering::SeqCst)
    }

    pub fn is_capturing(&self) -> bool {
        self.is_recording() && !self.is_receiving()
    }

    pub fn start_recording(&self) {
        self.recording.store(true, Ordering::SeqCst);
        debug!("Capture enabled.");
    }

    pub fn stop_recording(&self) {
        self.recording.store(false, Ordering::SeqCst);
        debug!("Capture disabled.");
    }

    /// Enters the assistant's turn: capture is suspended until
    /// [`stop_receiving`](Self::stop_receiving) and a new recording start.
    pub fn start_receiving(&self) {
        self.receiving.store(true, Ordering::SeqCst);
        self.recording.store(false, Ordering::SeqCst);
    }

    pub fn stop_receiving(&self) {
        self.receiving.store(false, Ordering::SeqCst);
    }

    /// Clears queued audio and both gates. Used when a new connection starts.
    pub fn reset(&self) {
        self.queue().clear();
        self.recording.store(false, Ordering::SeqCst);
        self.receiving.store(false, Ordering::SeqCst);
    }
}
