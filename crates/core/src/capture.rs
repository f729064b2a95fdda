use crate::audio_buffer::AudioBuffer;
use std::sync::Arc;

/// An input device that can feed captured PCM into an [`AudioBuffer`].
pub trait AudioInput: Send + Sync {
    /// Starts capture. Frames flow into `buffer` until the returned handle
    /// is closed or dropped; `buffer` decides whether they are kept.
    fn open(&self, buffer: Arc<AudioBuffer>) -> anyhow::Result<Box<dyn ActiveCapture>>;
}

/// A running capture stream.
pub trait ActiveCapture: Send {
    fn close(&mut self);
}
