//! Output side of the assistant's turn.

use async_trait::async_trait;
use std::time::Duration;

/// PCM format exchanged with the agent: 24 kHz mono, 16-bit little endian.
pub const SAMPLE_RATE: u32 = 24_000;
pub const CHANNELS: u16 = 1;
pub const BYTES_PER_SAMPLE: u32 = 2;

/// Silence appended after every response so playback never ends abruptly.
pub const SILENCE_PAD: Duration = Duration::from_millis(200);

/// Renders one complete response. The protocol loop awaits `play` before
/// capture may resume, so implementations return only once the audio,
/// padding included, has been handed to the device and drained.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    async fn play(&self, pcm: Vec<u8>) -> anyhow::Result<()>;
}

/// Zeroed PCM covering `duration` at the given rate and channel count.
pub fn silence(sample_rate: u32, channels: u16, duration: Duration) -> Vec<u8> {
    let byte_rate = sample_rate as f64 * channels as f64 * BYTES_PER_SAMPLE as f64;
    let len = (byte_rate * duration.as_secs_f64()) as usize;
    // Keep whole frames.
    let frame = channels as usize * BYTES_PER_SAMPLE as usize;
    vec![0; len - len % frame]
}

/// `pcm` followed by the standard silence pad.
pub fn with_silence_pad(mut pcm: Vec<u8>) -> Vec<u8> {
    pcm.extend(silence(SAMPLE_RATE, CHANNELS, SILENCE_PAD));
    pcm
}
