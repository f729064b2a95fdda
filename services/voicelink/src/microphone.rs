//! Default input device feeding the capture queue.
//!
//! `cpal::Stream` is not `Send` on every platform, so each capture runs on
//! its own thread that owns the stream until told to stop.

use crate::audio_utils::{
    CAPTURE_CHUNK_FRAMES, REALTIME_PCM16_SAMPLE_RATE, StreamResampler, convert_f32_to_i16,
    downmix_to_mono, pcm16_to_bytes,
};
use anyhow::{Context, anyhow};
use cpal::{
    FromSample, SampleFormat, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use std::{
    sync::{Arc, mpsc},
    thread::JoinHandle,
};
use tracing::{error, info, warn};
use voicelink_core::{ActiveCapture, AudioBuffer, AudioInput};

/// Captures from the host's default input device.
#[derive(Debug, Default)]
pub struct Microphone;

impl Microphone {
    pub fn new() -> Self {
        Self
    }
}

impl AudioInput for Microphone {
    fn open(&self, buffer: Arc<AudioBuffer>) -> anyhow::Result<Box<dyn ActiveCapture>> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<()>>();

        let thread = std::thread::Builder::new()
            .name("microphone".to_string())
            .spawn(move || match start_stream(buffer) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Blocks until close() or the handle is dropped.
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .context("failed to spawn microphone thread")?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("microphone thread exited during setup"))??;
        info!("Microphone capture started.");
        Ok(Box::new(MicrophoneCapture {
            stop: Some(stop_tx),
            thread: Some(thread),
        }))
    }
}

struct MicrophoneCapture {
    stop: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ActiveCapture for MicrophoneCapture {
    fn close(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Microphone thread panicked.");
            }
            info!("Microphone capture closed.");
        }
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.close();
    }
}

fn start_stream(buffer: Arc<AudioBuffer>) -> anyhow::Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No microphone available."))?;
    let supported = device.default_input_config()?;
    info!(
        device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate = supported.sample_rate().0,
        channels = supported.channels(),
        format = ?supported.sample_format(),
        "Opening input device."
    );

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_input::<f32>(&device, &supported.config(), buffer)?,
        SampleFormat::I16 => build_input::<i16>(&device, &supported.config(), buffer)?,
        SampleFormat::U16 => build_input::<u16>(&device, &supported.config(), buffer)?,
        other => return Err(anyhow!("Unsupported input sample format {other:?}")),
    };
    stream.play()?;
    Ok(stream)
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: Arc<AudioBuffer>,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let mut resampler = StreamResampler::new(
        config.sample_rate.0 as f64,
        REALTIME_PCM16_SAMPLE_RATE,
        CAPTURE_CHUNK_FRAMES,
    )?;

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            // Skip the conversion work entirely while frames would be dropped.
            if !buffer.is_capturing() {
                return;
            }
            let samples: Vec<f32> = data.iter().map(|s| s.to_sample::<f32>()).collect();
            let mono = downmix_to_mono(&samples, channels);
            match resampler.push(&mono) {
                Ok(resampled) if !resampled.is_empty() => {
                    buffer.push(&pcm16_to_bytes(&convert_f32_to_i16(&resampled)));
                }
                Ok(_) => {}
                Err(e) => error!(error = ?e, "Capture resampling failed."),
            }
        },
        |err| error!(error = %err, "Input stream error."),
        None,
    )?;
    Ok(stream)
}
