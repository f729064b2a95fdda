//! Plays assistant responses through the default output device.

use crate::audio_utils::{
    REALTIME_PCM16_SAMPLE_RATE, convert_i16_to_f32, pcm16_from_bytes, resample_clip,
    upmix_from_mono,
};
use anyhow::anyhow;
use async_trait::async_trait;
use cpal::{
    FromSample, SampleFormat, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use ringbuf::{
    HeapCons, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};
use std::{sync::mpsc, time::Duration};
use tracing::{debug, error, info};
use voicelink_core::{PlaybackSink, playback::with_silence_pad};

/// Extra wait beyond the clip's own length before giving up on the device.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Blocking playback on the host's default output device. Each clip opens
/// its own stream, so device changes between responses are picked up.
#[derive(Debug, Default)]
pub struct Speaker;

impl Speaker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlaybackSink for Speaker {
    async fn play(&self, pcm: Vec<u8>) -> anyhow::Result<()> {
        if pcm.is_empty() {
            return Ok(());
        }
        let padded = with_silence_pad(pcm);
        tokio::task::spawn_blocking(move || play_blocking(&padded)).await?
    }
}

fn play_blocking(pcm: &[u8]) -> anyhow::Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No speaker available."))?;
    let supported = device.default_output_config()?;
    let config = supported.config();
    let device_rate = config.sample_rate.0 as f64;
    let channels = config.channels as usize;

    let mono = convert_i16_to_f32(&pcm16_from_bytes(pcm));
    let resampled = resample_clip(&mono, REALTIME_PCM16_SAMPLE_RATE, device_rate)?;
    let samples = upmix_from_mono(&resampled, channels);
    let duration = Duration::from_secs_f64(resampled.len() as f64 / device_rate);
    debug!(
        samples = samples.len(),
        device_rate,
        channels,
        "Playing {:.2}s of audio.",
        duration.as_secs_f64()
    );

    let rb = HeapRb::<f32>::new(samples.len().max(1));
    let (mut producer, consumer) = rb.split();
    producer.push_slice(&samples);

    let (drained_tx, drained_rx) = mpsc::channel::<()>();
    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_output::<f32>(&device, &config, consumer, drained_tx)?,
        SampleFormat::I16 => build_output::<i16>(&device, &config, consumer, drained_tx)?,
        SampleFormat::U16 => build_output::<u16>(&device, &config, consumer, drained_tx)?,
        other => return Err(anyhow!("Unsupported output sample format {other:?}")),
    };
    stream.play()?;

    if drained_rx.recv_timeout(duration + DRAIN_GRACE).is_err() {
        info!("Playback did not drain in time, stopping stream.");
    }
    drop(stream);
    Ok(())
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<f32>,
    drained: mpsc::Sender<()>,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut signalled = false;
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for out in data.iter_mut() {
                // Silence once the clip has run out.
                *out = T::from_sample(consumer.try_pop().unwrap_or(0.0));
            }
            if consumer.is_empty() && !signalled {
                signalled = true;
                let _ = drained.send(());
            }
        },
        |err| error!(error = %err, "Output stream error."),
        None,
    )?;
    Ok(stream)
}
