use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Sample rate of the PCM16 audio exchanged with the realtime API.
pub const REALTIME_PCM16_SAMPLE_RATE: f64 = 24000.0;
/// Frames per capture chunk fed to the resampler.
pub const CAPTURE_CHUNK_FRAMES: usize = 1024;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,                     // No cutoff frequency, pass all frequencies
        PolynomialDegree::Cubic, // Cubic interpolation for quality
        chunk_size,
        1, // 1 channel (mono)
    )?;
    Ok(resampler)
}

/// Converts a slice of f32 samples to a vector of i16 samples.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Converts a slice of i16 samples to a vector of f32 samples.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

/// Little-endian PCM16 bytes as samples. A trailing odd byte is ignored.
pub fn pcm16_from_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

pub fn pcm16_to_bytes(pcm16: &[i16]) -> Vec<u8> {
    pcm16.iter().flat_map(|sample| sample.to_le_bytes()).collect()
}

/// Averages interleaved frames down to a single channel.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Repeats each mono sample across `channels` interleaved channels.
pub fn upmix_from_mono(mono: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return mono.to_vec();
    }
    mono.iter()
        .flat_map(|&sample| std::iter::repeat_n(sample, channels))
        .collect()
}

/// Resamples a continuous mono stream delivered in arbitrarily sized pieces.
///
/// The underlying resampler consumes fixed-size chunks, so input is buffered
/// until a whole chunk is available. Equal rates pass samples straight through.
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(in_rate: f64, out_rate: f64, chunk_size: usize) -> anyhow::Result<Self> {
        let inner = if (in_rate - out_rate).abs() < f64::EPSILON {
            None
        } else {
            Some(create_resampler(in_rate, out_rate, chunk_size)?)
        };
        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    /// Feeds `samples` and returns whatever output became available.
    pub fn push(&mut self, samples: &[f32]) -> anyhow::Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };
        self.pending.extend_from_slice(samples);
        let mut out = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            let resampled = resampler.process(&[chunk], None)?;
            out.extend_from_slice(&resampled[0]);
        }
        Ok(out)
    }

    /// Resamples whatever is still buffered, padding the last chunk.
    pub fn flush(&mut self) -> anyhow::Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        let input = [std::mem::take(&mut self.pending)];
        let resampled = resampler.process_partial(Some(&input[..]), None)?;
        Ok(resampled.into_iter().next().unwrap_or_default())
    }
}

/// Resamples a complete mono clip in one go.
pub fn resample_clip(samples: &[f32], in_rate: f64, out_rate: f64) -> anyhow::Result<Vec<f32>> {
    let mut resampler = StreamResampler::new(in_rate, out_rate, CAPTURE_CHUNK_FRAMES)?;
    let mut out = resampler.push(samples)?;
    out.extend(resampler.flush()?);
    Ok(out)
}
