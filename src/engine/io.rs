//! Audio decoding for fxrender
//!
//! The engine consumes an audio-decode capability: bytes in, [`AudioBuffer`]
//! out. [`WavDecoder`] provides it for PCM and float WAV via `hound`. Decoded
//! audio keeps its own sample rate; callers that need a specific rate (the
//! impulse response, which must match the render) use [`resample_to`].

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader};

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::error::{FxError, Result};

/// Bytes-to-buffer decoding capability
pub trait AudioDecoder: Send + Sync {
    /// Decode an encoded audio stream
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer>;
}

/// WAV decoder backed by `hound`
///
/// Supports 8/16/24/32-bit integer and 32-bit float WAV, mono or stereo.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl AudioDecoder for WavDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer> {
        let reader = WavReader::new(Cursor::new(bytes))
            .map_err(|e| FxError::decode(format!("not a WAV stream: {}", e)))?;

        let spec = reader.spec();
        let layout = ChannelLayout::from_count(spec.channels as usize).ok_or_else(|| {
            FxError::decode(format!(
                "{}-channel audio (only mono/stereo supported)",
                spec.channels
            ))
        })?;

        let samples = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
        AudioBuffer::from_interleaved(&samples, layout, spec.sample_rate)
            .map_err(|e| FxError::decode(e.to_string()))
    }
}

/// Read and decode an audio file from disk
pub async fn import_audio(path: &Path, decoder: &dyn AudioDecoder) -> Result<AudioBuffer> {
    let bytes = tokio::fs::read(path).await?;
    decoder.decode(&bytes)
}

/// Resample a buffer to `target_rate` using linear interpolation
///
/// Returns a clone when the rates already match.
pub fn resample_to(buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if buffer.sample_rate() == target_rate {
        return Ok(buffer.clone());
    }
    let ratio = target_rate as f64 / buffer.sample_rate() as f64;
    let channels = buffer
        .channels()
        .map(|channel| resample_linear(channel, ratio))
        .collect();
    AudioBuffer::from_channels(channels, target_rate)
}

/// Generate a mono sine test tone at half scale
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let sample_rate = sample_rate.max(1);
    AudioBuffer::from_parts(vec![sine(frequency, duration_secs, sample_rate)], sample_rate)
}

/// Generate a stereo test tone with different frequencies per channel
pub fn generate_stereo_test_tone(
    freq_left: f32,
    freq_right: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> AudioBuffer {
    let sample_rate = sample_rate.max(1);
    AudioBuffer::from_parts(
        vec![
            sine(freq_left, duration_secs, sample_rate),
            sine(freq_right, duration_secs, sample_rate),
        ],
        sample_rate,
    )
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn sine(frequency: f32, duration_secs: f32, sample_rate: u32) -> Vec<f32> {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    (0..num_samples)
        .map(|i| 0.5 * (angular_freq * i as f32).sin())
        .collect()
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let read_err = |e: hound::Error| FxError::decode(format!("failed to read samples: {}", e));

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_err),
        SampleFormat::Int => {
            let scale = match bits_per_sample {
                8 => 128.0,
                16 => 32768.0,
                24 => 8388608.0,
                32 => 2147483648.0,
                _ => {
                    return Err(FxError::decode(format!(
                        "{}-bit integer audio",
                        bits_per_sample
                    )))
                }
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(read_err)
        }
    }
}

/// Linear interpolation resampling
fn resample_linear(samples: &[f32], ratio: f64) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let source_len = samples.len();
    let target_len = ((source_len as f64) * ratio).ceil() as usize;

    (0..target_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let src_idx = src_pos.floor() as usize;
            let frac = (src_pos - src_idx as f64) as f32;

            if src_idx + 1 < source_len {
                samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
            } else if src_idx < source_len {
                samples[src_idx]
            } else {
                0.0
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
