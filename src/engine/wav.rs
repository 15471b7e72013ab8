//! PCM WAV encoder
//!
//! Serializes an [`AudioBuffer`] into a canonical 44-byte-header, 16-bit
//! integer PCM WAV stream via `hound`. Encoding is deterministic, and samples
//! are clamped to `[-1, 1]` here and nowhere earlier in the pipeline.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::engine::buffer::AudioBuffer;
use crate::error::{FxError, Result};

/// Size of the RIFF/WAVE header written by [`encode_wav`]
pub const WAV_HEADER_LEN: usize = 44;

/// Encode a buffer as 16-bit little-endian PCM WAV
///
/// Stereo buffers are interleaved frame by frame (L, R, L, R, ...).
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let data_len = buffer.len() * buffer.num_channels() * 2;
    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + data_len));
    {
        let mut writer = WavWriter::new(&mut cursor, spec).map_err(encode_error)?;
        for frame in 0..buffer.len() {
            for channel in buffer.channels() {
                writer
                    .write_sample(quantize(channel[frame]))
                    .map_err(encode_error)?;
            }
        }
        writer.finalize().map_err(encode_error)?;
    }

    Ok(cursor.into_inner())
}

fn encode_error(err: hound::Error) -> FxError {
    match err {
        hound::Error::IoError(e) => FxError::Io(e),
        other => FxError::InvalidAudio {
            reason: format!("cannot encode WAV: {}", other),
        },
    }
}

/// Clamp to `[-1, 1]` and scale to a signed 16-bit integer
///
/// Negative values scale by 32768 and positive by 32767, so both full-scale
/// extremes are reachable. NaN encodes as silence.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode `buffer` and write it to `path`
pub async fn write_wav(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    let bytes = encode_wav(buffer)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Output file name for a rendered buffer: `<stem>_<EFFECT>.wav`
///
/// Falls back to `audio` when the input has no usable file stem.
pub fn output_file_name(input: &Path, effect_id: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("audio");
    PathBuf::from(format!("{}_{}.wav", stem, effect_id.to_uppercase()))
}
