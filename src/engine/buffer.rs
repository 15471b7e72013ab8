//! Audio Buffer
//!
//! The core audio buffer type passed between pipeline stages. Buffers are
//! produced by decoding or by a render and are never mutated once handed on:
//! every stage returns a new buffer.

use crate::error::{FxError, Result};

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Non-interleaved 32-bit float audio
///
/// Invariants, checked by every constructor:
/// - one or two channels
/// - every channel holds exactly [`len`](Self::len) samples
/// - a positive sample rate
///
/// Samples outside `[-1, 1]` are allowed (headroom); they are only clamped
/// when encoding to PCM.
///
/// # Example
/// ```
/// use fxrender::engine::{AudioBuffer, ChannelLayout};
///
/// let buffer = AudioBuffer::new(44100, ChannelLayout::Stereo, 44100).unwrap();
/// assert_eq!(buffer.num_channels(), 2);
/// assert_eq!(buffer.len(), 44100);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer with the given number of samples per channel
    pub fn new(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Result<Self> {
        Self::from_channels(vec![vec![0.0; num_samples]; layout.num_channels()], sample_rate)
    }

    /// Create a buffer from per-channel sample vectors
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(FxError::InvalidAudio {
                reason: "sample rate must be positive".to_string(),
            });
        }
        if ChannelLayout::from_count(samples.len()).is_none() {
            return Err(FxError::InvalidAudio {
                reason: format!(
                    "{} channels (only mono/stereo supported)",
                    samples.len()
                ),
            });
        }
        let len = samples[0].len();
        if samples.iter().any(|ch| ch.len() != len) {
            return Err(FxError::InvalidAudio {
                reason: "channels have different lengths".to_string(),
            });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Build a buffer whose shape the caller already guarantees
    pub(crate) fn from_parts(samples: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        debug_assert!(sample_rate > 0);
        debug_assert!(matches!(samples.len(), 1 | 2));
        debug_assert!(samples.iter().all(|ch| ch.len() == samples[0].len()));
        Self {
            samples,
            sample_rate,
        }
    }

    /// Create a buffer from interleaved sample data (L, R, L, R, ... for stereo)
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();

        if interleaved.len() % num_channels != 0 {
            return Err(FxError::InvalidAudio {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Self::from_channels(samples, sample_rate)
    }

    /// Get the number of channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Iterate over the channels
    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.samples.iter().map(|ch| ch.as_slice())
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

    /// Return a new buffer with every channel's sample order inverted
    pub fn reversed(&self) -> Self {
        let samples = self
            .samples
            .iter()
            .map(|ch| ch.iter().rev().copied().collect())
            .collect();
        Self {
            samples,
            sample_rate: self.sample_rate,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
