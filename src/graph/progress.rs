//! Render progress
//!
//! The renderer advances a virtual clock as it processes frames; progress is
//! that clock divided by the plan's expected duration. Shared between the
//! blocking render thread and the async task that publishes updates.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RenderProgress {
    /// Virtual time rendered so far, in nanoseconds
    elapsed_nanos: AtomicU64,
    expected_nanos: AtomicU64,
}

impl RenderProgress {
    pub fn new(expected_secs: f64) -> Self {
        Self {
            elapsed_nanos: AtomicU64::new(0),
            expected_nanos: AtomicU64::new(secs_to_nanos(expected_secs)),
        }
    }

    /// Record `frames` frames rendered at `sample_rate`
    pub fn advance(&self, frames: usize, sample_rate: u32) {
        let nanos = frames as u64 * 1_000_000_000 / sample_rate.max(1) as u64;
        self.elapsed_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_nanos.load(Ordering::Relaxed) as f64 / 1e9
    }

    /// Fraction complete in `[0, 1]`
    ///
    /// A plan with no virtual duration reports 0 until it is finished.
    pub fn fraction(&self) -> f32 {
        let expected = self.expected_nanos.load(Ordering::Relaxed);
        if expected == 0 {
            return 0.0;
        }
        let elapsed = self.elapsed_nanos.load(Ordering::Relaxed);
        (elapsed as f64 / expected as f64).clamp(0.0, 1.0) as f32
    }
}

fn secs_to_nanos(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1e9) as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_tracks_elapsed() {
        let progress = RenderProgress::new(1.0);
        assert_eq!(progress.fraction(), 0.0);
        progress.advance(22050, 44100);
        assert!((progress.fraction() - 0.5).abs() < 1e-6);
        progress.advance(44100, 44100);
        assert_eq!(progress.fraction(), 1.0);
    }

    #[test]
    fn test_zero_duration() {
        let progress = RenderProgress::new(0.0);
        progress.advance(10, 44100);
        assert_eq!(progress.fraction(), 0.0);
    }
}
