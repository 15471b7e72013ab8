//! Gain staging for multi-path effects
//!
//! Spatial effects mix up to three parallel paths: direct, delay and reverb.
//! When the reverb path cannot be built its share is handed to the remaining
//! paths in proportion to their gains, so the summed gain is the same whether
//! or not the impulse response was available.

use serde::Serialize;

/// Gains applied to each parallel path
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GainStage {
    pub direct: f32,
    pub delay: f32,
    pub reverb: f32,
}

impl GainStage {
    pub fn total(&self) -> f32 {
        self.direct + self.delay + self.reverb
    }
}

/// Compute path gains from the configured wet mixes
///
/// `direct = max(0, 1 - reverb_mix - delay_mix)`. Without reverb, direct and
/// delay are scaled up to the full total; if both are silent the total goes to
/// the direct path. Two-path effects pass `delay_mix = 0`.
pub fn stage_gains(reverb_mix: f64, delay_mix: f64, reverb_available: bool) -> GainStage {
    let reverb = reverb_mix.max(0.0);
    let delay = delay_mix.max(0.0);
    let direct = (1.0 - reverb - delay).max(0.0);

    if reverb_available {
        return GainStage {
            direct: direct as f32,
            delay: delay as f32,
            reverb: reverb as f32,
        };
    }

    let total = direct + delay + reverb;
    let remaining = direct + delay;
    let (direct, delay) = if remaining > 0.0 {
        let scale = total / remaining;
        (direct * scale, delay * scale)
    } else {
        (total, 0.0)
    };
    GainStage {
        direct: direct as f32,
        delay: delay as f32,
        reverb: 0.0,
    }
}
