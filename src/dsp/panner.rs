//! Stereo and positional panners
//!
//! Both produce stereo output using equal-power gain laws. The positional
//! panner derives an azimuth from the source position relative to a listener
//! at the origin facing -Z (up +Y), then attenuates by inverse distance.

use std::f32::consts::FRAC_PI_2;

use super::{Block, NodeProcessor, ParamBlock};
use crate::graph::plan::ParamId;

/// Equal-power stereo panner, `pan` in `[-1, 1]`
pub struct StereoPanner {
    pan: f32,
}

impl StereoPanner {
    pub fn new(pan: f32) -> Self {
        Self { pan }
    }

    /// Apply a pan position to one frame
    #[inline]
    pub fn pan_frame(pan: f32, left: f32, right: f32, mono: bool) -> (f32, f32) {
        let pan = pan.clamp(-1.0, 1.0);
        if mono {
            let x = (pan + 1.0) / 2.0;
            let (gl, gr) = ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin());
            (left * gl, left * gr)
        } else if pan <= 0.0 {
            let x = pan + 1.0;
            let (gl, gr) = ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin());
            (left + right * gl, right * gr)
        } else {
            let x = pan;
            let (gl, gr) = ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin());
            (left * gl, right + left * gr)
        }
    }
}

impl NodeProcessor for StereoPanner {
    fn process(&mut self, frames: usize, inputs: &[Block], params: &ParamBlock) -> Vec<Block> {
        let input = inputs.first().cloned().unwrap_or_else(|| super::silence(frames));
        let mono = input.len() == 1;
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];

        for i in 0..frames {
            let pan = params.value(ParamId::Pan, i, self.pan);
            let l = input[0][i];
            let r = if mono { l } else { input[1][i] };
            let (ol, or) = Self::pan_frame(pan, l, r, mono);
            left[i] = ol;
            right[i] = or;
        }

        vec![vec![left, right]]
    }
}

/// Positional panner with equal-power azimuth panning
pub struct Panner3d {
    position: [f32; 3],
    ref_distance: f32,
    rolloff: f32,
}

impl Panner3d {
    pub fn new(position: [f32; 3], ref_distance: f32, rolloff: f32) -> Self {
        Self {
            position,
            ref_distance: ref_distance.max(f32::EPSILON),
            rolloff: rolloff.max(0.0),
        }
    }

    /// Azimuth in degrees: 0 ahead, +90 right, -90 left, -180 behind
    pub fn azimuth(x: f32, y: f32, z: f32) -> f32 {
        let len = (x * x + y * y + z * z).sqrt();
        if len <= f32::EPSILON {
            return 0.0;
        }
        // Project onto the horizontal plane (up is +Y)
        let (px, pz) = (x / len, z / len);
        let plen = (px * px + pz * pz).sqrt();
        if plen <= f32::EPSILON {
            return 0.0;
        }
        let (px, pz) = (px / plen, pz / plen);

        // Angle from the listener's right vector (+X)
        let mut azimuth = px.clamp(-1.0, 1.0).acos().to_degrees();
        // Forward is -Z
        if -pz < 0.0 {
            azimuth = 360.0 - azimuth;
        }
        if (0.0..=270.0).contains(&azimuth) {
            90.0 - azimuth
        } else {
            450.0 - azimuth
        }
    }

    /// Left and right gains for an azimuth in degrees
    pub fn equal_power_gains(azimuth: f32) -> (f32, f32) {
        let mut azimuth = azimuth.clamp(-180.0, 180.0);
        if azimuth < -90.0 {
            azimuth = -180.0 - azimuth;
        } else if azimuth > 90.0 {
            azimuth = 180.0 - azimuth;
        }
        let x = (azimuth + 90.0) / 180.0;
        ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin())
    }

    /// Inverse distance attenuation
    pub fn distance_gain(&self, distance: f32) -> f32 {
        let d = distance.max(self.ref_distance);
        self.ref_distance / (self.ref_distance + self.rolloff * (d - self.ref_distance))
    }
}

impl NodeProcessor for Panner3d {
    fn process(&mut self, frames: usize, inputs: &[Block], params: &ParamBlock) -> Vec<Block> {
        let input = inputs.first().cloned().unwrap_or_else(|| super::silence(frames));
        let mono = super::downmix_mono(&input);
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];

        for i in 0..frames {
            let x = params.value(ParamId::PositionX, i, self.position[0]);
            let y = params.value(ParamId::PositionY, i, self.position[1]);
            let z = params.value(ParamId::PositionZ, i, self.position[2]);

            let (gl, gr) = Self::equal_power_gains(Self::azimuth(x, y, z));
            let gain = self.distance_gain((x * x + y * y + z * z).sqrt());
            let s = mono.get(i).copied().unwrap_or(0.0) * gain;
            left[i] = s * gl;
            right[i] = s * gr;
        }

        vec![vec![left, right]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use test_case::test_case;

    #[test_case(1.0, 0.0, 0.0, 90.0 ; "right")]
    #[test_case(-1.0, 0.0, 0.0, -90.0 ; "left")]
    #[test_case(0.0, 0.0, -1.0, 0.0 ; "ahead")]
    #[test_case(0.0, 0.0, 1.0, -180.0 ; "behind")]
    #[test_case(0.0, 5.0, 0.0, 0.0 ; "overhead")]
    fn test_azimuth(x: f32, y: f32, z: f32, expected: f32) {
        assert_abs_diff_eq!(Panner3d::azimuth(x, y, z), expected, epsilon = 1e-3);
    }

    #[test]
    fn test_equal_power_law() {
        let (l, r) = Panner3d::equal_power_gains(0.0);
        assert_abs_diff_eq!(l, r, epsilon = 1e-6);
        assert_abs_diff_eq!(l * l + r * r, 1.0, epsilon = 1e-6);

        let (l, r) = Panner3d::equal_power_gains(90.0);
        assert_abs_diff_eq!(l, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(r, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_inverse_distance() {
        let panner = Panner3d::new([0.0; 3], 2.0, 1.0);
        assert_eq!(panner.distance_gain(0.5), 1.0);
        assert_eq!(panner.distance_gain(2.0), 1.0);
        assert_abs_diff_eq!(panner.distance_gain(4.0), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_stereo_panner_hard_left() {
        let mut panner = StereoPanner::new(-1.0);
        let out = panner.process(1, &[vec![vec![0.5], vec![0.25]]], &ParamBlock::new());
        assert_abs_diff_eq!(out[0][0][0], 0.75, epsilon = 1e-6);
        assert_abs_diff_eq!(out[0][1][0], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_stereo_panner_center_mono() {
        let mut panner = StereoPanner::new(0.0);
        let out = panner.process(1, &[vec![vec![1.0]]], &ParamBlock::new());
        assert_abs_diff_eq!(out[0][0][0], std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-6);
        assert_abs_diff_eq!(out[0][1][0], std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-6);
    }

    #[test]
    fn test_panner3d_follows_position_param() {
        let mut panner = Panner3d::new([0.0, 0.0, -1.0], 1.0, 1.0);
        let mut params = ParamBlock::new();
        params.insert(ParamId::PositionX, vec![1.0]);
        params.insert(ParamId::PositionZ, vec![0.0]);
        let out = panner.process(1, &[vec![vec![1.0]]], &params);
        assert_abs_diff_eq!(out[0][0][0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out[0][1][0], 1.0, epsilon = 1e-6);
    }
}
