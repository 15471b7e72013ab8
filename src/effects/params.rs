//! Per-effect parameter schema
//!
//! Defaults come from the effect catalog; bounds keep every value inside the
//! range where the topology stays stable and audible.

use serde::Serialize;

use super::kind::EffectKind;

/// One named numeric parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: f64,
    pub min: f64,
    pub max: f64,
    /// Values are rounded to the nearest integer
    pub integer: bool,
    pub description: &'static str,
}

impl ParamSpec {
    const fn new(
        name: &'static str,
        default: f64,
        min: f64,
        max: f64,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            default,
            min,
            max,
            integer: false,
            description,
        }
    }

    const fn integer(mut self) -> Self {
        self.integer = true;
        self
    }

    /// Clamp (and round, for integer parameters) a requested value
    pub fn coerce(&self, value: f64) -> f64 {
        let value = if self.integer { value.round() } else { value };
        value.clamp(self.min, self.max)
    }
}

const RATE: (f64, f64) = (0.01, 5.0);
const WIDTH: (f64, f64) = (0.0, 50.0);
const MIX: (f64, f64) = (0.0, 1.0);
const FACTOR: (f64, f64) = (0.25, 4.0);

const fn rate(name: &'static str, default: f64, description: &'static str) -> ParamSpec {
    ParamSpec::new(name, default, RATE.0, RATE.1, description)
}

const fn width(name: &'static str, default: f64, description: &'static str) -> ParamSpec {
    ParamSpec::new(name, default, WIDTH.0, WIDTH.1, description)
}

const fn mix(name: &'static str, default: f64, description: &'static str) -> ParamSpec {
    ParamSpec::new(name, default, MIX.0, MIX.1, description)
}

const fn factor(default: f64) -> ParamSpec {
    ParamSpec::new("factor", default, FACTOR.0, FACTOR.1, "Playback rate multiplier")
}

pub const EIGHT_D: &[ParamSpec] = &[
    rate("panSpeed", 0.15, "Rotation rate in Hz"),
    ParamSpec::new("lfoPanDepth1", 0.7, 0.0, 1.0, "Depth of the primary pan LFO"),
    ParamSpec::new("lfoPanDepth2", 0.3, 0.0, 1.0, "Depth of the secondary pan LFO"),
    ParamSpec::new("filterFreq", 1000.0, 20.0, 20000.0, "Low-pass cutoff in Hz"),
    rate("lfoFilterSpeed", 0.15, "Filter sweep rate in Hz"),
    mix("reverbMix", 0.25, "Reverb wet gain"),
    mix("delayMix", 0.25, "Delay wet gain"),
];

pub const SIXTEEN_D: &[ParamSpec] = &[
    rate("pannerXOscRate", 0.05, "Left-right orbit rate in Hz"),
    width("pannerXOscWidth", 5.0, "Left-right orbit extent"),
    mix("reverbMix", 0.4, "Reverb wet gain"),
    ParamSpec::new("pannerZPos", -5.0, -50.0, 50.0, "Fixed front-back position"),
];

pub const THIRTY_TWO_D: &[ParamSpec] = &[
    rate("panXRate", 0.1, "Left-right orbit rate in Hz"),
    width("panXWidth", 3.0, "Left-right orbit extent"),
    rate("panYRate", 0.07, "Vertical orbit rate in Hz"),
    width("panYWidth", 2.0, "Vertical orbit extent"),
    rate("panZRate", 0.05, "Orbit width sweep rate in Hz"),
    width("panZWidth", 4.0, "Orbit width sweep depth"),
    mix("reverbMix", 0.5, "Reverb wet gain"),
];

pub const SIXTY_FOUR_D: &[ParamSpec] = &[
    rate("panXRate", 0.15, "Left-right orbit rate in Hz"),
    width("panXWidth", 6.0, "Left-right orbit extent"),
    rate("panYRate", 0.1, "Vertical orbit rate in Hz"),
    width("panYWidth", 4.0, "Vertical orbit extent"),
    rate("panZRate", 0.08, "Front-back orbit rate in Hz"),
    width("panZWidth", 6.0, "Front-back orbit extent"),
    mix("reverbMix", 0.6, "Reverb wet gain"),
];

pub const BASS_BOOST: &[ParamSpec] = &[ParamSpec::new(
    "gain",
    6.0,
    -24.0,
    24.0,
    "Low-shelf gain in dB",
)];

pub const ECHO: &[ParamSpec] = &[
    ParamSpec::new("delayTime", 0.3, 0.01, 5.0, "Echo spacing in seconds"),
    ParamSpec::new("feedback", 0.4, 0.0, 0.95, "Level of each repeat"),
];

pub const PITCH_UP: &[ParamSpec] = &[factor(1.25)];
pub const PITCH_DOWN: &[ParamSpec] = &[factor(0.8)];
pub const SPEED_UP: &[ParamSpec] = &[factor(1.25)];
pub const SLOW_DOWN: &[ParamSpec] = &[factor(0.8)];

pub const HQ: &[ParamSpec] = &[ParamSpec::new(
    "oversample",
    0.0,
    0.0,
    4.0,
    "Oversampling factor (0 derives it from the sample rate)",
)
.integer()];

pub const REVERB: &[ParamSpec] = &[mix("mix", 0.5, "Reverb wet gain")];

/// Parameter schema of an effect
pub fn schema(kind: EffectKind) -> &'static [ParamSpec] {
    match kind {
        EffectKind::EightD => EIGHT_D,
        EffectKind::SixteenD => SIXTEEN_D,
        EffectKind::ThirtyTwoD => THIRTY_TWO_D,
        EffectKind::SixtyFourD => SIXTY_FOUR_D,
        EffectKind::Stereo | EffectKind::Reverse => &[],
        EffectKind::BassBoost => BASS_BOOST,
        EffectKind::Echo => ECHO,
        EffectKind::PitchUp => PITCH_UP,
        EffectKind::PitchDown => PITCH_DOWN,
        EffectKind::SpeedUp => SPEED_UP,
        EffectKind::SlowDown => SLOW_DOWN,
        EffectKind::Hq => HQ,
        EffectKind::Reverb => REVERB,
    }
}
