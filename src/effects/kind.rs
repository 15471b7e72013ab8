//! Effect identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FxError;

/// Every effect the engine can render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EffectKind {
    #[serde(rename = "8d")]
    EightD,
    #[serde(rename = "16d")]
    SixteenD,
    #[serde(rename = "32d")]
    ThirtyTwoD,
    #[serde(rename = "64d")]
    SixtyFourD,
    #[serde(rename = "stereo")]
    Stereo,
    #[serde(rename = "reverse")]
    Reverse,
    #[serde(rename = "bassboost")]
    BassBoost,
    #[serde(rename = "echo")]
    Echo,
    #[serde(rename = "pitchup")]
    PitchUp,
    #[serde(rename = "pitchdown")]
    PitchDown,
    #[serde(rename = "speedup")]
    SpeedUp,
    #[serde(rename = "slowdown")]
    SlowDown,
    #[serde(rename = "hq")]
    Hq,
    #[serde(rename = "reverb")]
    Reverb,
}

impl EffectKind {
    /// All effects in catalog order
    pub const ALL: [EffectKind; 14] = [
        EffectKind::EightD,
        EffectKind::SixteenD,
        EffectKind::ThirtyTwoD,
        EffectKind::SixtyFourD,
        EffectKind::Stereo,
        EffectKind::Reverse,
        EffectKind::BassBoost,
        EffectKind::Echo,
        EffectKind::PitchUp,
        EffectKind::PitchDown,
        EffectKind::SpeedUp,
        EffectKind::SlowDown,
        EffectKind::Hq,
        EffectKind::Reverb,
    ];

    /// Stable string id
    pub fn id(&self) -> &'static str {
        match self {
            EffectKind::EightD => "8d",
            EffectKind::SixteenD => "16d",
            EffectKind::ThirtyTwoD => "32d",
            EffectKind::SixtyFourD => "64d",
            EffectKind::Stereo => "stereo",
            EffectKind::Reverse => "reverse",
            EffectKind::BassBoost => "bassboost",
            EffectKind::Echo => "echo",
            EffectKind::PitchUp => "pitchup",
            EffectKind::PitchDown => "pitchdown",
            EffectKind::SpeedUp => "speedup",
            EffectKind::SlowDown => "slowdown",
            EffectKind::Hq => "hq",
            EffectKind::Reverb => "reverb",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EffectKind::EightD => "8D Audio",
            EffectKind::SixteenD => "16D Audio",
            EffectKind::ThirtyTwoD => "32D Audio",
            EffectKind::SixtyFourD => "64D Audio",
            EffectKind::Stereo => "Stereo Widen",
            EffectKind::Reverse => "Reverse",
            EffectKind::BassBoost => "Bass Boost",
            EffectKind::Echo => "Echo",
            EffectKind::PitchUp => "Pitch Up",
            EffectKind::PitchDown => "Pitch Down",
            EffectKind::SpeedUp => "Speed Up",
            EffectKind::SlowDown => "Slow Down",
            EffectKind::Hq => "HQ",
            EffectKind::Reverb => "Reverb",
        }
    }

    /// Effects whose topology includes a convolution reverb path
    pub fn uses_reverb(&self) -> bool {
        matches!(
            self,
            EffectKind::EightD
                | EffectKind::SixteenD
                | EffectKind::ThirtyTwoD
                | EffectKind::SixtyFourD
                | EffectKind::Reverb
        )
    }

    /// Effects that cannot render without the impulse response
    pub fn requires_reverb(&self) -> bool {
        matches!(self, EffectKind::Reverb)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for EffectKind {
    type Err = FxError;

    /// Parse an effect id, ignoring case and surrounding whitespace
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        EffectKind::ALL
            .into_iter()
            .find(|kind| kind.id() == needle)
            .ok_or_else(|| FxError::UnknownEffect { id: s.to_string() })
    }
}
