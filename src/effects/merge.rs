//! Config merging
//!
//! Overlays caller overrides onto an effect's defaults. Merging never fails:
//! a rejected override degrades to the default and is reported as a
//! [`ConfigWarning`] so callers can surface it.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::params::ParamSpec;
use crate::error::{FxError, Result};

/// Caller-supplied partial configuration
pub type Overrides = Map<String, Value>;

/// A complete, validated parameter set for one render
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MergedConfig {
    values: BTreeMap<&'static str, f64>,
}

impl MergedConfig {
    /// Defaults of a schema
    pub fn defaults(schema: &'static [ParamSpec]) -> Self {
        Self {
            values: schema.iter().map(|p| (p.name, p.default)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Value of a parameter the topology cannot do without
    pub fn require(&self, name: &str) -> Result<f64> {
        self.get(name).ok_or_else(|| FxError::ConfigInvalid {
            param: name.to_string(),
            reason: "missing from merged config".to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Why an override was not applied as given
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigWarning {
    /// Not a JSON number; the default was kept
    NotNumeric { param: String, value: String },
    /// Outside the parameter's bounds; the nearest bound was used
    Clamped {
        param: String,
        requested: f64,
        applied: f64,
    },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::NotNumeric { param, value } => {
                write!(f, "'{}': {} is not a number, using default", param, value)
            }
            ConfigWarning::Clamped {
                param,
                requested,
                applied,
            } => write!(f, "'{}': {} out of range, using {}", param, requested, applied),
        }
    }
}

impl From<&ConfigWarning> for FxError {
    fn from(warning: &ConfigWarning) -> Self {
        let param = match warning {
            ConfigWarning::NotNumeric { param, .. } | ConfigWarning::Clamped { param, .. } => {
                param.clone()
            }
        };
        FxError::ConfigInvalid {
            param,
            reason: warning.to_string(),
        }
    }
}

/// Result of merging overrides onto a schema
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub config: MergedConfig,
    pub warnings: Vec<ConfigWarning>,
}

/// Merge `overrides` onto the defaults of `schema`
///
/// Every schema key appears in the result. Numeric overrides are coerced into
/// bounds; anything else keeps the default. Keys outside the schema are
/// ignored.
pub fn merge(schema: &'static [ParamSpec], overrides: &Overrides) -> MergeOutcome {
    let mut config = MergedConfig::defaults(schema);
    let mut warnings = Vec::new();

    for (key, value) in overrides {
        let Some(spec) = schema.iter().find(|p| p.name == key) else {
            debug!(key = %key, "Ignoring unknown override");
            continue;
        };

        let Some(requested) = value.as_f64() else {
            let warning = ConfigWarning::NotNumeric {
                param: key.clone(),
                value: value.to_string(),
            };
            warn!("{}", warning);
            warnings.push(warning);
            continue;
        };

        let applied = spec.coerce(requested);
        // Rounding an in-range integer parameter is silent
        let in_bounds = (spec.min..=spec.max).contains(&requested);
        if applied != requested && !(spec.integer && in_bounds) {
            let warning = ConfigWarning::Clamped {
                param: key.clone(),
                requested,
                applied,
            };
            warn!("{}", warning);
            warnings.push(warning);
        }
        config.values.insert(spec.name, applied);
    }

    MergeOutcome { config, warnings }
}
