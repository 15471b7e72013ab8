//! Effect registry
//!
//! Maps each effect to its descriptor: id, parameter schema and graph
//! builder. The registry is immutable and built once per process.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::Serialize;

use super::builder::{build_graph, BuildOptions, BuiltGraph, ImpulseResponseState};
use super::kind::EffectKind;
use super::merge::{merge, MergeOutcome, MergedConfig, Overrides};
use super::params::{schema, ParamSpec};
use crate::engine::AudioBuffer;
use crate::error::{FxError, Result};

/// Everything the engine knows about one effect
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EffectDescriptor {
    pub kind: EffectKind,
    pub name: &'static str,
    pub params: &'static [ParamSpec],
    pub uses_reverb: bool,
}

impl EffectDescriptor {
    fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            name: kind.display_name(),
            params: schema(kind),
            uses_reverb: kind.uses_reverb(),
        }
    }

    pub fn id(&self) -> &'static str {
        self.kind.id()
    }

    pub fn default_config(&self) -> MergedConfig {
        MergedConfig::defaults(self.params)
    }

    /// Overlay caller overrides onto the defaults
    pub fn merge(&self, overrides: &Overrides) -> MergeOutcome {
        merge(self.params, overrides)
    }

    /// Build the graph plan for this effect
    pub fn build(
        &self,
        input: &AudioBuffer,
        config: &MergedConfig,
        impulse: ImpulseResponseState,
        options: &BuildOptions,
    ) -> Result<BuiltGraph> {
        build_graph(self.kind, input, config, impulse, options)
    }
}

/// Registry of all effects
#[derive(Debug)]
pub struct EffectRegistry {
    descriptors: BTreeMap<EffectKind, EffectDescriptor>,
}

impl EffectRegistry {
    /// Create a registry with every catalog effect
    pub fn new() -> Self {
        Self {
            descriptors: EffectKind::ALL
                .into_iter()
                .map(|kind| (kind, EffectDescriptor::new(kind)))
                .collect(),
        }
    }

    /// Process-wide registry
    pub fn global() -> &'static EffectRegistry {
        static REGISTRY: OnceLock<EffectRegistry> = OnceLock::new();
        REGISTRY.get_or_init(EffectRegistry::new)
    }

    pub fn get(&self, kind: EffectKind) -> &EffectDescriptor {
        // Every kind is inserted by `new`
        &self.descriptors[&kind]
    }

    /// Look up a descriptor by string id
    pub fn lookup(&self, id: &str) -> Result<&EffectDescriptor> {
        let kind: EffectKind = id.parse()?;
        self.descriptors
            .get(&kind)
            .ok_or_else(|| FxError::UnknownEffect { id: id.to_string() })
    }

    /// Descriptors in catalog order
    pub fn descriptors(&self) -> impl Iterator<Item = &EffectDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_catalog() {
        let registry = EffectRegistry::global();
        assert_eq!(registry.len(), 14);
        let ids: Vec<&str> = registry.descriptors().map(|d| d.id()).collect();
        assert_eq!(ids[0], "8d");
        assert_eq!(ids[13], "reverb");
    }

    #[test]
    fn test_lookup() {
        let registry = EffectRegistry::new();
        let echo = registry.lookup("echo").unwrap();
        assert_eq!(echo.default_config().get("delayTime"), Some(0.3));
        assert!(registry.lookup("flanger").is_err());
    }

    #[test]
    fn test_descriptor_serializes() {
        let registry = EffectRegistry::new();
        let json = serde_json::to_value(registry.get(EffectKind::BassBoost)).unwrap();
        assert_eq!(json["kind"], "bassboost");
        assert_eq!(json["params"][0]["name"], "gain");
        assert_eq!(json["params"][0]["default"], 6.0);
    }
}
