//! Techniques and effects

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use void_data::ProviderHandle;

use crate::pass::{Pass, PassId};
use crate::{EffectError, Result};

/// A named, ordered list of passes
#[derive(Debug, Clone)]
pub struct Technique {
    name: String,
    passes: Vec<Arc<Pass>>,
    fallback: Option<String>,
}

impl Technique {
    /// Create a technique
    pub fn new(name: impl Into<String>, passes: Vec<Arc<Pass>>) -> Self {
        Self {
            name: name.into(),
            passes,
            fallback: None,
        }
    }

    /// Technique to switch to when this one cannot render
    pub fn with_fallback(mut self, technique: impl Into<String>) -> Self {
        self.fallback = Some(technique.into());
        self
    }

    /// Technique name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every pass, including fallback-only ones
    pub fn passes(&self) -> &[Arc<Pass>] {
        &self.passes
    }

    /// Declared fallback technique
    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    /// Find a pass by name
    pub fn pass(&self, name: &str) -> Option<&Arc<Pass>> {
        self.passes.iter().find(|p| p.name() == name)
    }

    /// Pass declared as `pass`'s fallback, if it is part of this technique
    pub fn fallback_of(&self, pass: &Pass) -> Option<&Arc<Pass>> {
        self.pass(pass.fallback()?)
    }

    /// Passes that produce draw calls on their own
    ///
    /// A pass named as the fallback of another pass of the technique is only
    /// reached through that pass's fallback chain.
    pub fn entry_passes(&self) -> Vec<Arc<Pass>> {
        let fallback_only: HashSet<&str> = self
            .passes
            .iter()
            .filter_map(|p| p.fallback())
            .filter(|name| self.pass(name).is_some())
            .collect();

        self.passes
            .iter()
            .filter(|p| !fallback_only.contains(p.name()))
            .cloned()
            .collect()
    }

    /// `pass` followed by its fallbacks, stopping at the first name that is
    /// not part of the technique or that would revisit a pass
    pub fn fallback_chain(&self, pass: &Arc<Pass>) -> Vec<Arc<Pass>> {
        let mut visited: HashSet<PassId> = HashSet::new();
        let mut chain = Vec::new();
        let mut current = Some(Arc::clone(pass));

        while let Some(pass) = current {
            if !visited.insert(pass.id()) {
                break;
            }
            current = self.fallback_of(&pass).cloned();
            chain.push(pass);
        }
        chain
    }

    /// Property names read by the macros of every pass
    pub fn macro_properties(&self) -> HashSet<String> {
        self.passes
            .iter()
            .flat_map(|p| p.macro_properties().map(str::to_string))
            .collect()
    }
}

/// Technique name → technique, plus the effect's own data provider
#[derive(Debug)]
pub struct Effect {
    name: String,
    techniques: BTreeMap<String, Technique>,
    data: ProviderHandle,
}

impl Effect {
    /// Start building an effect
    pub fn builder(name: impl Into<String>) -> EffectBuilder {
        EffectBuilder::new(name)
    }

    /// Effect name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All techniques by name
    pub fn techniques(&self) -> &BTreeMap<String, Technique> {
        &self.techniques
    }

    /// Check if a technique exists
    pub fn has_technique(&self, name: &str) -> bool {
        self.techniques.contains_key(name)
    }

    /// Get a technique
    pub fn technique(&self, name: &str) -> Result<&Technique> {
        self.techniques
            .get(name)
            .ok_or_else(|| EffectError::TechniqueNotFound(name.to_string()))
    }

    /// Ordered passes of a technique
    pub fn passes(&self, technique: &str) -> Result<&[Arc<Pass>]> {
        Ok(self.technique(technique)?.passes())
    }

    /// Check if a technique declares a fallback
    pub fn has_fallback(&self, technique: &str) -> bool {
        self.fallback(technique).is_some()
    }

    /// Fallback technique of a technique
    pub fn fallback(&self, technique: &str) -> Option<&str> {
        self.techniques.get(technique)?.fallback()
    }

    /// Provider holding effect-wide properties
    pub fn data(&self) -> ProviderHandle {
        self.data
    }
}

/// Builder for [`Effect`]
#[derive(Debug)]
pub struct EffectBuilder {
    name: String,
    techniques: Vec<Technique>,
}

impl EffectBuilder {
    /// Create a new builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            techniques: Vec::new(),
        }
    }

    /// Add a technique
    pub fn technique(mut self, technique: Technique) -> Self {
        self.techniques.push(technique);
        self
    }

    /// Validate and finish the effect
    pub fn build(self, data: ProviderHandle) -> Result<Arc<Effect>> {
        if self.techniques.is_empty() {
            return Err(EffectError::NoTechniques(self.name));
        }

        let mut techniques = BTreeMap::new();
        for technique in self.techniques {
            if techniques.contains_key(technique.name()) {
                return Err(EffectError::DuplicateTechnique(technique.name));
            }
            techniques.insert(technique.name.clone(), technique);
        }

        for technique in techniques.values() {
            if let Some(fallback) = technique.fallback() {
                if !techniques.contains_key(fallback) {
                    return Err(EffectError::UnknownFallback {
                        technique: technique.name.clone(),
                        fallback: fallback.to_string(),
                    });
                }
            }
        }

        Ok(Arc::new(Effect {
            name: self.name,
            techniques,
            data,
        }))
    }
}
