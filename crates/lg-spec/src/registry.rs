//! `SpecRegistry`: the named behavior specs and transition choosers of one
//! run.
//!
//! Built up front, validated once, then frozen behind an `Arc` and handed to
//! the driver builder.  Nothing is global: two drivers in one process can run
//! with different registries.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::chooser::{DefaultChooser, TransitionChooser};
use crate::spec::DEFAULT_CHOOSER;
use crate::{BehaviorSpec, BehaviorSpecConfig, SpecError, SpecResult};

pub struct SpecRegistry {
    specs:    BTreeMap<String, Arc<BehaviorSpec>>,
    choosers: BTreeMap<String, Arc<dyn TransitionChooser>>,
}

impl Default for SpecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecRegistry {
    /// An empty registry with [`DefaultChooser`] registered as `"default"`.
    pub fn new() -> Self {
        let mut choosers: BTreeMap<String, Arc<dyn TransitionChooser>> = BTreeMap::new();
        choosers.insert(DEFAULT_CHOOSER.to_owned(), Arc::new(DefaultChooser));
        Self { specs: BTreeMap::new(), choosers }
    }

    // ── Registration ──────────────────────────────────────────────────────

    pub fn register(&mut self, spec: BehaviorSpec) -> SpecResult<Arc<BehaviorSpec>> {
        let name = spec.name().to_owned();
        if self.specs.contains_key(&name) {
            return Err(SpecError::Duplicate(name));
        }
        debug!(spec = %name, operations = spec.num_operations(), "registered behavior spec");
        let spec = Arc::new(spec);
        self.specs.insert(name, Arc::clone(&spec));
        Ok(spec)
    }

    /// Validate `config` and register the resulting spec.
    pub fn register_config(&mut self, config: BehaviorSpecConfig) -> SpecResult<Arc<BehaviorSpec>> {
        self.register(BehaviorSpec::from_config(config)?)
    }

    /// Register (or replace) a chooser under `name`.
    pub fn register_chooser(&mut self, name: impl Into<String>, chooser: impl TransitionChooser + 'static) {
        self.choosers.insert(name.into(), Arc::new(chooser));
    }

    // ── Lookup ────────────────────────────────────────────────────────────

    pub fn get(&self, name: &str) -> Option<Arc<BehaviorSpec>> {
        self.specs.get(name).cloned()
    }

    pub fn require(&self, name: &str) -> SpecResult<Arc<BehaviorSpec>> {
        self.get(name).ok_or_else(|| SpecError::UnknownSpec(name.to_owned()))
    }

    pub fn chooser(&self, name: &str) -> SpecResult<Arc<dyn TransitionChooser>> {
        self.choosers
            .get(name)
            .cloned()
            .ok_or_else(|| SpecError::UnknownChooser(name.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    // ── Validation ────────────────────────────────────────────────────────

    /// Check that every async-spawn target and every chooser name resolves.
    ///
    /// Call once after all registrations, before starting any user.
    pub fn validate(&self) -> SpecResult<()> {
        for spec in self.specs.values() {
            for target in spec.async_behaviors() {
                if !self.specs.contains_key(target) {
                    return Err(SpecError::Invalid {
                        spec:   spec.name().to_owned(),
                        reason: format!("async behavior {target:?} is not registered"),
                    });
                }
            }
            for chooser in spec.transition_choosers() {
                if !self.choosers.contains_key(chooser) {
                    return Err(SpecError::UnknownChooser(chooser.clone()));
                }
            }
        }
        Ok(())
    }
}
