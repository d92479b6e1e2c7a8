use std::collections::BTreeMap;
use std::fmt;

use crate::behavior::{Behavior, BehaviorId};
use crate::behaviors;
use crate::config::BehaviorConfig;
use crate::error::ContainerError;
use crate::managed::ManagedBehavior;

/// Opaque reference to a behavior owned by a [`BehaviorContainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BehaviorHandle(usize);

type Constructor = Box<dyn Fn(&BehaviorConfig) -> Result<Box<dyn Behavior>, ContainerError>>;

/// Maps class names to constructors.
#[derive(Default)]
pub struct BehaviorFactory {
    constructors: BTreeMap<String, Constructor>,
}

impl BehaviorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with every built-in class registered.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        behaviors::register_builtins(&mut factory);
        factory
    }

    pub fn register<F>(&mut self, class: impl Into<String>, make: F) -> Result<(), ContainerError>
    where
        F: Fn(&BehaviorConfig) -> Result<Box<dyn Behavior>, ContainerError> + 'static,
    {
        let class = class.into();
        if self.constructors.contains_key(&class) {
            return Err(ContainerError::DuplicateClass(class));
        }
        self.constructors.insert(class, Box::new(make));
        Ok(())
    }

    pub(crate) fn insert_builtin<F>(&mut self, class: &str, make: F)
    where
        F: Fn(&BehaviorConfig) -> Result<Box<dyn Behavior>, ContainerError> + 'static,
    {
        self.constructors.insert(class.to_string(), Box::new(make));
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> + '_ {
        self.constructors.keys().map(String::as_str)
    }

    pub fn build(&self, config: &BehaviorConfig) -> Result<Box<dyn Behavior>, ContainerError> {
        let make = self
            .constructors
            .get(&config.class)
            .ok_or_else(|| ContainerError::UnknownClass(config.class.clone()))?;
        make(config)
    }
}

impl fmt::Debug for BehaviorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.constructors.keys()).finish()
    }
}

/// Owns every behavior instance for the lifetime of the engine.
#[derive(Debug, Default)]
pub struct BehaviorContainer {
    behaviors: Vec<ManagedBehavior>,
    by_id: BTreeMap<BehaviorId, BehaviorHandle>,
}

impl BehaviorContainer {
    pub fn from_config(
        configs: &[BehaviorConfig],
        factory: &BehaviorFactory,
    ) -> Result<Self, ContainerError> {
        let mut container = Self::default();
        for config in configs {
            if container.by_id.contains_key(&config.id) {
                return Err(ContainerError::DuplicateId(config.id.clone()));
            }
            let behavior = factory.build(config)?;
            container.insert(config, behavior)?;
        }
        tracing::debug!(behaviors = container.len(), "behavior container built");
        Ok(container)
    }

    pub(crate) fn insert(
        &mut self,
        config: &BehaviorConfig,
        behavior: Box<dyn Behavior>,
    ) -> Result<BehaviorHandle, ContainerError> {
        if self.by_id.contains_key(&config.id) {
            return Err(ContainerError::DuplicateId(config.id.clone()));
        }
        let handle = BehaviorHandle(self.behaviors.len());
        self.behaviors.push(ManagedBehavior::new(config, behavior));
        self.by_id.insert(config.id.clone(), handle);
        Ok(handle)
    }

    pub fn find(&self, id: &str) -> Option<BehaviorHandle> {
        self.by_id.get(id).copied()
    }

    /// Panics if `handle` came from a different container.
    pub fn get(&self, handle: BehaviorHandle) -> &ManagedBehavior {
        &self.behaviors[handle.0]
    }

    pub(crate) fn get_mut(&mut self, handle: BehaviorHandle) -> &mut ManagedBehavior {
        &mut self.behaviors[handle.0]
    }

    pub fn handles(&self) -> impl Iterator<Item = BehaviorHandle> {
        (0..self.behaviors.len()).map(BehaviorHandle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedBehavior> + '_ {
        self.behaviors.iter()
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }
}
