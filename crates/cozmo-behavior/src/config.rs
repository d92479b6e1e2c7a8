use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::behavior::{BehaviorId, Capabilities};
use crate::error::ContainerError;
use crate::events::EventKind;
use crate::trigger::TriggerCondition;

/// One behavior instance: id, class, capability flags and class parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorConfig {
    pub id: BehaviorId,
    pub class: String,
    #[serde(default)]
    pub run_while_off_treads: bool,
    #[serde(default)]
    pub run_while_on_charger: bool,
    #[serde(default)]
    pub carrying_object_handled_internally: bool,
    #[serde(default)]
    pub cooldown_s: f32,
    /// Class-specific keys.
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl BehaviorConfig {
    pub fn new(id: impl Into<BehaviorId>, class: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class: class.into(),
            run_while_off_treads: false,
            run_while_on_charger: false,
            carrying_object_handled_internally: false,
            cooldown_s: 0.0,
            params: serde_json::Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn run_while_off_treads(mut self, on: bool) -> Self {
        self.run_while_off_treads = on;
        self
    }

    pub fn run_while_on_charger(mut self, on: bool) -> Self {
        self.run_while_on_charger = on;
        self
    }

    pub fn carrying_object_handled_internally(mut self, on: bool) -> Self {
        self.carrying_object_handled_internally = on;
        self
    }

    pub fn cooldown(mut self, seconds: f32) -> Self {
        self.cooldown_s = seconds;
        self
    }

    /// Deserialize the class parameters into `T`.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, ContainerError> {
        serde_json::from_value(serde_json::Value::Object(self.params.clone())).map_err(|err| {
            ContainerError::InvalidParams {
                id: self.id.clone(),
                reason: err.to_string(),
            }
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        caps.set(Capabilities::RUN_WHILE_OFF_TREADS, self.run_while_off_treads);
        caps.set(Capabilities::RUN_WHILE_ON_CHARGER, self.run_while_on_charger);
        caps.set(
            Capabilities::CARRYING_OBJECT_HANDLED_INTERNALLY,
            self.carrying_object_handled_internally,
        );
        caps
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub name: String,
    pub priority: u32,
    pub behavior: BehaviorId,
    pub condition: TriggerCondition,
    #[serde(default)]
    pub resume_last_behavior: bool,
    #[serde(default = "default_true")]
    pub can_interrupt_other: bool,
    #[serde(default)]
    pub can_interrupt_self: bool,
    #[serde(default)]
    pub cooldown_s: f32,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_delegation_depth: usize,
    /// Panic on contract violations instead of falling back to idle.
    pub strict_contracts: bool,
    pub idle_behavior: BehaviorId,
    pub tick_hz: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_delegation_depth: 8,
            strict_contracts: cfg!(debug_assertions),
            idle_behavior: BehaviorId::from("Wait"),
            tick_hz: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.tick_hz.max(1) as f32
    }
}

/// Everything needed to build a [`crate::BehaviorManager`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub behaviors: Vec<BehaviorConfig>,
    /// Behavior ids the chooser tries, in priority order.
    pub chooser: Vec<BehaviorId>,
    pub triggers: Vec<TriggerConfig>,
    pub events: Vec<EventKind>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            behaviors: vec![BehaviorConfig::new("Wait", "Wait")],
            chooser: Vec::new(),
            triggers: Vec::new(),
            events: EventKind::ALL.to_vec(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid engine config {}", path.display()))?;
        Ok(config)
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no engine config, using defaults");
            Ok(Self::default())
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize engine config")
    }

    /// Cross-reference checks serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let mut ids = BTreeSet::new();
        for behavior in &self.behaviors {
            if !ids.insert(behavior.id.as_str()) {
                bail!("behavior id `{}` defined more than once", behavior.id);
            }
        }
        if !ids.contains(self.scheduler.idle_behavior.as_str()) {
            bail!(
                "idle behavior `{}` is not defined",
                self.scheduler.idle_behavior
            );
        }
        if self.scheduler.max_delegation_depth == 0 {
            bail!("max_delegation_depth must be at least 1");
        }
        for id in &self.chooser {
            if !ids.contains(id.as_str()) {
                bail!("chooser references unknown behavior `{id}`");
            }
        }

        let mut priorities = BTreeSet::new();
        let mut names = BTreeSet::new();
        for trigger in &self.triggers {
            if !ids.contains(trigger.behavior.as_str()) {
                bail!(
                    "trigger `{}` targets unknown behavior `{}`",
                    trigger.name,
                    trigger.behavior
                );
            }
            if !priorities.insert(trigger.priority) {
                bail!(
                    "trigger `{}` reuses priority {}",
                    trigger.name,
                    trigger.priority
                );
            }
            if !names.insert(trigger.name.as_str()) {
                bail!("trigger `{}` defined more than once", trigger.name);
            }
        }
        Ok(())
    }
}
