use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use cozmo_core::{ObjectId, OffTreadsState, RobotState, TickContext};

use crate::behavior::{BehaviorId, Capabilities};
use crate::config::TriggerConfig;
use crate::container::BehaviorHandle;
use crate::error::TriggerError;

/// Context a firing strategy hands to the behavior it activates.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSetup {
    pub trigger: String,
    pub tick: u64,
    pub object: Option<ObjectId>,
}

impl TriggerSetup {
    pub fn new(trigger: impl Into<String>, tick: u64) -> Self {
        Self {
            trigger: trigger.into(),
            tick,
            object: None,
        }
    }
}

/// The behavior in control (deepest on the delegation stack), as strategies
/// see it.
#[derive(Debug, Clone, Copy)]
pub struct ActiveBehaviorInfo<'a> {
    pub id: &'a BehaviorId,
    pub capabilities: Capabilities,
    pub triggered_by: Option<&'a str>,
}

/// Watchdog predicate that can force-interrupt whatever is running.
pub trait ReactionTriggerStrategy: 'static {
    fn name(&self) -> &str;

    /// Evaluated every tick, even when another strategy wins. While the
    /// trigger is locked the result is discarded, so edges and seen objects
    /// stay current across a lock.
    fn should_trigger(
        &mut self,
        ctx: &TickContext,
        state: &RobotState,
        current: Option<&ActiveBehaviorInfo<'_>>,
    ) -> bool;

    /// Called once when this strategy wins arbitration.
    fn setup_force_trigger(&mut self, ctx: &TickContext, _state: &RobotState) -> TriggerSetup {
        TriggerSetup::new(self.name(), ctx.tick)
    }

    fn should_resume_last_behavior(&self) -> bool {
        false
    }

    fn can_interrupt_other_triggered_behavior(&self) -> bool {
        false
    }

    fn can_interrupt_self(&self) -> bool {
        false
    }

    fn enabled_state_changed(&mut self, _enabled: bool) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCondition {
    OffTreads,
    PickedUp,
    Cliff,
    Shaken,
    OnBack,
    /// A previously unseen object appeared.
    ObjectSeen,
    PlacedOnCharger,
}

impl TriggerCondition {
    pub fn holds(self, state: &RobotState) -> bool {
        match self {
            TriggerCondition::OffTreads => !state.is_on_treads(),
            TriggerCondition::PickedUp => state.picked_up,
            TriggerCondition::Cliff => state.cliff_detected,
            TriggerCondition::Shaken => state.shaken,
            TriggerCondition::OnBack => state.off_treads == OffTreadsState::OnBack,
            TriggerCondition::ObjectSeen => !state.objects.is_empty(),
            TriggerCondition::PlacedOnCharger => state.on_charger,
        }
    }

    /// Whether a behavior with `caps` has taken responsibility for this
    /// condition.
    pub fn handled_by(self, caps: Capabilities) -> bool {
        match self {
            TriggerCondition::OffTreads | TriggerCondition::PickedUp | TriggerCondition::OnBack => {
                caps.contains(Capabilities::RUN_WHILE_OFF_TREADS)
            }
            TriggerCondition::PlacedOnCharger => caps.contains(Capabilities::RUN_WHILE_ON_CHARGER),
            TriggerCondition::Cliff | TriggerCondition::Shaken | TriggerCondition::ObjectSeen => {
                false
            }
        }
    }
}

/// Declarative strategy: fires on the rising edge of a [`TriggerCondition`].
#[derive(Debug, Clone)]
pub struct ConditionStrategy {
    name: String,
    condition: TriggerCondition,
    resume: bool,
    interrupt_other: bool,
    interrupt_self: bool,
    cooldown_s: f32,
    was_holding: bool,
    last_fired_s: Option<f64>,
    known_objects: BTreeSet<ObjectId>,
    pending_object: Option<ObjectId>,
}

impl ConditionStrategy {
    pub fn new(name: impl Into<String>, condition: TriggerCondition) -> Self {
        Self {
            name: name.into(),
            condition,
            resume: false,
            interrupt_other: false,
            interrupt_self: false,
            cooldown_s: 0.0,
            was_holding: false,
            last_fired_s: None,
            known_objects: BTreeSet::new(),
            pending_object: None,
        }
    }

    pub fn from_config(config: &TriggerConfig) -> Self {
        Self::new(config.name.clone(), config.condition)
            .resume_last_behavior(config.resume_last_behavior)
            .interrupt_other(config.can_interrupt_other)
            .interrupt_self(config.can_interrupt_self)
            .cooldown(config.cooldown_s)
    }

    pub fn resume_last_behavior(mut self, on: bool) -> Self {
        self.resume = on;
        self
    }

    pub fn interrupt_other(mut self, on: bool) -> Self {
        self.interrupt_other = on;
        self
    }

    pub fn interrupt_self(mut self, on: bool) -> Self {
        self.interrupt_self = on;
        self
    }

    pub fn cooldown(mut self, seconds: f32) -> Self {
        self.cooldown_s = seconds.max(0.0);
        self
    }

    pub fn condition(&self) -> TriggerCondition {
        self.condition
    }
}

impl ReactionTriggerStrategy for ConditionStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_trigger(
        &mut self,
        ctx: &TickContext,
        state: &RobotState,
        current: Option<&ActiveBehaviorInfo<'_>>,
    ) -> bool {
        let rising = if self.condition == TriggerCondition::ObjectSeen {
            let fresh = state
                .objects
                .keys()
                .find(|id| !self.known_objects.contains(id))
                .copied();
            self.known_objects.extend(state.objects.keys().copied());
            if fresh.is_some() {
                self.pending_object = fresh;
            }
            fresh.is_some()
        } else {
            let holds = self.condition.holds(state);
            let rising = holds && !self.was_holding;
            self.was_holding = holds;
            rising
        };
        if !rising {
            return false;
        }

        if let Some(active) = current {
            if self.condition.handled_by(active.capabilities) {
                tracing::debug!(trigger = %self.name, behavior = %active.id, "condition handled by active behavior");
                return false;
            }
        }
        if let Some(last) = self.last_fired_s {
            if ctx.time_s - last < self.cooldown_s as f64 {
                tracing::debug!(trigger = %self.name, "cooling down");
                return false;
            }
        }
        true
    }

    fn setup_force_trigger(&mut self, ctx: &TickContext, _state: &RobotState) -> TriggerSetup {
        self.last_fired_s = Some(ctx.time_s);
        TriggerSetup {
            trigger: self.name.clone(),
            tick: ctx.tick,
            object: self.pending_object.take(),
        }
    }

    fn should_resume_last_behavior(&self) -> bool {
        self.resume
    }

    fn can_interrupt_other_triggered_behavior(&self) -> bool {
        self.interrupt_other
    }

    fn can_interrupt_self(&self) -> bool {
        self.interrupt_self
    }
}

struct RegisteredTrigger {
    strategy: Box<dyn ReactionTriggerStrategy>,
    priority: u32,
    behavior: BehaviorHandle,
    locks: BTreeSet<String>,
}

/// A strategy that fired this tick; `index` is only valid until the next
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Firing {
    pub index: usize,
    pub priority: u32,
    pub behavior: BehaviorHandle,
}

/// Registered strategies, kept in descending priority order.
#[derive(Default)]
pub struct TriggerRegistry {
    entries: Vec<RegisteredTrigger>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        strategy: Box<dyn ReactionTriggerStrategy>,
        priority: u32,
        behavior: BehaviorHandle,
    ) -> Result<(), TriggerError> {
        if let Some(existing) = self.entries.iter().find(|e| e.priority == priority) {
            return Err(TriggerError::DuplicatePriority {
                priority,
                existing: existing.strategy.name().to_string(),
            });
        }
        if self.position(strategy.name()).is_some() {
            return Err(TriggerError::DuplicateName(strategy.name().to_string()));
        }

        let at = self
            .entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            at,
            RegisteredTrigger {
                strategy,
                priority,
                behavior,
                locks: BTreeSet::new(),
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Trigger names, highest priority first.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.strategy.name())
    }

    pub fn priority_of(&self, name: &str) -> Option<u32> {
        self.position(name).map(|i| self.entries[i].priority)
    }

    /// `None` for unknown triggers.
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.position(name).map(|i| self.entries[i].locks.is_empty())
    }

    pub fn disable_trigger_with_lock(&mut self, lock: &str, trigger: &str) -> Result<(), TriggerError> {
        let index = self
            .position(trigger)
            .ok_or_else(|| TriggerError::UnknownTrigger(trigger.to_string()))?;
        let entry = &mut self.entries[index];
        if !entry.locks.insert(lock.to_string()) {
            return Err(TriggerError::LockInUse {
                lock: lock.to_string(),
                trigger: trigger.to_string(),
            });
        }
        if entry.locks.len() == 1 {
            tracing::debug!(trigger, lock, "trigger disabled");
            entry.strategy.enabled_state_changed(false);
        }
        Ok(())
    }

    /// Returns whether `lock` was held on `trigger`.
    pub fn remove_disable_lock(&mut self, lock: &str, trigger: &str) -> Result<bool, TriggerError> {
        let index = self
            .position(trigger)
            .ok_or_else(|| TriggerError::UnknownTrigger(trigger.to_string()))?;
        let entry = &mut self.entries[index];
        let removed = entry.locks.remove(lock);
        if removed && entry.locks.is_empty() {
            tracing::debug!(trigger, lock, "trigger re-enabled");
            entry.strategy.enabled_state_changed(true);
        }
        Ok(removed)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.strategy.name() == name)
    }

    /// Evaluate every strategy; returns the enabled ones that fired, highest
    /// priority first.
    pub(crate) fn evaluate(
        &mut self,
        ctx: &TickContext,
        state: &RobotState,
        current: Option<&ActiveBehaviorInfo<'_>>,
    ) -> Vec<Firing> {
        let mut fired = Vec::new();
        for (index, entry) in self.entries.iter_mut().enumerate() {
            let triggered = entry.strategy.should_trigger(ctx, state, current);
            if triggered && entry.locks.is_empty() {
                fired.push(Firing {
                    index,
                    priority: entry.priority,
                    behavior: entry.behavior,
                });
            }
        }
        fired
    }

    pub(crate) fn strategy(&self, index: usize) -> &dyn ReactionTriggerStrategy {
        self.entries[index].strategy.as_ref()
    }

    pub(crate) fn strategy_mut(&mut self, index: usize) -> &mut dyn ReactionTriggerStrategy {
        self.entries[index].strategy.as_mut()
    }
}

impl std::fmt::Debug for TriggerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|e| (e.strategy.name(), e.priority, e.locks.len())),
            )
            .finish()
    }
}
