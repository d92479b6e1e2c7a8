use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use crate::behavior::{
    Behavior, BehaviorCx, BehaviorId, BehaviorStatus, Capabilities, DelegateOutcome,
    Preconditions, StopReason,
};
use crate::config::BehaviorConfig;
use crate::error::BehaviorError;
use crate::events::{EventKind, RobotEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Inactive,
    Activating,
    Active,
    Stopping,
}

/// Lifecycle wrapper around a container-owned behavior.
///
/// Holds the configured capability flags and bookkeeping; the inner
/// behavior only sees `init`, `update`, `stop` and the delegate callback.
pub struct ManagedBehavior {
    id: BehaviorId,
    class: &'static str,
    configured: Capabilities,
    cooldown_s: f32,
    lifecycle: Lifecycle,
    start_count: u32,
    last_started_s: Option<f64>,
    last_stopped_s: Option<f64>,
    debug_state: Cow<'static, str>,
    disabled_triggers: BTreeSet<String>,
    behavior: Box<dyn Behavior>,
}

impl ManagedBehavior {
    pub(crate) fn new(config: &BehaviorConfig, behavior: Box<dyn Behavior>) -> Self {
        Self {
            id: config.id.clone(),
            class: behavior.class(),
            configured: config.capabilities(),
            cooldown_s: config.cooldown_s.max(0.0),
            lifecycle: Lifecycle::Inactive,
            start_count: 0,
            last_started_s: None,
            last_stopped_s: None,
            debug_state: Cow::Borrowed(""),
            disabled_triggers: BTreeSet::new(),
            behavior,
        }
    }

    pub fn id(&self) -> &BehaviorId {
        &self.id
    }

    pub fn class(&self) -> &'static str {
        self.class
    }

    pub fn capabilities(&self) -> Capabilities {
        self.configured | self.behavior.capabilities()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle != Lifecycle::Inactive
    }

    pub fn start_count(&self) -> u32 {
        self.start_count
    }

    pub fn last_started_s(&self) -> Option<f64> {
        self.last_started_s
    }

    pub fn last_stopped_s(&self) -> Option<f64> {
        self.last_stopped_s
    }

    pub fn debug_state(&self) -> &str {
        &self.debug_state
    }

    pub fn subscriptions(&self) -> &[EventKind] {
        self.behavior.subscriptions()
    }

    pub fn is_runnable(&self, pre: &Preconditions<'_>) -> bool {
        self.why_not_runnable(pre).is_none()
    }

    /// First failing runnability check, if any.
    pub fn why_not_runnable(&self, pre: &Preconditions<'_>) -> Option<&'static str> {
        if self.is_active() {
            return Some("already active");
        }
        self.check_conditions(pre)
    }

    /// Runnability without the lifecycle check, for a behavior that is about
    /// to be interrupted and restarted.
    pub(crate) fn check_conditions(&self, pre: &Preconditions<'_>) -> Option<&'static str> {
        let caps = self.capabilities();
        if !pre.state.is_on_treads() && !caps.contains(Capabilities::RUN_WHILE_OFF_TREADS) {
            return Some("robot is off treads");
        }
        if pre.state.on_charger && !caps.contains(Capabilities::RUN_WHILE_ON_CHARGER) {
            return Some("robot is on the charger");
        }
        if pre.state.is_carrying_object()
            && !caps.contains(Capabilities::CARRYING_OBJECT_HANDLED_INTERNALLY)
        {
            return Some("robot is carrying an object");
        }
        if let Some(stopped) = self.last_stopped_s {
            if pre.ctx.time_s - stopped < self.cooldown_s as f64 {
                return Some("cooling down");
            }
        }
        if !self.behavior.is_runnable(pre) {
            return Some("behavior declined");
        }
        None
    }

    pub(crate) fn activate(&mut self, cx: &mut BehaviorCx<'_>) -> Result<(), BehaviorError> {
        debug_assert_eq!(self.lifecycle, Lifecycle::Inactive, "{} activated twice", self.id);
        self.lifecycle = Lifecycle::Activating;
        self.debug_state = Cow::Borrowed("");
        match self.behavior.init(cx) {
            Ok(()) => {
                self.lifecycle = Lifecycle::Active;
                self.start_count += 1;
                self.last_started_s = Some(cx.ctx.time_s);
                Ok(())
            }
            Err(err) => {
                self.lifecycle = Lifecycle::Inactive;
                Err(err)
            }
        }
    }

    pub(crate) fn update(&mut self, cx: &mut BehaviorCx<'_>) -> BehaviorStatus {
        debug_assert_eq!(self.lifecycle, Lifecycle::Active, "{} updated while inactive", self.id);
        self.behavior.update(cx)
    }

    pub(crate) fn delegate_finished(&mut self, cx: &mut BehaviorCx<'_>, outcome: DelegateOutcome) {
        self.behavior.on_delegate_finished(cx, outcome);
    }

    /// Returns false when the behavior was not running.
    pub(crate) fn stop(&mut self, cx: &mut BehaviorCx<'_>, reason: StopReason) -> bool {
        if !matches!(self.lifecycle, Lifecycle::Active | Lifecycle::Activating) {
            return false;
        }
        self.lifecycle = Lifecycle::Stopping;
        self.behavior.stop(cx, reason);
        self.lifecycle = Lifecycle::Inactive;
        self.last_stopped_s = Some(cx.ctx.time_s);
        true
    }

    pub(crate) fn handle_event(&mut self, event: &RobotEvent) {
        let running = self.lifecycle == Lifecycle::Active;
        self.behavior.handle_event(event, running);
    }

    pub(crate) fn set_debug_state(&mut self, name: Cow<'static, str>) {
        if self.debug_state != name {
            tracing::debug!(behavior = %self.id, from = %self.debug_state, to = %name, "debug state");
            self.debug_state = name;
        }
    }

    pub(crate) fn note_disabled_trigger(&mut self, trigger: &str) {
        self.disabled_triggers.insert(trigger.to_string());
    }

    pub(crate) fn note_enabled_trigger(&mut self, trigger: &str) -> bool {
        self.disabled_triggers.remove(trigger)
    }

    pub(crate) fn take_disabled_triggers(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.disabled_triggers)
    }
}

impl fmt::Debug for ManagedBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedBehavior")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("lifecycle", &self.lifecycle)
            .field("start_count", &self.start_count)
            .field("debug_state", &self.debug_state)
            .finish_non_exhaustive()
    }
}
