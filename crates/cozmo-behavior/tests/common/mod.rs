//! Recording behaviors shared by the scheduler tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use serde::Deserialize;

use cozmo_behavior::{
    Behavior, BehaviorConfig, BehaviorCx, BehaviorError, BehaviorFactory, BehaviorId,
    BehaviorManager, BehaviorStatus, DelegateOutcome, EngineConfig, EventKind, Preconditions,
    RobotEvent, SchedulerConfig, StopReason,
};
use cozmo_core::{
    Action, ActionCheck, ActionError, ActionFrame, ActionKind, Completion, TickContext,
};

pub fn ctx(tick: u64) -> TickContext {
    TickContext::new(tick, 0.1, 11)
}

/// Shared log and switches read by every [`Recorded`] built from one factory.
#[derive(Clone, Default)]
pub struct Recorder {
    log: Rc<RefCell<Vec<String>>>,
    blocked: Rc<RefCell<BTreeSet<String>>>,
    refuse_init: Rc<RefCell<BTreeSet<String>>>,
}

impl Recorder {
    pub fn factory(&self) -> BehaviorFactory {
        let mut factory = BehaviorFactory::with_builtins();
        let recorder = self.clone();
        factory
            .register("Recorded", move |config| {
                let behavior = Recorded::new(config, recorder.clone())?;
                Ok(Box::new(behavior) as Box<dyn Behavior>)
            })
            .expect("Recorded class registers once");
        factory
    }

    pub fn manager(&self, config: &EngineConfig) -> BehaviorManager {
        BehaviorManager::from_config(config, &self.factory()).expect("valid engine config")
    }

    pub fn push(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.log.borrow().iter().filter(|e| *e == entry).count()
    }

    pub fn block(&self, id: &str) {
        self.blocked.borrow_mut().insert(id.to_string());
    }

    pub fn unblock(&self, id: &str) {
        self.blocked.borrow_mut().remove(id);
    }

    pub fn refuse_init(&self, id: &str) {
        self.refuse_init.borrow_mut().insert(id.to_string());
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RecordedParams {
    /// Child behavior delegated from `init`.
    child: Option<BehaviorId>,
    /// Name of a recorded action delegated from `init`.
    action: Option<String>,
    /// Checks before the recorded action completes; 0 runs forever.
    action_ticks: u32,
    /// Updates before the behavior reports a terminal status.
    finish_after: Option<u32>,
    fail: bool,
    subscribe: Vec<EventKind>,
    /// Reaction trigger held disabled while the behavior runs.
    disable_trigger: Option<String>,
}

/// Behavior that records every lifecycle call as `call:id[:detail]`.
pub struct Recorded {
    id: String,
    params: RecordedParams,
    recorder: Recorder,
    updates: u32,
}

impl Recorded {
    fn new(config: &BehaviorConfig, recorder: Recorder) -> Result<Self, cozmo_behavior::ContainerError> {
        Ok(Self {
            id: config.id.to_string(),
            params: config.params()?,
            recorder,
            updates: 0,
        })
    }
}

impl Behavior for Recorded {
    fn class(&self) -> &'static str {
        "Recorded"
    }

    fn is_runnable(&self, _pre: &Preconditions<'_>) -> bool {
        !self.recorder.blocked.borrow().contains(&self.id)
    }

    fn init(&mut self, cx: &mut BehaviorCx<'_>) -> Result<(), BehaviorError> {
        if self.recorder.refuse_init.borrow().contains(&self.id) {
            self.recorder.push(format!("refused:{}", self.id));
            return Err(BehaviorError::NothingToDo("refused".to_string()));
        }
        let via = cx
            .trigger()
            .map(|t| t.trigger.clone())
            .unwrap_or_else(|| "-".to_string());
        self.recorder.push(format!("init:{}:{via}", self.id));
        self.updates = 0;
        if let Some(trigger) = self.params.disable_trigger.clone() {
            cx.disable_trigger(trigger);
        }
        if let Some(child) = self.params.child.clone() {
            cx.delegate_behavior(child);
        } else if let Some(name) = self.params.action.clone() {
            cx.delegate_custom(Box::new(RecordedAction::new(
                name,
                self.params.action_ticks,
                self.recorder.clone(),
            )));
        }
        Ok(())
    }

    fn update(&mut self, _cx: &mut BehaviorCx<'_>) -> BehaviorStatus {
        self.updates += 1;
        self.recorder.push(format!("update:{}", self.id));
        match self.params.finish_after {
            Some(n) if self.updates >= n && self.params.fail => BehaviorStatus::Failure,
            Some(n) if self.updates >= n => BehaviorStatus::Complete,
            _ => BehaviorStatus::Running,
        }
    }

    fn on_delegate_finished(&mut self, _cx: &mut BehaviorCx<'_>, outcome: DelegateOutcome) {
        let verdict = if outcome.succeeded() { "ok" } else { "failed" };
        self.recorder.push(format!("delegate:{}:{verdict}", self.id));
    }

    fn stop(&mut self, _cx: &mut BehaviorCx<'_>, reason: StopReason) {
        self.recorder.push(format!("stop:{}:{reason}", self.id));
    }

    fn subscriptions(&self) -> &[EventKind] {
        &self.params.subscribe
    }

    fn handle_event(&mut self, event: &RobotEvent, running: bool) {
        self.recorder
            .push(format!("event:{}:{:?}:{running}", self.id, event.kind));
    }
}

/// Action that completes after a fixed number of checks.
pub struct RecordedAction {
    name: String,
    ticks: u32,
    checks: u32,
    recorder: Recorder,
}

impl RecordedAction {
    pub fn new(name: String, ticks: u32, recorder: Recorder) -> Self {
        Self {
            name,
            ticks,
            checks: 0,
            recorder,
        }
    }
}

impl Action for RecordedAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Custom("recorded")
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, _frame: &mut ActionFrame<'_>) -> Result<(), ActionError> {
        self.checks = 0;
        Ok(())
    }

    fn check(&mut self, _frame: &mut ActionFrame<'_>) -> ActionCheck {
        self.checks += 1;
        if self.ticks > 0 && self.checks >= self.ticks {
            ActionCheck::Done(Completion::Done)
        } else {
            ActionCheck::Running
        }
    }

    fn cancel(&mut self, frame: &mut ActionFrame<'_>) {
        self.recorder.push(format!("cancel:{}", self.name));
        frame.stop_all_motors();
    }
}

pub fn recorded(id: &str) -> BehaviorConfig {
    BehaviorConfig::new(id, "Recorded")
}

/// Engine config with a `Wait` idle and strict contracts on.
pub fn engine(behaviors: Vec<BehaviorConfig>) -> EngineConfig {
    let mut all = vec![BehaviorConfig::new("Wait", "Wait")];
    all.extend(behaviors);
    EngineConfig {
        scheduler: SchedulerConfig {
            strict_contracts: true,
            ..SchedulerConfig::default()
        },
        behaviors: all,
        ..EngineConfig::default()
    }
}

pub fn trigger(
    name: &str,
    priority: u32,
    behavior: &str,
    condition: cozmo_behavior::TriggerCondition,
) -> cozmo_behavior::TriggerConfig {
    cozmo_behavior::TriggerConfig {
        name: name.to_string(),
        priority,
        behavior: behavior.into(),
        condition,
        resume_last_behavior: false,
        can_interrupt_other: true,
        can_interrupt_self: false,
        cooldown_s: 0.0,
    }
}

pub fn with_chooser(mut config: EngineConfig, ids: &[&str]) -> EngineConfig {
    config.chooser = ids.iter().map(|id| (*id).into()).collect();
    config
}

pub fn active(manager: &BehaviorManager) -> Option<&str> {
    manager.active_behavior().map(|id| id.as_str())
}
