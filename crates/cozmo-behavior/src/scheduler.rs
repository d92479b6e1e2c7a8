use anyhow::Context;

use cozmo_core::{
    ActionStatus, CommandSink, RobotCommand, RobotState, TickContext, Whiteboard,
};
use cozmo_tools::{emit, tags, TraceEvent};

use crate::behavior::{
    BehaviorCx, BehaviorId, BehaviorStatus, Capabilities, CxRequest, DelegateOutcome,
    Preconditions, StopReason,
};
use crate::behaviors::wait::WaitBehavior;
use crate::config::{BehaviorConfig, EngineConfig, SchedulerConfig};
use crate::container::{BehaviorContainer, BehaviorFactory, BehaviorHandle};
use crate::delegation::{DelegationStack, StackFrame};
use crate::error::{EventError, SchedulerError};
use crate::events::{EventBus, EventKind, RobotEvent};
use crate::managed::ManagedBehavior;
use crate::trigger::{
    ActiveBehaviorInfo, ConditionStrategy, ReactionTriggerStrategy, TriggerRegistry, TriggerSetup,
};

/// Issuer name for commands the scheduler sends on its own behalf.
pub const MANAGER_ISSUER: &str = "behavior_manager";
/// Reserved id of the built-in idle floor.
pub const IDLE_FLOOR_ID: &str = "@idle-floor";

/// What happened during one [`BehaviorManager::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Bottom of the delegation stack after the tick.
    pub active: Option<BehaviorId>,
    /// Reaction trigger that switched behaviors this tick.
    pub reaction: Option<String>,
    pub switched_by_trigger: bool,
    pub behavior_updates: u32,
    pub action_updates: u32,
    pub stack_depth: usize,
}

#[derive(Debug, Clone)]
struct ActiveTrigger {
    name: String,
    priority: u32,
    setup: TriggerSetup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Chooser,
    Trigger,
    Resume,
}

/// Owns the behaviors, the delegation stack and the trigger registry, and
/// advances all of them once per tick.
pub struct BehaviorManager {
    config: SchedulerConfig,
    container: BehaviorContainer,
    triggers: TriggerRegistry,
    events: EventBus,
    stack: DelegationStack,
    chooser: Vec<BehaviorHandle>,
    idle: Option<BehaviorHandle>,
    idle_floor: BehaviorHandle,
    active_trigger: Option<ActiveTrigger>,
    resume_stack: Vec<BehaviorHandle>,
    whiteboard: Whiteboard,
    pending_end: Option<String>,
    end_on_next_delegate_complete: bool,
    /// Set when the bottom behavior finished this tick; true if it was
    /// force-triggered.
    bottom_finished: Option<bool>,
    fault: Option<SchedulerError>,
}

impl BehaviorManager {
    pub fn new(container: BehaviorContainer, config: SchedulerConfig) -> Result<Self, SchedulerError> {
        Self::with_events(container, config, EventKind::ALL)
    }

    pub fn with_events(
        mut container: BehaviorContainer,
        config: SchedulerConfig,
        kinds: impl IntoIterator<Item = EventKind>,
    ) -> Result<Self, SchedulerError> {
        let floor_config = BehaviorConfig::new(IDLE_FLOOR_ID, "Wait")
            .run_while_off_treads(true)
            .run_while_on_charger(true)
            .carrying_object_handled_internally(true);
        let idle_floor = container.insert(&floor_config, Box::new(WaitBehavior::forever()))?;

        let idle = container.find(config.idle_behavior.as_str());
        if idle.is_none() {
            tracing::warn!(idle = %config.idle_behavior, "idle behavior not defined, using built-in floor");
        }

        let mut events = EventBus::new(kinds);
        for handle in container.handles() {
            for kind in container.get(handle).subscriptions() {
                events.subscribe(*kind, handle)?;
            }
        }

        Ok(Self {
            stack: DelegationStack::new(config.max_delegation_depth),
            config,
            container,
            triggers: TriggerRegistry::new(),
            events,
            chooser: Vec::new(),
            idle,
            idle_floor,
            active_trigger: None,
            resume_stack: Vec::new(),
            whiteboard: Whiteboard::new(),
            pending_end: None,
            end_on_next_delegate_complete: false,
            bottom_finished: None,
            fault: None,
        })
    }

    /// Build the container, chooser and triggers described by `config`.
    pub fn from_config(config: &EngineConfig, factory: &BehaviorFactory) -> anyhow::Result<Self> {
        config.validate()?;
        let container = BehaviorContainer::from_config(&config.behaviors, factory)
            .context("Failed to build behaviors")?;
        let mut manager = Self::with_events(
            container,
            config.scheduler.clone(),
            config.events.iter().copied(),
        )
        .context("Failed to set up scheduler")?;
        manager
            .set_chooser(config.chooser.iter().cloned())
            .context("Invalid chooser list")?;
        for trigger in &config.triggers {
            manager
                .register_trigger(
                    Box::new(ConditionStrategy::from_config(trigger)),
                    trigger.priority,
                    trigger.behavior.as_str(),
                )
                .with_context(|| format!("Failed to register trigger `{}`", trigger.name))?;
        }
        Ok(manager)
    }

    pub fn register_trigger(
        &mut self,
        strategy: Box<dyn ReactionTriggerStrategy>,
        priority: u32,
        behavior: &str,
    ) -> Result<(), SchedulerError> {
        let handle = self
            .container
            .find(behavior)
            .ok_or_else(|| SchedulerError::UnknownBehavior(BehaviorId::from(behavior)))?;
        self.triggers.register(strategy, priority, handle)?;
        Ok(())
    }

    /// Replace the chooser's priority list.
    pub fn set_chooser<I, B>(&mut self, ids: I) -> Result<(), SchedulerError>
    where
        I: IntoIterator<Item = B>,
        B: Into<BehaviorId>,
    {
        let mut chooser = Vec::new();
        for id in ids {
            let id = id.into();
            let handle = self
                .container
                .find(id.as_str())
                .ok_or(SchedulerError::UnknownBehavior(id))?;
            chooser.push(handle);
        }
        self.chooser = chooser;
        Ok(())
    }

    pub fn publish(&mut self, event: RobotEvent) -> Result<(), EventError> {
        self.events.publish(event)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn whiteboard(&self) -> &Whiteboard {
        &self.whiteboard
    }

    pub fn whiteboard_mut(&mut self) -> &mut Whiteboard {
        &mut self.whiteboard
    }

    pub fn triggers(&self) -> &TriggerRegistry {
        &self.triggers
    }

    pub fn triggers_mut(&mut self) -> &mut TriggerRegistry {
        &mut self.triggers
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn container(&self) -> &BehaviorContainer {
        &self.container
    }

    pub fn behavior(&self, id: &str) -> Option<&ManagedBehavior> {
        self.container.find(id).map(|h| self.container.get(h))
    }

    /// Bottom of the delegation stack.
    pub fn active_behavior(&self) -> Option<&BehaviorId> {
        self.stack.bottom().map(|h| self.container.get(h).id())
    }

    /// Deepest behavior frame, the one whose delegate drives the robot.
    pub fn controlling_behavior(&self) -> Option<&BehaviorId> {
        self.stack.deepest_behavior().map(|h| self.container.get(h).id())
    }

    /// Behavior frames from bottom to top.
    pub fn stack_ids(&self) -> Vec<&BehaviorId> {
        self.stack.behaviors().map(|h| self.container.get(h).id()).collect()
    }

    pub fn stack(&self) -> &DelegationStack {
        &self.stack
    }

    pub fn active_trigger(&self) -> Option<&str> {
        self.active_trigger.as_ref().map(|t| t.name.as_str())
    }

    /// Behaviors waiting to be resumed, most recent last.
    pub fn resume_candidates(&self) -> Vec<&BehaviorId> {
        self.resume_stack.iter().map(|h| self.container.get(*h).id()).collect()
    }

    /// Stop the active behavior at the start of the next tick and choose again.
    pub fn request_current_behavior_end(&mut self, by_whom: impl Into<String>) {
        self.pending_end = Some(by_whom.into());
    }

    /// End the active behavior as soon as its current delegate finishes.
    pub fn stop_on_next_delegate_complete(&mut self) {
        self.end_on_next_delegate_complete = true;
    }

    pub fn tick(
        &mut self,
        ctx: &TickContext,
        state: &RobotState,
        sink: &mut dyn CommandSink,
    ) -> TickReport {
        let span = tracing::debug_span!("tick", tick = ctx.tick);
        let _enter = span.enter();

        let mut report = TickReport {
            tick: ctx.tick,
            ..TickReport::default()
        };
        self.bottom_finished = None;

        self.dispatch_events();

        if let Some(by_whom) = self.pending_end.take() {
            if !self.stack.is_empty() {
                tracing::info!(by = %by_whom, "ending current behavior on request");
                self.end_stack(StopReason::Cancelled, ctx, state, sink);
            }
        }

        if let Some(name) = self.evaluate_triggers(ctx, state, sink) {
            report.reaction = Some(name);
            report.switched_by_trigger = true;
            self.recover(ctx, state, sink);
            self.finish_report(&mut report);
            return report;
        }

        self.safety_check(ctx, state, sink);

        if self.stack.is_empty() {
            self.select(ctx, state, sink);
        } else {
            self.promote_from_idle(ctx, state, sink);
        }
        self.recover(ctx, state, sink);

        self.update_leaf_action(ctx, state, sink, &mut report);
        self.recover(ctx, state, sink);

        self.update_behaviors(ctx, state, sink, &mut report);
        self.recover(ctx, state, sink);

        if self.stack.is_empty() {
            self.select(ctx, state, sink);
            self.recover(ctx, state, sink);
        }

        self.finish_report(&mut report);
        report
    }

    /// Unwind everything with `Cancelled`, e.g. on shutdown.
    pub fn shutdown(&mut self, ctx: &TickContext, state: &RobotState, sink: &mut dyn CommandSink) {
        self.end_stack(StopReason::Cancelled, ctx, state, sink);
        self.resume_stack.clear();
        if let Err(err) = sink.send(MANAGER_ISSUER, RobotCommand::StopAllMotors) {
            tracing::warn!(error = %err, "stop on shutdown failed");
        }
    }

    fn finish_report(&self, report: &mut TickReport) {
        report.active = self.active_behavior().cloned();
        report.stack_depth = self.stack.len();
    }

    fn dispatch_events(&mut self) {
        for (event, subscribers) in self.events.drain() {
            for handle in subscribers {
                self.container.get_mut(handle).handle_event(&event);
            }
        }
    }

    fn evaluate_triggers(
        &mut self,
        ctx: &TickContext,
        state: &RobotState,
        sink: &mut dyn CommandSink,
    ) -> Option<String> {
        let fired = {
            // same behavior the safety stop looks at
            let current = self.stack.deepest_behavior().map(|h| {
                let behavior = self.container.get(h);
                ActiveBehaviorInfo {
                    id: behavior.id(),
                    capabilities: behavior.capabilities(),
                    triggered_by: self.active_trigger.as_ref().map(|t| t.name.as_str()),
                }
            });
            self.triggers.evaluate(ctx, state, current.as_ref())
        };
        if fired.is_empty() {
            return None;
        }

        let mut winner = None;
        for firing in fired {
            let strategy = self.triggers.strategy(firing.index);
            let name = strategy.name().to_string();
            let refusal = match &self.active_trigger {
                Some(active) if active.name == name => {
                    (!strategy.can_interrupt_self()).then_some("cannot interrupt itself")
                }
                Some(active) => {
                    if !strategy.can_interrupt_other_triggered_behavior() {
                        Some("cannot interrupt a triggered behavior")
                    } else if firing.priority <= active.priority {
                        Some("lower priority than the active reaction")
                    } else {
                        None
                    }
                }
                None => None,
            };
            let refusal = refusal.or_else(|| {
                let candidate = TriggerSetup::new(name.clone(), ctx.tick);
                let pre = Preconditions {
                    ctx,
                    state,
                    whiteboard: &self.whiteboard,
                    trigger: Some(&candidate),
                };
                let target = self.container.get(firing.behavior);
                if self.stack.contains(firing.behavior) {
                    target.check_conditions(&pre)
                } else {
                    target.why_not_runnable(&pre)
                }
            });

            match refusal {
                Some(reason) => {
                    tracing::debug!(trigger = %name, reason, "reaction suppressed");
                    self.trace(
                        ctx.tick,
                        tags::REACTION_SUPPRESSED,
                        name,
                        reason.to_string(),
                    );
                }
                None if winner.is_none() => winner = Some((firing, name)),
                None => {
                    tracing::debug!(trigger = %name, "reaction lost to a higher priority");
                    self.trace(
                        ctx.tick,
                        tags::REACTION_SUPPRESSED,
                        name,
                        "lower priority than the winning reaction".to_string(),
                    );
                }
            }
        }
        let (firing, name) = winner?;

        let strategy = self.triggers.strategy_mut(firing.index);
        let resume = strategy.should_resume_last_behavior();
        let setup = strategy.setup_force_trigger(ctx, state);

        if resume {
            if self.active_trigger.is_none() {
                if let Some(bottom) = self.stack.bottom() {
                    if bottom != self.idle_floor && Some(bottom) != self.idle {
                        self.resume_stack.push(bottom);
                    }
                }
            }
        } else {
            self.resume_stack.clear();
        }

        let target_id = self.container.get(firing.behavior).id().clone();
        tracing::info!(trigger = %name, behavior = %target_id, priority = firing.priority, "reaction triggered");
        self.trace(ctx.tick, tags::REACTION_TRIGGER, name.clone(), target_id.to_string());

        self.unwind_all(StopReason::Interrupted, ctx, state, sink);
        self.active_trigger = None;
        if let Err(err) = sink.send(MANAGER_ISSUER, RobotCommand::StopAllMotors) {
            tracing::warn!(error = %err, "stop before reaction failed");
        }

        let active = ActiveTrigger {
            name: name.clone(),
            priority: firing.priority,
            setup,
        };
        if let Err(reason) = self.activate(firing.behavior, Some(active), Origin::Trigger, ctx, state, sink) {
            tracing::warn!(trigger = %name, behavior = %target_id, reason = %reason, "triggered behavior failed to start");
            self.bottom_finished = Some(true);
            self.select(ctx, state, sink);
        }
        Some(name)
    }

    fn safety_check(&mut self, ctx: &TickContext, state: &RobotState, sink: &mut dyn CommandSink) {
        let Some(handle) = self.stack.deepest_behavior() else {
            return;
        };
        let behavior = self.container.get(handle);
        let caps = behavior.capabilities();
        let reason = if !state.is_on_treads() && !caps.contains(Capabilities::RUN_WHILE_OFF_TREADS) {
            "off treads"
        } else if state.is_carrying_object()
            && !caps.contains(Capabilities::CARRYING_OBJECT_HANDLED_INTERNALLY)
        {
            "carrying object"
        } else {
            return;
        };

        let id = behavior.id().clone();
        tracing::info!(behavior = %id, reason, "safety stop");
        self.trace(ctx.tick, tags::SAFETY_STOP, id.to_string(), reason.to_string());
        self.end_stack(StopReason::Interrupted, ctx, state, sink);
        if let Err(err) = sink.send(MANAGER_ISSUER, RobotCommand::StopAllMotors) {
            tracing::warn!(error = %err, "safety stop command failed");
        }
    }

    /// Replace the idle behavior as soon as something better is runnable.
    fn promote_from_idle(&mut self, ctx: &TickContext, state: &RobotState, sink: &mut dyn CommandSink) {
        let Some(bottom) = self.stack.bottom() else {
            return;
        };
        if self.active_trigger.is_some() {
            return;
        }
        let candidates: Vec<BehaviorHandle> = if bottom == self.idle_floor {
            self.chooser.iter().copied().chain(self.idle).collect()
        } else if Some(bottom) == self.idle {
            self.chooser.clone()
        } else {
            return;
        };

        let better = candidates.into_iter().find(|h| {
            *h != bottom && *h != self.idle_floor && {
                let pre = Preconditions {
                    ctx,
                    state,
                    whiteboard: &self.whiteboard,
                    trigger: None,
                };
                self.container.get(*h).is_runnable(&pre)
            }
        });
        let Some(better) = better else {
            return;
        };

        tracing::debug!(behavior = %self.container.get(better).id(), "leaving idle");
        self.unwind_all(StopReason::Cancelled, ctx, state, sink);
        if self.activate(better, None, Origin::Chooser, ctx, state, sink).is_err() {
            self.choose(ctx, state, sink);
        }
    }

    fn update_leaf_action(
        &mut self,
        ctx: &TickContext,
        state: &RobotState,
        sink: &mut dyn CommandSink,
        report: &mut TickReport,
    ) {
        let Some(runner) = self.stack.leaf_action_mut() else {
            return;
        };
        let status = runner.update(ctx, state, sink);
        report.action_updates += 1;
        if !status.is_terminal() {
            return;
        }

        let name = runner.name().to_string();
        self.stack.pop();
        tracing::debug!(action = %name, status = %status, "action finished");
        self.trace(ctx.tick, tags::ACTION_FINISHED, name.clone(), status.to_string());

        if let Some(parent) = self.stack.len().checked_sub(1) {
            self.deliver(parent, DelegateOutcome::Action { name, status }, ctx, state, sink);
        }
    }

    fn update_behaviors(
        &mut self,
        ctx: &TickContext,
        state: &RobotState,
        sink: &mut dyn CommandSink,
        report: &mut TickReport,
    ) {
        let mut index = self.stack.len();
        while index > 0 {
            index -= 1;
            if index >= self.stack.len() || self.fault.is_some() {
                continue;
            }
            let Some(handle) = self.stack.behavior_at(index) else {
                continue;
            };

            let delegating = self.stack.has_delegate(index);
            let trigger = setup_at(&self.active_trigger, index);
            let behavior = self.container.get_mut(handle);
            let mut cx = BehaviorCx::new(ctx, state, &mut self.whiteboard, trigger, delegating);
            let status = behavior.update(&mut cx);
            let mut requests = cx.into_requests();
            report.behavior_updates += 1;

            if status == BehaviorStatus::Running {
                self.apply_requests(index, requests, ctx, state, sink);
                continue;
            }

            requests.retain(|r| {
                matches!(
                    r,
                    CxRequest::DebugState(_) | CxRequest::DisableTrigger(_) | CxRequest::EnableTrigger(_)
                )
            });
            self.apply_requests(index, requests, ctx, state, sink);
            self.finish_frame(index, status, ctx, state, sink);
        }
    }

    /// Stop the behavior at `index` with a terminal `status` and hand the
    /// outcome to its parent.
    fn finish_frame(
        &mut self,
        index: usize,
        status: BehaviorStatus,
        ctx: &TickContext,
        state: &RobotState,
        sink: &mut dyn CommandSink,
    ) {
        let Some(handle) = self.stack.behavior_at(index) else {
            return;
        };
        self.unwind_above(index, StopReason::Cancelled, ctx, state, sink);
        let reason = if status == BehaviorStatus::Complete {
            StopReason::Completed
        } else {
            StopReason::Failed
        };
        self.stop_behavior(handle, reason, ctx, state);
        self.stack.pop();

        if index == 0 {
            self.end_on_next_delegate_complete = false;
            self.bottom_finished = Some(self.active_trigger.take().is_some());
        } else {
            let id = self.container.get(handle).id().clone();
            self.deliver(index - 1, DelegateOutcome::Behavior { id, status }, ctx, state, sink);
        }
    }

    fn deliver(
        &mut self,
        index: usize,
        outcome: DelegateOutcome,
        ctx: &TickContext,
        state: &RobotState,
        sink: &mut dyn CommandSink,
    ) {
        let Some(handle) = self.stack.behavior_at(index) else {
            return;
        };
        let trigger = setup_at(&self.active_trigger, index);
        let behavior = self.container.get_mut(handle);
        let mut cx = BehaviorCx::new(ctx, state, &mut self.whiteboard, trigger, false);
        behavior.delegate_finished(&mut cx, outcome);
        let requests = cx.into_requests();
        self.apply_requests(index, requests, ctx, state, sink);

        if index == 0 && self.end_on_next_delegate_complete {
            tracing::info!(behavior = %self.container.get(handle).id(), "ending after delegate completion");
            self.finish_frame(0, BehaviorStatus::Complete, ctx, state, sink);
        }
    }

    fn apply_requests(
        &mut self,
        index: usize,
        requests: Vec<CxRequest>,
        ctx: &TickContext,
        state: &RobotState,
        sink: &mut dyn CommandSink,
    ) {
        let Some(handle) = self.stack.behavior_at(index) else {
            return;
        };
        for request in requests {
            match request {
                CxRequest::DebugState(name) => self.container.get_mut(handle).set_debug_state(name),
                CxRequest::DisableTrigger(trigger) => {
                    let behavior = self.container.get_mut(handle);
                    match self.triggers.disable_trigger_with_lock(behavior.id().as_str(), &trigger) {
                        Ok(()) => behavior.note_disabled_trigger(&trigger),
                        Err(err) => tracing::warn!(behavior = %behavior.id(), error = %err, "disable trigger ignored"),
                    }
                }
                CxRequest::EnableTrigger(trigger) => {
                    let behavior = self.container.get_mut(handle);
                    if behavior.note_enabled_trigger(&trigger) {
                        if let Err(err) = self.triggers.remove_disable_lock(behavior.id().as_str(), &trigger) {
                            tracing::warn!(behavior = %behavior.id(), error = %err, "enable trigger ignored");
                        }
                    }
                }
                CxRequest::CancelDelegate => {
                    self.unwind_above(index, StopReason::Cancelled, ctx, state, sink);
                }
                CxRequest::DelegateAction(runner) => {
                    if self.stack.has_delegate(index) {
                        tracing::warn!(action = runner.name(), "dropping action: delegate already active");
                        continue;
                    }
                    tracing::debug!(behavior = %self.container.get(handle).id(), action = runner.name(), "delegating action");
                    if let Err(err) = self.stack.push_action(runner) {
                        self.structural(err);
                        return;
                    }
                }
                CxRequest::DelegateBehavior(id) => {
                    if self.stack.has_delegate(index) {
                        tracing::warn!(child = %id, "dropping behavior delegation: delegate already active");
                        continue;
                    }
                    self.start_child(index, id, ctx, state, sink);
                    if self.fault.is_some() {
                        return;
                    }
                }
            }
        }
    }

    fn start_child(
        &mut self,
        parent: usize,
        id: BehaviorId,
        ctx: &TickContext,
        state: &RobotState,
        sink: &mut dyn CommandSink,
    ) {
        let Some(child) = self.container.find(id.as_str()) else {
            self.structural(SchedulerError::UnknownBehavior(id));
            return;
        };

        let pre = Preconditions {
            ctx,
            state,
            whiteboard: &self.whiteboard,
            trigger: None,
        };
        if let Some(reason) = self.container.get(child).why_not_runnable(&pre) {
            tracing::debug!(child = %id, reason, "delegated behavior not runnable");
            let outcome = DelegateOutcome::NotStarted {
                reason: reason.to_string(),
            };
            self.deliver(parent, outcome, ctx, state, sink);
            return;
        }

        let index = match self.stack.push_behavior(child) {
            Ok(index) => index,
            Err(err) => {
                self.structural(err);
                return;
            }
        };
        let behavior = self.container.get_mut(child);
        let mut cx = BehaviorCx::new(ctx, state, &mut self.whiteboard, None, false);
        let started = behavior.activate(&mut cx);
        let requests = cx.into_requests();

        match started {
            Ok(()) => {
                tracing::info!(behavior = %id, "delegated behavior started");
                self.trace(ctx.tick, tags::BEHAVIOR_START, id.to_string(), "delegation".to_string());
                self.apply_requests(index, requests, ctx, state, sink);
            }
            Err(err) => {
                self.stack.pop();
                tracing::debug!(child = %id, error = %err, "delegated behavior failed to start");
                let outcome = DelegateOutcome::NotStarted {
                    reason: err.to_string(),
                };
                self.deliver(parent, outcome, ctx, state, sink);
            }
        }
    }

    /// Start `handle` as the bottom of an empty stack.
    fn activate(
        &mut self,
        handle: BehaviorHandle,
        trigger: Option<ActiveTrigger>,
        origin: Origin,
        ctx: &TickContext,
        state: &RobotState,
        sink: &mut dyn CommandSink,
    ) -> Result<(), String> {
        debug_assert!(self.stack.is_empty(), "bottom activation on a non-empty stack");
        let pre = Preconditions {
            ctx,
            state,
            whiteboard: &self.whiteboard,
            trigger: trigger.as_ref().map(|t| &t.setup),
        };
        if let Some(reason) = self.container.get(handle).why_not_runnable(&pre) {
            return Err(reason.to_string());
        }

        if let Err(err) = self.stack.push_behavior(handle) {
            self.structural(err);
            return Err("delegation stack full".to_string());
        }
        self.active_trigger = trigger;

        let setup = self.active_trigger.as_ref().map(|t| &t.setup);
        let behavior = self.container.get_mut(handle);
        let mut cx = BehaviorCx::new(ctx, state, &mut self.whiteboard, setup, false);
        let started = behavior.activate(&mut cx);
        let requests = cx.into_requests();

        if let Err(err) = started {
            self.stack.pop();
            self.active_trigger = None;
            return Err(err.to_string());
        }

        let id = self.container.get(handle).id().clone();
        let (tag, detail) = match origin {
            Origin::Chooser => (tags::BEHAVIOR_START, "chooser".to_string()),
            Origin::Trigger => (
                tags::BEHAVIOR_START,
                self.active_trigger
                    .as_ref()
                    .map(|t| t.name.clone())
                    .unwrap_or_default(),
            ),
            Origin::Resume => (tags::BEHAVIOR_RESUME, "resume".to_string()),
        };
        tracing::info!(behavior = %id, via = %detail, "behavior started");
        self.trace(ctx.tick, tag, id.to_string(), detail);
        self.apply_requests(0, requests, ctx, state, sink);
        Ok(())
    }

    /// Fill an empty stack: resume after a triggered behavior, else choose.
    fn select(&mut self, ctx: &TickContext, state: &RobotState, sink: &mut dyn CommandSink) {
        if self.bottom_finished.take() == Some(true) {
            self.try_resume(ctx, state, sink);
        }
        if self.stack.is_empty() {
            self.choose(ctx, state, sink);
        }
    }

    fn try_resume(&mut self, ctx: &TickContext, state: &RobotState, sink: &mut dyn CommandSink) {
        while let Some(handle) = self.resume_stack.pop() {
            match self.activate(handle, None, Origin::Resume, ctx, state, sink) {
                Ok(()) => return,
                Err(reason) => {
                    tracing::info!(behavior = %self.container.get(handle).id(), reason = %reason, "resume candidate discarded");
                }
            }
        }
    }

    fn choose(&mut self, ctx: &TickContext, state: &RobotState, sink: &mut dyn CommandSink) {
        let candidates: Vec<BehaviorHandle> = self
            .chooser
            .iter()
            .copied()
            .chain(self.idle)
            .chain(std::iter::once(self.idle_floor))
            .collect();
        self.activate_first(candidates, ctx, state, sink);
    }

    fn activate_first(
        &mut self,
        candidates: Vec<BehaviorHandle>,
        ctx: &TickContext,
        state: &RobotState,
        sink: &mut dyn CommandSink,
    ) {
        for handle in candidates {
            match self.activate(handle, None, Origin::Chooser, ctx, state, sink) {
                Ok(()) => return,
                Err(reason) => {
                    tracing::debug!(behavior = %self.container.get(handle).id(), reason = %reason, "candidate skipped");
                }
            }
            if self.fault.is_some() {
                return;
            }
        }
        tracing::error!("no behavior could be activated");
    }

    fn structural(&mut self, err: SchedulerError) {
        tracing::error!(error = %err, "scheduler contract violated");
        if self.config.strict_contracts {
            panic!("{err}");
        }
        self.fault.get_or_insert(err);
    }

    /// After a structural failure: unwind everything and fall back to idle.
    fn recover(&mut self, ctx: &TickContext, state: &RobotState, sink: &mut dyn CommandSink) {
        let Some(err) = self.fault.take() else {
            return;
        };
        tracing::warn!(error = %err, "falling back to idle");
        self.end_stack(StopReason::Cancelled, ctx, state, sink);
        self.resume_stack.clear();
        self.bottom_finished = None;
        let candidates: Vec<BehaviorHandle> =
            self.idle.into_iter().chain(std::iter::once(self.idle_floor)).collect();
        self.activate_first(candidates, ctx, state, sink);
        // a fault while starting idle has nowhere further to fall back to
        self.fault = None;
    }

    fn end_stack(
        &mut self,
        reason: StopReason,
        ctx: &TickContext,
        state: &RobotState,
        sink: &mut dyn CommandSink,
    ) {
        if self.stack.is_empty() {
            return;
        }
        self.unwind_all(reason, ctx, state, sink);
        self.end_on_next_delegate_complete = false;
        self.bottom_finished = Some(self.active_trigger.take().is_some());
    }

    fn unwind_all(
        &mut self,
        reason: StopReason,
        ctx: &TickContext,
        state: &RobotState,
        sink: &mut dyn CommandSink,
    ) {
        while !self.stack.is_empty() {
            self.pop_frame(reason, ctx, state, sink);
        }
    }

    /// Pop every frame above `index`, deepest first.
    fn unwind_above(
        &mut self,
        index: usize,
        reason: StopReason,
        ctx: &TickContext,
        state: &RobotState,
        sink: &mut dyn CommandSink,
    ) {
        while self.stack.len() > index + 1 {
            self.pop_frame(reason, ctx, state, sink);
        }
    }

    fn pop_frame(
        &mut self,
        reason: StopReason,
        ctx: &TickContext,
        state: &RobotState,
        sink: &mut dyn CommandSink,
    ) {
        match self.stack.pop() {
            Some(StackFrame::Action(mut runner)) => {
                runner.cancel(ctx, state, sink);
                tracing::debug!(action = runner.name(), "action cancelled");
                self.trace(
                    ctx.tick,
                    tags::ACTION_FINISHED,
                    runner.name().to_string(),
                    ActionStatus::Cancelled.to_string(),
                );
            }
            Some(StackFrame::Behavior(handle)) => self.stop_behavior(handle, reason, ctx, state),
            None => {}
        }
    }

    fn stop_behavior(
        &mut self,
        handle: BehaviorHandle,
        reason: StopReason,
        ctx: &TickContext,
        state: &RobotState,
    ) {
        let behavior = self.container.get_mut(handle);
        let mut cx = BehaviorCx::new(ctx, state, &mut self.whiteboard, None, false);
        let stopped = behavior.stop(&mut cx, reason);
        if !stopped {
            return;
        }
        let ignored = cx.into_requests().len();
        if ignored > 0 {
            tracing::debug!(behavior = %behavior.id(), ignored, "requests made while stopping were dropped");
        }

        let id = behavior.id().clone();
        for trigger in behavior.take_disabled_triggers() {
            if let Err(err) = self.triggers.remove_disable_lock(id.as_str(), &trigger) {
                tracing::warn!(behavior = %id, error = %err, "failed to release trigger lock");
            }
        }
        tracing::info!(behavior = %id, %reason, "behavior stopped");
        self.trace(ctx.tick, tags::BEHAVIOR_STOP, id.to_string(), reason.to_string());
    }

    fn trace(&mut self, tick: u64, tag: &'static str, subject: String, detail: String) {
        emit(
            &mut self.whiteboard,
            TraceEvent::new(tick, tag)
                .with_subject(subject)
                .with_detail(detail),
        );
    }
}

/// Only the bottom frame sees the trigger that activated it.
fn setup_at(active: &Option<ActiveTrigger>, index: usize) -> Option<&TriggerSetup> {
    if index == 0 {
        active.as_ref().map(|t| &t.setup)
    } else {
        None
    }
}

impl std::fmt::Debug for BehaviorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorManager")
            .field("stack", &self.stack_ids())
            .field("active_trigger", &self.active_trigger())
            .field("resume", &self.resume_candidates())
            .field("triggers", &self.triggers)
            .finish_non_exhaustive()
    }
}
