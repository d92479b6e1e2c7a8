use std::borrow::{Borrow, Cow};
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use cozmo_core::{Action, ActionRunner, ActionSpec, ActionStatus, RobotState, TickContext, Whiteboard};

use crate::error::BehaviorError;
use crate::events::{EventKind, RobotEvent};
use crate::trigger::TriggerSetup;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BehaviorId(String);

impl BehaviorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BehaviorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BehaviorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BehaviorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for BehaviorId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorStatus {
    Running,
    Complete,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    Failed,
    /// Forced out by a reaction trigger or a safety condition.
    Interrupted,
    /// The parent (or the scheduler) withdrew the delegation.
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::Completed => "completed",
            StopReason::Failed => "failed",
            StopReason::Interrupted => "interrupted",
            StopReason::Cancelled => "cancelled",
        })
    }
}

bitflags! {
    /// Conditions a behavior takes responsibility for. Without the flag the
    /// scheduler's generic safety handling applies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const RUN_WHILE_OFF_TREADS = 1 << 0;
        const CARRYING_OBJECT_HANDLED_INTERNALLY = 1 << 1;
        const RUN_WHILE_ON_CHARGER = 1 << 2;
    }
}

/// What a delegate reported when it finished.
#[derive(Debug, Clone, PartialEq)]
pub enum DelegateOutcome {
    Action { name: String, status: ActionStatus },
    Behavior { id: BehaviorId, status: BehaviorStatus },
    /// The requested delegate could not be activated.
    NotStarted { reason: String },
}

impl DelegateOutcome {
    pub fn succeeded(&self) -> bool {
        match self {
            DelegateOutcome::Action { status, .. } => status.succeeded(),
            DelegateOutcome::Behavior { status, .. } => *status == BehaviorStatus::Complete,
            DelegateOutcome::NotStarted { .. } => false,
        }
    }
}

/// Read-only inputs to runnability checks.
#[derive(Clone, Copy)]
pub struct Preconditions<'a> {
    pub ctx: &'a TickContext,
    pub state: &'a RobotState,
    pub whiteboard: &'a Whiteboard,
    /// Set when the behavior is being force-triggered.
    pub trigger: Option<&'a TriggerSetup>,
}

pub(crate) enum CxRequest {
    DelegateAction(ActionRunner),
    DelegateBehavior(BehaviorId),
    CancelDelegate,
    DisableTrigger(String),
    EnableTrigger(String),
    DebugState(Cow<'static, str>),
}

/// Handle a behavior uses to read the world and ask the scheduler for work.
///
/// Requests are applied after the behavior call returns, in the order they
/// were made. Behaviors never see the command sink.
pub struct BehaviorCx<'a> {
    pub ctx: &'a TickContext,
    pub state: &'a RobotState,
    pub whiteboard: &'a mut Whiteboard,
    trigger: Option<&'a TriggerSetup>,
    delegating: bool,
    requests: Vec<CxRequest>,
}

impl<'a> BehaviorCx<'a> {
    pub(crate) fn new(
        ctx: &'a TickContext,
        state: &'a RobotState,
        whiteboard: &'a mut Whiteboard,
        trigger: Option<&'a TriggerSetup>,
        delegating: bool,
    ) -> Self {
        Self {
            ctx,
            state,
            whiteboard,
            trigger,
            delegating,
            requests: Vec::new(),
        }
    }

    pub fn trigger(&self) -> Option<&TriggerSetup> {
        self.trigger
    }

    pub fn is_delegating(&self) -> bool {
        self.delegating
    }

    pub fn preconditions(&self) -> Preconditions<'_> {
        Preconditions {
            ctx: self.ctx,
            state: self.state,
            whiteboard: &*self.whiteboard,
            trigger: self.trigger,
        }
    }

    pub fn delegate_action(&mut self, spec: ActionSpec) -> bool {
        self.delegate_runner(spec.into_runner())
    }

    pub fn delegate_custom(&mut self, action: Box<dyn Action>) -> bool {
        self.delegate_runner(ActionRunner::new(action))
    }

    /// Delegate a pre-configured runner (e.g. with an explicit retry budget).
    pub fn delegate_runner(&mut self, runner: ActionRunner) -> bool {
        if self.delegating {
            tracing::debug!(action = runner.name(), "delegation refused: delegate already active");
            return false;
        }
        self.delegating = true;
        self.requests.push(CxRequest::DelegateAction(runner));
        true
    }

    pub fn delegate_behavior(&mut self, id: impl Into<BehaviorId>) -> bool {
        let id = id.into();
        if self.delegating {
            tracing::debug!(child = %id, "delegation refused: delegate already active");
            return false;
        }
        self.delegating = true;
        self.requests.push(CxRequest::DelegateBehavior(id));
        true
    }

    /// Cancel the current delegate. Its outcome is not delivered.
    pub fn cancel_delegate(&mut self) -> bool {
        if !self.delegating {
            return false;
        }
        self.delegating = false;
        self.requests.push(CxRequest::CancelDelegate);
        true
    }

    /// Disable a reaction trigger until `enable_trigger` or until this
    /// behavior stops, whichever comes first.
    pub fn disable_trigger(&mut self, name: impl Into<String>) {
        self.requests.push(CxRequest::DisableTrigger(name.into()));
    }

    pub fn enable_trigger(&mut self, name: impl Into<String>) {
        self.requests.push(CxRequest::EnableTrigger(name.into()));
    }

    pub fn set_debug_state(&mut self, name: impl Into<Cow<'static, str>>) {
        self.requests.push(CxRequest::DebugState(name.into()));
    }

    pub(crate) fn into_requests(self) -> Vec<CxRequest> {
        self.requests
    }
}

/// A long-running, interruptible unit of robot intent.
///
/// Implementations are built by the container and reused across
/// activations: `init` must reset whatever the previous activation left.
pub trait Behavior: 'static {
    fn class(&self) -> &'static str;

    /// Behavior-specific runnability; the scheduler applies the generic
    /// checks (treads, carried object, charger, cool-down) first.
    fn is_runnable(&self, _pre: &Preconditions<'_>) -> bool {
        true
    }

    fn init(&mut self, cx: &mut BehaviorCx<'_>) -> Result<(), BehaviorError>;

    fn update(&mut self, cx: &mut BehaviorCx<'_>) -> BehaviorStatus {
        if cx.is_delegating() {
            BehaviorStatus::Running
        } else {
            BehaviorStatus::Complete
        }
    }

    fn on_delegate_finished(&mut self, _cx: &mut BehaviorCx<'_>, _outcome: DelegateOutcome) {}

    /// Called exactly once per activation, whatever the cause.
    fn stop(&mut self, _cx: &mut BehaviorCx<'_>, _reason: StopReason) {}

    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    fn subscriptions(&self) -> &[EventKind] {
        &[]
    }

    fn handle_event(&mut self, _event: &RobotEvent, _running: bool) {}
}
