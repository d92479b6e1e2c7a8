use std::borrow::Cow;
use std::fmt;

use crate::command::{CommandSink, CommandStatus, CommandTag, RobotCommand, Tracks};
use crate::error::{ActionError, CommandError};
use crate::state::{ObjectId, Pose, RobotState};
use crate::tick::TickContext;

pub const DEFAULT_ACTION_TIMEOUT_S: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
    DriveStraight,
    TurnInPlace,
    DriveToObject,
    PickUpObject,
    PlayAnimation,
    MoveHead,
    Wait,
    Sequential,
    Parallel,
    Custom(&'static str),
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::DriveStraight => "DriveStraight",
            ActionKind::TurnInPlace => "TurnInPlace",
            ActionKind::DriveToObject => "DriveToObject",
            ActionKind::PickUpObject => "PickUpObject",
            ActionKind::PlayAnimation => "PlayAnimation",
            ActionKind::MoveHead => "MoveHead",
            ActionKind::Wait => "Wait",
            ActionKind::Sequential => "Sequential",
            ActionKind::Parallel => "Parallel",
            ActionKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a successful action.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Done,
    Pose(Pose),
    Object(ObjectId),
    Animation(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionFailure {
    /// `init` rejected the request (bad target, unmet precondition).
    Precondition(String),
    Aborted(String),
    RetriesExhausted { attempts: u32, last: String },
    Timeout { after_s: f32 },
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionFailure::Precondition(reason) => write!(f, "precondition: {reason}"),
            ActionFailure::Aborted(reason) => write!(f, "aborted: {reason}"),
            ActionFailure::RetriesExhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            ActionFailure::Timeout { after_s } => write!(f, "timed out after {after_s:.1}s"),
        }
    }
}

/// Result of one `check` call on a running action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionCheck {
    Running,
    Done(Completion),
    /// Transient failure; the runner re-inits the action if retries remain.
    Retry(Cow<'static, str>),
    Abort(Cow<'static, str>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionStatus {
    Running,
    Completed(Completion),
    Failed(ActionFailure),
    Cancelled,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionStatus::Running)
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, ActionStatus::Completed(_))
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Running => f.write_str("running"),
            ActionStatus::Completed(_) => f.write_str("completed"),
            ActionStatus::Failed(failure) => write!(f, "failed ({failure})"),
            ActionStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Lifecycle of an action owned by an [`ActionRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Created,
    Initializing,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ActionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionState::Completed | ActionState::Failed | ActionState::Cancelled
        )
    }
}

/// Everything an action may touch during one call.
///
/// Only actions receive a frame, so only the leaf of the delegation stack
/// can reach the command sink.
pub struct ActionFrame<'a> {
    pub ctx: &'a TickContext,
    pub state: &'a RobotState,
    sink: &'a mut dyn CommandSink,
    issuer: &'a str,
}

impl<'a> ActionFrame<'a> {
    pub fn new(
        ctx: &'a TickContext,
        state: &'a RobotState,
        sink: &'a mut dyn CommandSink,
        issuer: &'a str,
    ) -> Self {
        Self {
            ctx,
            state,
            sink,
            issuer,
        }
    }

    pub fn issuer(&self) -> &str {
        self.issuer
    }

    pub fn send(&mut self, command: RobotCommand) -> Result<CommandTag, CommandError> {
        tracing::trace!(issuer = self.issuer, ?command, "send");
        self.sink.send(self.issuer, command)
    }

    pub fn status(&self, tag: CommandTag) -> CommandStatus {
        self.sink.status(tag)
    }

    pub fn cancel_command(&mut self, tag: CommandTag) {
        self.sink.cancel(tag);
    }

    pub fn stop_all_motors(&mut self) {
        if let Err(err) = self.sink.send(self.issuer, RobotCommand::StopAllMotors) {
            tracing::warn!(issuer = self.issuer, error = %err, "stop-all-motors not delivered");
        }
    }

    /// Map the link status of an in-flight command onto an action check.
    pub fn poll(
        &self,
        tag: CommandTag,
        on_complete: impl FnOnce(&RobotState) -> ActionCheck,
    ) -> ActionCheck {
        match self.status(tag) {
            CommandStatus::Pending => ActionCheck::Running,
            CommandStatus::Completed => on_complete(self.state),
            CommandStatus::Failed {
                transient: true,
                reason,
            } => ActionCheck::Retry(reason.into()),
            CommandStatus::Failed {
                transient: false,
                reason,
            } => ActionCheck::Abort(reason.into()),
            CommandStatus::Unknown => ActionCheck::Abort(format!("{tag} unknown to link").into()),
        }
    }
}

/// A discrete, resumable unit of robot work.
pub trait Action: 'static {
    fn kind(&self) -> ActionKind;

    fn name(&self) -> &str {
        self.kind().as_str()
    }

    fn tracks(&self) -> Tracks {
        Tracks::empty()
    }

    /// Retry budget used when the runner is not given one explicitly.
    fn max_retries(&self) -> u32 {
        0
    }

    /// Retries are counted per epoch; compounds bump it when they move on to
    /// the next step so each step gets its own budget.
    fn retry_epoch(&self) -> usize {
        0
    }

    fn timeout_s(&self) -> f32 {
        DEFAULT_ACTION_TIMEOUT_S
    }

    /// Issue the initial commands. Called again on every retry.
    fn init(&mut self, frame: &mut ActionFrame<'_>) -> Result<(), ActionError>;

    fn check(&mut self, frame: &mut ActionFrame<'_>) -> ActionCheck;

    /// Leave actuators safe. Only called after `init` has run.
    fn cancel(&mut self, frame: &mut ActionFrame<'_>) {
        frame.stop_all_motors();
    }
}

/// Drives a boxed [`Action`] through its lifecycle: init, check, retry,
/// timeout and cancellation.
pub struct ActionRunner {
    name: String,
    action: Box<dyn Action>,
    state: ActionState,
    retry_budget: Option<u32>,
    retries: u32,
    retry_epoch: usize,
    started_at_s: Option<f64>,
    result: Option<ActionStatus>,
}

enum Step {
    Check(ActionCheck),
    InitFailed(ActionError),
}

impl ActionRunner {
    pub fn new(action: Box<dyn Action>) -> Self {
        Self {
            name: action.name().to_string(),
            action,
            retry_budget: None,
            state: ActionState::Created,
            retries: 0,
            retry_epoch: 0,
            started_at_s: None,
            result: None,
        }
    }

    /// Override the action's own retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry_budget = Some(max_retries);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.retry_budget
            .unwrap_or_else(|| self.action.max_retries())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn tracks(&self) -> Tracks {
        self.action.tracks()
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn retries_used(&self) -> u32 {
        self.retries
    }

    pub fn result(&self) -> Option<&ActionStatus> {
        self.result.as_ref()
    }

    pub fn update(
        &mut self,
        ctx: &TickContext,
        robot: &RobotState,
        sink: &mut dyn CommandSink,
    ) -> ActionStatus {
        if let Some(done) = &self.result {
            return done.clone();
        }

        let started = *self.started_at_s.get_or_insert(ctx.time_s);
        let timeout_s = self.action.timeout_s();
        if ctx.time_s - started > timeout_s as f64 {
            if self.state != ActionState::Created {
                let mut frame = ActionFrame::new(ctx, robot, sink, &self.name);
                self.action.cancel(&mut frame);
            }
            tracing::info!(action = %self.name, timeout_s, "action timed out");
            return self.finish(ActionStatus::Failed(ActionFailure::Timeout {
                after_s: timeout_s,
            }));
        }

        let needs_init = matches!(self.state, ActionState::Created | ActionState::Initializing);
        if needs_init {
            self.state = ActionState::Initializing;
        }

        let step = {
            let mut frame = ActionFrame::new(ctx, robot, sink, &self.name);
            if needs_init {
                match self.action.init(&mut frame) {
                    Ok(()) => Step::Check(self.action.check(&mut frame)),
                    Err(err) => Step::InitFailed(err),
                }
            } else {
                Step::Check(self.action.check(&mut frame))
            }
        };

        match step {
            Step::InitFailed(err) if err.is_transient() => self.retry(err.to_string()),
            Step::InitFailed(err) => {
                tracing::debug!(action = %self.name, error = %err, "init rejected");
                self.finish(ActionStatus::Failed(ActionFailure::Precondition(
                    err.to_string(),
                )))
            }
            Step::Check(check) => {
                self.state = ActionState::Running;
                match check {
                    ActionCheck::Running => ActionStatus::Running,
                    ActionCheck::Done(completion) => {
                        self.finish(ActionStatus::Completed(completion))
                    }
                    ActionCheck::Retry(reason) => self.retry(reason.into_owned()),
                    ActionCheck::Abort(reason) => self.finish(ActionStatus::Failed(
                        ActionFailure::Aborted(reason.into_owned()),
                    )),
                }
            }
        }
    }

    /// Cancel the action. No-op when it never started or already finished.
    pub fn cancel(&mut self, ctx: &TickContext, robot: &RobotState, sink: &mut dyn CommandSink) {
        match self.state {
            ActionState::Created => {
                self.finish(ActionStatus::Cancelled);
            }
            ActionState::Initializing | ActionState::Running => {
                let mut frame = ActionFrame::new(ctx, robot, sink, &self.name);
                self.action.cancel(&mut frame);
                self.finish(ActionStatus::Cancelled);
            }
            ActionState::Completed | ActionState::Failed | ActionState::Cancelled => {}
        }
    }

    fn retry(&mut self, reason: String) -> ActionStatus {
        let epoch = self.action.retry_epoch();
        if epoch != self.retry_epoch {
            self.retry_epoch = epoch;
            self.retries = 0;
        }
        if self.retries >= self.max_retries() {
            return self.finish(ActionStatus::Failed(ActionFailure::RetriesExhausted {
                attempts: self.retries + 1,
                last: reason,
            }));
        }
        self.retries += 1;
        self.state = ActionState::Initializing;
        tracing::debug!(
            action = %self.name,
            attempt = self.retries + 1,
            reason = %reason,
            "retrying action"
        );
        ActionStatus::Running
    }

    fn finish(&mut self, status: ActionStatus) -> ActionStatus {
        self.state = match &status {
            ActionStatus::Completed(_) => ActionState::Completed,
            ActionStatus::Failed(_) => ActionState::Failed,
            ActionStatus::Cancelled => ActionState::Cancelled,
            ActionStatus::Running => self.state,
        };
        self.result = Some(status.clone());
        status
    }
}

impl fmt::Debug for ActionRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRunner")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("retries", &self.retries)
            .field("max_retries", &self.max_retries())
            .finish()
    }
}
