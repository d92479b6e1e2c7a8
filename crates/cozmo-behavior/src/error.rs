use thiserror::Error;

use crate::behavior::BehaviorId;
use crate::events::EventKind;

/// Why a behavior refused to activate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BehaviorError {
    #[error("nothing to do: {0}")]
    NothingToDo(String),
    #[error("missing trigger context: {0}")]
    MissingTriggerContext(String),
    #[error("bad parameters: {0}")]
    Config(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("priority {priority} already used by trigger `{existing}`")]
    DuplicatePriority { priority: u32, existing: String },
    #[error("trigger `{0}` already registered")]
    DuplicateName(String),
    #[error("unknown trigger `{0}`")]
    UnknownTrigger(String),
    #[error("lock `{lock}` already held on trigger `{trigger}`")]
    LockInUse { lock: String, trigger: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    #[error("behavior id `{0}` defined more than once")]
    DuplicateId(BehaviorId),
    #[error("unknown behavior class `{0}`")]
    UnknownClass(String),
    #[error("behavior class `{0}` already registered")]
    DuplicateClass(String),
    #[error("invalid parameters for `{id}`: {reason}")]
    InvalidParams { id: BehaviorId, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("event kind {0:?} was not declared at startup")]
    Undeclared(EventKind),
}

/// Contract violations inside the scheduler. Asserted when strict contracts
/// are on, otherwise the scheduler unwinds to the idle behavior.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("delegation depth {depth} exceeds limit {max}")]
    DelegationDepthExceeded { depth: usize, max: usize },
    #[error("unknown behavior `{0}`")]
    UnknownBehavior(BehaviorId),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error(transparent)]
    Event(#[from] EventError),
}
