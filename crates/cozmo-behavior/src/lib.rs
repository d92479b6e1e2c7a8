//! Behavior layer for the robot: lifecycle-managed behaviors, reaction
//! triggers that can force-interrupt them, and the scheduler that walks the
//! delegation stack once per tick.
//!
//! Behaviors never talk to the robot directly. They delegate actions (or
//! other behaviors) through [`BehaviorCx`]; the [`BehaviorManager`] owns the
//! stack, hands the command sink to the single leaf action, and delivers
//! every delegate's outcome back to its parent within the same tick.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod behavior;
pub mod behaviors;
pub mod config;
pub mod container;
pub mod delegation;
pub mod error;
pub mod events;
pub mod managed;
pub mod scheduler;
pub mod trigger;

pub use behavior::{
    Behavior, BehaviorCx, BehaviorId, BehaviorStatus, Capabilities, DelegateOutcome,
    Preconditions, StopReason,
};
pub use behaviors::FAILED_PICKUPS;
pub use config::{BehaviorConfig, EngineConfig, SchedulerConfig, TriggerConfig};
pub use container::{BehaviorContainer, BehaviorFactory, BehaviorHandle};
pub use delegation::{DelegationStack, StackFrame};
pub use error::{BehaviorError, ContainerError, EventError, SchedulerError, TriggerError};
pub use events::{EventBus, EventKind, RobotEvent};
pub use managed::{Lifecycle, ManagedBehavior};
pub use scheduler::{BehaviorManager, TickReport, IDLE_FLOOR_ID, MANAGER_ISSUER};
pub use trigger::{
    ActiveBehaviorInfo, ConditionStrategy, ReactionTriggerStrategy, TriggerCondition,
    TriggerRegistry, TriggerSetup,
};
