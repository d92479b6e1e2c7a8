//! Execution primitives for the robot: state snapshots, the command link,
//! and resumable actions with retry and timeout handling.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod action;
pub mod actions;
pub mod command;
pub mod compound;
pub mod error;
pub mod rng;
pub mod state;
pub mod tick;
pub mod whiteboard;

pub use action::{
    Action, ActionCheck, ActionFailure, ActionFrame, ActionKind, ActionRunner, ActionState,
    ActionStatus, Completion, DEFAULT_ACTION_TIMEOUT_S,
};
pub use actions::{build_action, ActionSpec};
pub use command::{
    CommandSink, CommandStatus, CommandTag, RecordingSink, RobotCommand, Scripted, SentCommand,
    Tracks,
};
pub use compound::{ParallelAction, SequentialAction};
pub use error::{ActionError, CommandError};
pub use rng::{DeterministicRng, SplitMix64};
pub use state::{Accel, ObjectId, ObservedObject, OffTreadsState, Pose, RobotState};
pub use tick::TickContext;
pub use whiteboard::{WbKey, Whiteboard};
