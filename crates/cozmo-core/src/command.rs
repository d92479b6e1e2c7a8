use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::CommandError;
use crate::state::{ObjectId, Pose};

bitflags! {
    /// Actuator tracks an action locks while it runs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Tracks: u8 {
        const BODY = 1 << 0;
        const HEAD = 1 << 1;
        const LIFT = 1 << 2;
        const FACE = 1 << 3;
        const AUDIO = 1 << 4;
        const LIGHTS = 1 << 5;
        const ANIMATION = Self::HEAD.bits()
            | Self::LIFT.bits()
            | Self::BODY.bits()
            | Self::FACE.bits()
            | Self::AUDIO.bits();
    }
}

/// Actuator-level request sent over the robot link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RobotCommand {
    DriveStraight { distance_mm: f32, speed_mmps: f32 },
    TurnInPlace { angle_rad: f32, speed_rad_s: f32 },
    DriveToPose { pose: Pose },
    PickUpObject { object: ObjectId },
    PlayAnimation { name: String, loops: u32 },
    MoveHead { angle_rad: f32 },
    StopAllMotors,
}

impl RobotCommand {
    pub fn tracks(&self) -> Tracks {
        match self {
            RobotCommand::DriveStraight { .. }
            | RobotCommand::TurnInPlace { .. }
            | RobotCommand::DriveToPose { .. } => Tracks::BODY,
            RobotCommand::PickUpObject { .. } => Tracks::BODY | Tracks::LIFT,
            RobotCommand::PlayAnimation { .. } => Tracks::ANIMATION,
            RobotCommand::MoveHead { .. } => Tracks::HEAD,
            RobotCommand::StopAllMotors => Tracks::all(),
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, RobotCommand::StopAllMotors)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTag(pub u32);

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Completed,
    Failed { transient: bool, reason: String },
    /// The link has no record of the tag.
    Unknown,
}

impl CommandStatus {
    pub fn transient(reason: impl Into<String>) -> Self {
        CommandStatus::Failed {
            transient: true,
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        CommandStatus::Failed {
            transient: false,
            reason: reason.into(),
        }
    }
}

/// The robot link. Only the leaf action of the delegation stack writes to it.
pub trait CommandSink {
    /// Queue `command`; `issuer` names the action that sent it.
    fn send(&mut self, issuer: &str, command: RobotCommand) -> Result<CommandTag, CommandError>;

    fn status(&self, tag: CommandTag) -> CommandStatus;

    fn cancel(&mut self, tag: CommandTag);
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentCommand {
    pub tag: CommandTag,
    pub issuer: String,
    pub command: RobotCommand,
}

/// What the next non-stop command sent to a [`RecordingSink`] resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted {
    Status(CommandStatus),
    Reject(CommandError),
}

/// In-memory sink that records every command.
///
/// Commands stay `Pending` until resolved with [`RecordingSink::complete`] /
/// [`RecordingSink::fail`], unless auto-complete is on or a scripted result
/// is queued.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Vec<SentCommand>,
    cancelled: Vec<CommandTag>,
    statuses: BTreeMap<CommandTag, CommandStatus>,
    script: VecDeque<Scripted>,
    auto_complete: bool,
    next_tag: u32,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command completes as soon as it is sent.
    pub fn auto_completing() -> Self {
        Self {
            auto_complete: true,
            ..Self::default()
        }
    }

    pub fn script(&mut self, outcomes: impl IntoIterator<Item = Scripted>) {
        self.script.extend(outcomes);
    }

    pub fn sent(&self) -> &[SentCommand] {
        &self.sent
    }

    pub fn cancelled(&self) -> &[CommandTag] {
        &self.cancelled
    }

    pub fn last(&self) -> Option<&SentCommand> {
        self.sent.last()
    }

    pub fn count_where(&self, pred: impl Fn(&RobotCommand) -> bool) -> usize {
        self.sent.iter().filter(|c| pred(&c.command)).count()
    }

    pub fn complete(&mut self, tag: CommandTag) {
        self.statuses.insert(tag, CommandStatus::Completed);
    }

    pub fn fail(&mut self, tag: CommandTag, transient: bool, reason: &str) {
        self.statuses.insert(
            tag,
            CommandStatus::Failed {
                transient,
                reason: reason.to_string(),
            },
        );
    }

    /// Complete every command still pending.
    pub fn complete_all(&mut self) {
        for status in self.statuses.values_mut() {
            if *status == CommandStatus::Pending {
                *status = CommandStatus::Completed;
            }
        }
    }
}

impl CommandSink for RecordingSink {
    fn send(&mut self, issuer: &str, command: RobotCommand) -> Result<CommandTag, CommandError> {
        let scripted = if command.is_stop() {
            None
        } else {
            self.script.pop_front()
        };
        let status = match scripted {
            Some(Scripted::Reject(err)) => return Err(err),
            Some(Scripted::Status(status)) => status,
            None if self.auto_complete || command.is_stop() => CommandStatus::Completed,
            None => CommandStatus::Pending,
        };

        self.next_tag += 1;
        let tag = CommandTag(self.next_tag);
        self.statuses.insert(tag, status);
        self.sent.push(SentCommand {
            tag,
            issuer: issuer.to_string(),
            command,
        });
        Ok(tag)
    }

    fn status(&self, tag: CommandTag) -> CommandStatus {
        self.statuses
            .get(&tag)
            .cloned()
            .unwrap_or(CommandStatus::Unknown)
    }

    fn cancel(&mut self, tag: CommandTag) {
        self.cancelled.push(tag);
        if let Some(status) = self.statuses.get_mut(&tag) {
            if *status == CommandStatus::Pending {
                *status = CommandStatus::fatal("cancelled");
            }
        }
    }
}
