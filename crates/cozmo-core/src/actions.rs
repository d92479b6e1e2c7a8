//! Built-in robot actions and the serializable [`ActionSpec`] used to build them.

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionCheck, ActionFrame, ActionKind, ActionRunner, Completion};
use crate::command::{CommandTag, RobotCommand, Tracks};
use crate::compound::{ParallelAction, SequentialAction};
use crate::error::ActionError;
use crate::state::{ObjectId, Pose};

/// Distance kept from an object's origin when approaching it.
pub const PRE_ACTION_STANDOFF_MM: f32 = 60.0;

pub struct DriveStraightAction {
    distance_mm: f32,
    speed_mmps: f32,
    retries: u32,
    tag: Option<CommandTag>,
}

impl DriveStraightAction {
    pub fn new(distance_mm: f32, speed_mmps: f32) -> Self {
        Self {
            distance_mm,
            speed_mmps,
            retries: 0,
            tag: None,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

impl Action for DriveStraightAction {
    fn kind(&self) -> ActionKind {
        ActionKind::DriveStraight
    }

    fn tracks(&self) -> Tracks {
        Tracks::BODY
    }

    fn max_retries(&self) -> u32 {
        self.retries
    }

    fn init(&mut self, frame: &mut ActionFrame<'_>) -> Result<(), ActionError> {
        if self.speed_mmps <= 0.0 {
            return Err(ActionError::InvalidTarget(format!(
                "speed must be positive, got {}",
                self.speed_mmps
            )));
        }
        self.tag = Some(frame.send(RobotCommand::DriveStraight {
            distance_mm: self.distance_mm,
            speed_mmps: self.speed_mmps,
        })?);
        Ok(())
    }

    fn check(&mut self, frame: &mut ActionFrame<'_>) -> ActionCheck {
        let Some(tag) = self.tag else {
            return ActionCheck::Abort("drive never started".into());
        };
        frame.poll(tag, |state| ActionCheck::Done(Completion::Pose(state.pose)))
    }

    fn cancel(&mut self, frame: &mut ActionFrame<'_>) {
        if let Some(tag) = self.tag.take() {
            frame.cancel_command(tag);
        }
        frame.stop_all_motors();
    }
}

pub struct TurnInPlaceAction {
    angle_rad: f32,
    speed_rad_s: f32,
    tag: Option<CommandTag>,
}

impl TurnInPlaceAction {
    pub fn new(angle_rad: f32, speed_rad_s: f32) -> Self {
        Self {
            angle_rad,
            speed_rad_s,
            tag: None,
        }
    }
}

impl Action for TurnInPlaceAction {
    fn kind(&self) -> ActionKind {
        ActionKind::TurnInPlace
    }

    fn tracks(&self) -> Tracks {
        Tracks::BODY
    }

    fn max_retries(&self) -> u32 {
        1
    }

    fn init(&mut self, frame: &mut ActionFrame<'_>) -> Result<(), ActionError> {
        if self.speed_rad_s <= 0.0 {
            return Err(ActionError::InvalidTarget("turn speed must be positive".into()));
        }
        self.tag = Some(frame.send(RobotCommand::TurnInPlace {
            angle_rad: self.angle_rad,
            speed_rad_s: self.speed_rad_s,
        })?);
        Ok(())
    }

    fn check(&mut self, frame: &mut ActionFrame<'_>) -> ActionCheck {
        let Some(tag) = self.tag else {
            return ActionCheck::Abort("turn never started".into());
        };
        frame.poll(tag, |state| ActionCheck::Done(Completion::Pose(state.pose)))
    }

    fn cancel(&mut self, frame: &mut ActionFrame<'_>) {
        if let Some(tag) = self.tag.take() {
            frame.cancel_command(tag);
        }
        frame.stop_all_motors();
    }
}

/// Drive to a pre-action pose in front of a known object.
///
/// `approach` rotates the standoff point around the object so a retry comes
/// in from a different side.
pub struct DriveToObjectAction {
    object: ObjectId,
    approach: u32,
    retries: u32,
    tag: Option<CommandTag>,
}

impl DriveToObjectAction {
    pub fn new(object: ObjectId) -> Self {
        Self {
            object,
            approach: 0,
            retries: 2,
            tag: None,
        }
    }

    pub fn with_approach(mut self, approach: u32) -> Self {
        self.approach = approach;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

impl Action for DriveToObjectAction {
    fn kind(&self) -> ActionKind {
        ActionKind::DriveToObject
    }

    fn tracks(&self) -> Tracks {
        Tracks::BODY
    }

    fn max_retries(&self) -> u32 {
        self.retries
    }

    fn init(&mut self, frame: &mut ActionFrame<'_>) -> Result<(), ActionError> {
        let Some(target) = frame.state.object(self.object) else {
            return Err(ActionError::InvalidTarget(format!("{} not known", self.object)));
        };
        let quarter = std::f32::consts::FRAC_PI_2 * (self.approach % 4) as f32;
        let start = frame.state.pose;
        let from = Pose::new(
            target.pose.x_mm + (start.x_mm - target.pose.x_mm) * quarter.cos()
                - (start.y_mm - target.pose.y_mm) * quarter.sin(),
            target.pose.y_mm
                + (start.x_mm - target.pose.x_mm) * quarter.sin()
                + (start.y_mm - target.pose.y_mm) * quarter.cos(),
            0.0,
        );
        let pose = from.approach(&target.pose, PRE_ACTION_STANDOFF_MM);
        self.tag = Some(frame.send(RobotCommand::DriveToPose { pose })?);
        Ok(())
    }

    fn check(&mut self, frame: &mut ActionFrame<'_>) -> ActionCheck {
        let Some(tag) = self.tag else {
            return ActionCheck::Abort("drive never started".into());
        };
        let object = self.object;
        frame.poll(tag, |state| {
            if state.object(object).is_some() {
                ActionCheck::Done(Completion::Object(object))
            } else {
                ActionCheck::Abort(format!("lost track of {object}").into())
            }
        })
    }

    fn cancel(&mut self, frame: &mut ActionFrame<'_>) {
        if let Some(tag) = self.tag.take() {
            frame.cancel_command(tag);
        }
        frame.stop_all_motors();
    }
}

pub struct PickUpObjectAction {
    object: ObjectId,
    retries: u32,
    tag: Option<CommandTag>,
}

impl PickUpObjectAction {
    pub fn new(object: ObjectId) -> Self {
        Self {
            object,
            retries: 1,
            tag: None,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

impl Action for PickUpObjectAction {
    fn kind(&self) -> ActionKind {
        ActionKind::PickUpObject
    }

    fn tracks(&self) -> Tracks {
        Tracks::BODY | Tracks::LIFT
    }

    fn max_retries(&self) -> u32 {
        self.retries
    }

    fn init(&mut self, frame: &mut ActionFrame<'_>) -> Result<(), ActionError> {
        if frame.state.object(self.object).is_none() {
            return Err(ActionError::InvalidTarget(format!("{} not known", self.object)));
        }
        if let Some(held) = frame.state.carrying_object {
            if held != self.object {
                return Err(ActionError::Precondition(format!("already carrying {held}")));
            }
        }
        self.tag = Some(frame.send(RobotCommand::PickUpObject {
            object: self.object,
        })?);
        Ok(())
    }

    fn check(&mut self, frame: &mut ActionFrame<'_>) -> ActionCheck {
        let Some(tag) = self.tag else {
            return ActionCheck::Abort("pick-up never started".into());
        };
        let object = self.object;
        frame.poll(tag, |state| {
            // lift motion finishing does not mean the cube is on it
            if state.carrying_object == Some(object) {
                ActionCheck::Done(Completion::Object(object))
            } else {
                ActionCheck::Retry(format!("{object} not on lift").into())
            }
        })
    }

    fn cancel(&mut self, frame: &mut ActionFrame<'_>) {
        if let Some(tag) = self.tag.take() {
            frame.cancel_command(tag);
        }
        frame.stop_all_motors();
    }
}

pub struct PlayAnimationAction {
    name: String,
    loops: u32,
    tag: Option<CommandTag>,
}

impl PlayAnimationAction {
    pub fn new(name: impl Into<String>, loops: u32) -> Self {
        Self {
            name: name.into(),
            loops,
            tag: None,
        }
    }
}

impl Action for PlayAnimationAction {
    fn kind(&self) -> ActionKind {
        ActionKind::PlayAnimation
    }

    fn tracks(&self) -> Tracks {
        Tracks::ANIMATION
    }

    fn init(&mut self, frame: &mut ActionFrame<'_>) -> Result<(), ActionError> {
        if self.name.is_empty() {
            return Err(ActionError::InvalidTarget("empty animation name".into()));
        }
        self.tag = Some(frame.send(RobotCommand::PlayAnimation {
            name: self.name.clone(),
            loops: self.loops.max(1),
        })?);
        Ok(())
    }

    fn check(&mut self, frame: &mut ActionFrame<'_>) -> ActionCheck {
        let Some(tag) = self.tag else {
            return ActionCheck::Abort("animation never started".into());
        };
        let name = &self.name;
        frame.poll(tag, |_| ActionCheck::Done(Completion::Animation(name.clone())))
    }

    fn cancel(&mut self, frame: &mut ActionFrame<'_>) {
        if let Some(tag) = self.tag.take() {
            frame.cancel_command(tag);
        }
    }
}

pub struct MoveHeadAction {
    angle_rad: f32,
    tag: Option<CommandTag>,
}

impl MoveHeadAction {
    pub const MIN_ANGLE_RAD: f32 = -0.44;
    pub const MAX_ANGLE_RAD: f32 = 0.78;

    pub fn new(angle_rad: f32) -> Self {
        Self {
            angle_rad,
            tag: None,
        }
    }
}

impl Action for MoveHeadAction {
    fn kind(&self) -> ActionKind {
        ActionKind::MoveHead
    }

    fn tracks(&self) -> Tracks {
        Tracks::HEAD
    }

    fn init(&mut self, frame: &mut ActionFrame<'_>) -> Result<(), ActionError> {
        let angle_rad = self.angle_rad.clamp(Self::MIN_ANGLE_RAD, Self::MAX_ANGLE_RAD);
        self.tag = Some(frame.send(RobotCommand::MoveHead { angle_rad })?);
        Ok(())
    }

    fn check(&mut self, frame: &mut ActionFrame<'_>) -> ActionCheck {
        let Some(tag) = self.tag else {
            return ActionCheck::Abort("head move never started".into());
        };
        frame.poll(tag, |_| ActionCheck::Done(Completion::Done))
    }

    fn cancel(&mut self, frame: &mut ActionFrame<'_>) {
        if let Some(tag) = self.tag.take() {
            frame.cancel_command(tag);
        }
    }
}

/// Completes after a fixed delay without touching any actuator.
pub struct WaitAction {
    seconds: f32,
    started_at_s: Option<f64>,
}

impl WaitAction {
    pub fn new(seconds: f32) -> Self {
        Self {
            seconds,
            started_at_s: None,
        }
    }
}

impl Action for WaitAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Wait
    }

    fn timeout_s(&self) -> f32 {
        self.seconds + crate::action::DEFAULT_ACTION_TIMEOUT_S
    }

    fn init(&mut self, frame: &mut ActionFrame<'_>) -> Result<(), ActionError> {
        self.started_at_s = Some(frame.ctx.time_s);
        Ok(())
    }

    fn check(&mut self, frame: &mut ActionFrame<'_>) -> ActionCheck {
        let started = self.started_at_s.unwrap_or(frame.ctx.time_s);
        if frame.ctx.time_s - started >= self.seconds as f64 {
            ActionCheck::Done(Completion::Done)
        } else {
            ActionCheck::Running
        }
    }

    fn cancel(&mut self, _frame: &mut ActionFrame<'_>) {}
}

fn default_loops() -> u32 {
    1
}

fn default_drive_to_retries() -> u32 {
    2
}

fn default_pick_up_retries() -> u32 {
    1
}

fn default_turn_speed_deg() -> f32 {
    90.0
}

/// Serializable description of an action, as behaviors and config files
/// name them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    DriveStraight {
        distance_mm: f32,
        speed_mmps: f32,
        #[serde(default)]
        retries: u32,
    },
    TurnInPlace {
        angle_deg: f32,
        #[serde(default = "default_turn_speed_deg")]
        speed_deg_s: f32,
    },
    DriveToObject {
        object: ObjectId,
        #[serde(default)]
        approach: u32,
        #[serde(default = "default_drive_to_retries")]
        retries: u32,
    },
    PickUpObject {
        object: ObjectId,
        #[serde(default = "default_pick_up_retries")]
        retries: u32,
    },
    PlayAnimation {
        name: String,
        #[serde(default = "default_loops")]
        loops: u32,
    },
    MoveHead {
        angle_deg: f32,
    },
    Wait {
        seconds: f32,
    },
    Sequential {
        steps: Vec<ActionSpec>,
    },
    Parallel {
        steps: Vec<ActionSpec>,
    },
}

impl ActionSpec {
    pub fn animation(name: impl Into<String>) -> Self {
        ActionSpec::PlayAnimation {
            name: name.into(),
            loops: 1,
        }
    }

    pub fn drive_to(object: ObjectId) -> Self {
        ActionSpec::DriveToObject {
            object,
            approach: 0,
            retries: default_drive_to_retries(),
        }
    }

    pub fn pick_up(object: ObjectId) -> Self {
        ActionSpec::PickUpObject {
            object,
            retries: default_pick_up_retries(),
        }
    }

    pub fn build(&self) -> Box<dyn Action> {
        build_action(self)
    }

    pub fn into_runner(self) -> ActionRunner {
        ActionRunner::new(build_action(&self))
    }
}

pub fn build_action(spec: &ActionSpec) -> Box<dyn Action> {
    match spec {
        ActionSpec::DriveStraight {
            distance_mm,
            speed_mmps,
            retries,
        } => Box::new(DriveStraightAction::new(*distance_mm, *speed_mmps).with_retries(*retries)),
        ActionSpec::TurnInPlace {
            angle_deg,
            speed_deg_s,
        } => Box::new(TurnInPlaceAction::new(
            angle_deg.to_radians(),
            speed_deg_s.to_radians(),
        )),
        ActionSpec::DriveToObject {
            object,
            approach,
            retries,
        } => Box::new(
            DriveToObjectAction::new(*object)
                .with_approach(*approach)
                .with_retries(*retries),
        ),
        ActionSpec::PickUpObject { object, retries } => {
            Box::new(PickUpObjectAction::new(*object).with_retries(*retries))
        }
        ActionSpec::PlayAnimation { name, loops } => {
            Box::new(PlayAnimationAction::new(name.clone(), *loops))
        }
        ActionSpec::MoveHead { angle_deg } => Box::new(MoveHeadAction::new(angle_deg.to_radians())),
        ActionSpec::Wait { seconds } => Box::new(WaitAction::new(*seconds)),
        ActionSpec::Sequential { steps } => {
            Box::new(SequentialAction::new(steps.iter().map(build_action).collect()))
        }
        ActionSpec::Parallel { steps } => {
            Box::new(ParallelAction::new(steps.iter().map(build_action).collect()))
        }
    }
}
