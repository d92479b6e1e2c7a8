use std::collections::BTreeMap;

use cozmo_core::actions::PRE_ACTION_STANDOFF_MM;
use cozmo_core::state::wrap_angle;
use cozmo_core::{
    CommandError, CommandSink, CommandStatus, CommandTag, ObjectId, Pose, RobotCommand, RobotState,
};

/// Travel speed assumed for `DriveToPose`.
pub const DRIVE_SPEED_MMPS: f32 = 100.0;
const PICK_UP_S: f32 = 1.5;
const ANIMATION_LOOP_S: f32 = 1.0;
const HEAD_MOVE_S: f32 = 0.3;
/// How far from a cube the lift can still reach it.
const LIFT_REACH_MM: f32 = PRE_ACTION_STANDOFF_MM + 40.0;
/// Finished commands whose status stays queryable, counted back from the
/// newest tag.
pub const STATUS_WINDOW: u32 = 256;

#[derive(Debug)]
struct InFlight {
    command: RobotCommand,
    remaining_ticks: u32,
    fail: bool,
}

/// Robot stand-in for the simulator. Commands take a number of ticks
/// proportional to the work they describe and only change the robot state
/// once they complete.
#[derive(Debug)]
pub struct SimRobot {
    state: RobotState,
    tick_hz: u32,
    in_flight: BTreeMap<CommandTag, InFlight>,
    statuses: BTreeMap<CommandTag, CommandStatus>,
    next_tag: u32,
    fail_next: u32,
    sent: u64,
}

impl SimRobot {
    pub fn new(state: RobotState, tick_hz: u32) -> Self {
        Self {
            state,
            tick_hz: tick_hz.max(1),
            in_flight: BTreeMap::new(),
            statuses: BTreeMap::new(),
            next_tag: 0,
            fail_next: 0,
            sent: 0,
        }
    }

    pub fn state(&self) -> &RobotState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RobotState {
        &mut self.state
    }

    /// Commands sent so far, stops included.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Make the next `count` non-stop commands fail transiently.
    pub fn fail_next_commands(&mut self, count: u32) {
        self.fail_next += count;
    }

    /// Advance every in-flight command by one tick.
    pub fn step(&mut self) {
        let mut finished = Vec::new();
        for (tag, flight) in &mut self.in_flight {
            flight.remaining_ticks = flight.remaining_ticks.saturating_sub(1);
            if flight.remaining_ticks == 0 {
                finished.push(*tag);
            }
        }
        for tag in finished {
            let Some(flight) = self.in_flight.remove(&tag) else {
                continue;
            };
            let status = if flight.fail {
                CommandStatus::transient("simulated fault")
            } else {
                self.apply(&flight.command);
                CommandStatus::Completed
            };
            tracing::trace!(%tag, ?status, "command finished");
            self.statuses.insert(tag, status);
        }
    }

    fn ticks_for(&self, command: &RobotCommand) -> u32 {
        let seconds = match command {
            RobotCommand::DriveStraight {
                distance_mm,
                speed_mmps,
            } => distance_mm.abs() / speed_mmps.abs().max(1.0),
            RobotCommand::TurnInPlace {
                angle_rad,
                speed_rad_s,
            } => angle_rad.abs() / speed_rad_s.abs().max(0.1),
            RobotCommand::DriveToPose { pose } => self.state.pose.distance_to(pose) / DRIVE_SPEED_MMPS,
            RobotCommand::PickUpObject { .. } => PICK_UP_S,
            RobotCommand::PlayAnimation { loops, .. } => ANIMATION_LOOP_S * (*loops).max(1) as f32,
            RobotCommand::MoveHead { .. } => HEAD_MOVE_S,
            RobotCommand::StopAllMotors => 0.0,
        };
        ((seconds * self.tick_hz as f32).ceil() as u32).max(1)
    }

    fn apply(&mut self, command: &RobotCommand) {
        let state = &mut self.state;
        match command {
            RobotCommand::DriveStraight { distance_mm, .. } => {
                let heading = state.pose.angle_rad;
                state.pose = Pose::new(
                    state.pose.x_mm + distance_mm * heading.cos(),
                    state.pose.y_mm + distance_mm * heading.sin(),
                    heading,
                );
            }
            RobotCommand::TurnInPlace { angle_rad, .. } => {
                state.pose.angle_rad = wrap_angle(state.pose.angle_rad + angle_rad);
            }
            RobotCommand::DriveToPose { pose } => state.pose = *pose,
            RobotCommand::PickUpObject { object } => self.lift(*object),
            RobotCommand::MoveHead { angle_rad } => state.head_angle_rad = *angle_rad,
            RobotCommand::PlayAnimation { .. } | RobotCommand::StopAllMotors => {}
        }
    }

    fn lift(&mut self, object: ObjectId) {
        let state = &mut self.state;
        if state.carrying_object.is_some() {
            return;
        }
        let Some(cube) = state.object(object) else {
            return;
        };
        let reach = state.pose.distance_to(&cube.pose);
        if reach > LIFT_REACH_MM {
            tracing::debug!(%object, reach, "cube out of reach");
            return;
        }
        state.carrying_object = Some(object);
    }

    /// Drop finished statuses that fell out of the window. In-flight
    /// commands are always kept.
    fn forget_old_statuses(&mut self) {
        let Some(cutoff) = self.next_tag.checked_sub(STATUS_WINDOW) else {
            return;
        };
        let in_flight = &self.in_flight;
        self.statuses
            .retain(|tag, _| tag.0 > cutoff || in_flight.contains_key(tag));
    }

    fn halt(&mut self) {
        for (tag, _) in std::mem::take(&mut self.in_flight) {
            self.statuses.insert(tag, CommandStatus::fatal("stopped"));
        }
    }
}

impl CommandSink for SimRobot {
    fn send(&mut self, issuer: &str, command: RobotCommand) -> Result<CommandTag, CommandError> {
        self.next_tag += 1;
        self.sent += 1;
        let tag = CommandTag(self.next_tag);
        tracing::debug!(%tag, issuer, ?command, "robot command");
        self.forget_old_statuses();

        if command.is_stop() {
            self.halt();
            self.statuses.insert(tag, CommandStatus::Completed);
            return Ok(tag);
        }

        let fail = self.fail_next > 0;
        if fail {
            self.fail_next -= 1;
        }
        let remaining_ticks = self.ticks_for(&command);
        self.in_flight.insert(
            tag,
            InFlight {
                command,
                remaining_ticks,
                fail,
            },
        );
        self.statuses.insert(tag, CommandStatus::Pending);
        Ok(tag)
    }

    fn status(&self, tag: CommandTag) -> CommandStatus {
        self.statuses
            .get(&tag)
            .cloned()
            .unwrap_or(CommandStatus::Unknown)
    }

    fn cancel(&mut self, tag: CommandTag) {
        if self.in_flight.remove(&tag).is_some() {
            self.statuses.insert(tag, CommandStatus::fatal("cancelled"));
        }
    }
}
