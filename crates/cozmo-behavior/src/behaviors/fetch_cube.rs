use std::collections::BTreeSet;

use serde::Deserialize;

use cozmo_core::{ActionSpec, ObjectId, WbKey};

use crate::behavior::{
    Behavior, BehaviorCx, BehaviorStatus, Capabilities, DelegateOutcome, Preconditions,
};
use crate::config::BehaviorConfig;
use crate::error::{BehaviorError, ContainerError};

/// Objects a fetch gave up on. Shared so other behaviors can avoid them.
pub const FAILED_PICKUPS: WbKey<BTreeSet<ObjectId>> = WbKey::new(0xC0_2A0_FE7C_0001, "failed_pickups");

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FetchCubeParams {
    max_attempts: u32,
    confused_animation: String,
    /// Objects older than this many ticks are not fetched.
    max_age_ticks: u64,
}

impl Default for FetchCubeParams {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            confused_animation: "Confused".to_string(),
            max_age_ticks: 90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Driving,
    PickingUp,
    Confused,
    Done,
}

/// Drives to a visible cube and lifts it, re-approaching from a new angle
/// when an attempt fails.
#[derive(Debug)]
pub(crate) struct FetchCubeBehavior {
    params: FetchCubeParams,
    state: State,
    target: Option<ObjectId>,
    attempt: u32,
    failed: bool,
}

impl FetchCubeBehavior {
    pub(crate) fn from_config(config: &BehaviorConfig) -> Result<Self, ContainerError> {
        let params: FetchCubeParams = config.params()?;
        if params.max_attempts == 0 {
            return Err(ContainerError::InvalidParams {
                id: config.id.clone(),
                reason: "`max_attempts` must be at least 1".to_string(),
            });
        }
        Ok(Self {
            params,
            state: State::Done,
            target: None,
            attempt: 0,
            failed: false,
        })
    }

    fn pick_target(&self, pre: &Preconditions<'_>) -> Option<ObjectId> {
        let failed = pre.whiteboard.get(FAILED_PICKUPS);
        let usable = |id: &ObjectId| failed.map_or(true, |set| !set.contains(id));

        if let Some(id) = pre.trigger.and_then(|t| t.object) {
            if pre.state.object(id).is_some() && usable(&id) {
                return Some(id);
            }
        }
        pre.state
            .recently_seen(pre.ctx.tick, self.params.max_age_ticks)
            .into_iter()
            .find(usable)
    }

    fn transition_to_driving(&mut self, cx: &mut BehaviorCx<'_>, object: ObjectId) {
        self.state = State::Driving;
        cx.set_debug_state("DriveToCube");
        cx.delegate_action(ActionSpec::DriveToObject {
            object,
            approach: self.attempt,
            retries: 2,
        });
    }

    fn transition_to_picking_up(&mut self, cx: &mut BehaviorCx<'_>, object: ObjectId) {
        self.state = State::PickingUp;
        cx.set_debug_state("PickUpCube");
        cx.delegate_action(ActionSpec::pick_up(object));
    }

    fn transition_to_confused(&mut self, cx: &mut BehaviorCx<'_>) {
        self.state = State::Confused;
        cx.set_debug_state("Confused");
        cx.delegate_action(ActionSpec::animation(self.params.confused_animation.clone()));
    }

    fn attempt_failed(&mut self, cx: &mut BehaviorCx<'_>, object: ObjectId, outcome: &DelegateOutcome) {
        self.attempt += 1;
        tracing::debug!(%object, attempt = self.attempt, ?outcome, "fetch attempt failed");
        if self.attempt < self.params.max_attempts {
            self.transition_to_driving(cx, object);
            return;
        }
        cx.whiteboard
            .get_or_insert_with(FAILED_PICKUPS, BTreeSet::new)
            .insert(object);
        self.transition_to_confused(cx);
    }
}

impl Behavior for FetchCubeBehavior {
    fn class(&self) -> &'static str {
        "FetchCube"
    }

    fn is_runnable(&self, pre: &Preconditions<'_>) -> bool {
        !pre.state.is_carrying_object() && self.pick_target(pre).is_some()
    }

    fn init(&mut self, cx: &mut BehaviorCx<'_>) -> Result<(), BehaviorError> {
        let object = self
            .pick_target(&cx.preconditions())
            .ok_or_else(|| BehaviorError::NothingToDo("no cube in view".to_string()))?;
        self.target = Some(object);
        self.attempt = 0;
        self.failed = false;
        self.transition_to_driving(cx, object);
        Ok(())
    }

    fn update(&mut self, cx: &mut BehaviorCx<'_>) -> BehaviorStatus {
        if cx.is_delegating() {
            return BehaviorStatus::Running;
        }
        match self.state {
            State::Done if !self.failed => BehaviorStatus::Complete,
            _ => BehaviorStatus::Failure,
        }
    }

    fn on_delegate_finished(&mut self, cx: &mut BehaviorCx<'_>, outcome: DelegateOutcome) {
        let Some(object) = self.target else {
            return;
        };
        match self.state {
            State::Driving if outcome.succeeded() => self.transition_to_picking_up(cx, object),
            State::PickingUp if outcome.succeeded() => {
                self.state = State::Done;
                self.failed = false;
            }
            State::Driving | State::PickingUp => self.attempt_failed(cx, object, &outcome),
            State::Confused => {
                self.state = State::Done;
                self.failed = true;
            }
            State::Done => {}
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::CARRYING_OBJECT_HANDLED_INTERNALLY
    }
}
