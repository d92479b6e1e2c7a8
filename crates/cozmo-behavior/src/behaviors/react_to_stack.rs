use std::collections::BTreeSet;

use serde::Deserialize;

use cozmo_core::{ActionSpec, ObjectId};

use crate::behavior::{
    Behavior, BehaviorCx, BehaviorStatus, DelegateOutcome, Preconditions,
};
use crate::config::BehaviorConfig;
use crate::error::{BehaviorError, ContainerError};

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ReactToStackParams {
    animation: String,
    turn_speed_deg_s: f32,
    /// Bearings below this are close enough to skip the turn.
    facing_tolerance_deg: f32,
}

impl Default for ReactToStackParams {
    fn default() -> Self {
        Self {
            animation: "ReactToStack".to_string(),
            turn_speed_deg_s: 120.0,
            facing_tolerance_deg: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Turning,
    Celebrating,
    Done,
}

/// Turns toward a freshly seen two-cube stack and plays a reaction.
#[derive(Debug)]
pub(crate) struct ReactToStackBehavior {
    params: ReactToStackParams,
    state: State,
    reacted: BTreeSet<(ObjectId, ObjectId)>,
    failed: bool,
}

impl ReactToStackBehavior {
    pub(crate) fn from_config(config: &BehaviorConfig) -> Result<Self, ContainerError> {
        Ok(Self {
            params: config.params()?,
            state: State::Done,
            reacted: BTreeSet::new(),
            failed: false,
        })
    }

    fn fresh_stack(&self, pre: &Preconditions<'_>) -> Option<(ObjectId, ObjectId)> {
        pre.state
            .stacks()
            .into_iter()
            .find(|stack| !self.reacted.contains(stack))
    }

    fn transition_to_turning(&mut self, cx: &mut BehaviorCx<'_>, top: ObjectId) {
        let bearing = cx
            .state
            .object(top)
            .map(|obj| cx.state.pose.bearing_to(&obj.pose))
            .unwrap_or(0.0);
        if bearing.abs().to_degrees() < self.params.facing_tolerance_deg {
            self.transition_to_celebrating(cx);
            return;
        }
        self.state = State::Turning;
        cx.set_debug_state("TurnToStack");
        cx.delegate_action(ActionSpec::TurnInPlace {
            angle_deg: bearing.to_degrees(),
            speed_deg_s: self.params.turn_speed_deg_s,
        });
    }

    fn transition_to_celebrating(&mut self, cx: &mut BehaviorCx<'_>) {
        self.state = State::Celebrating;
        cx.set_debug_state("ReactToStack");
        cx.delegate_action(ActionSpec::animation(self.params.animation.clone()));
    }
}

impl Behavior for ReactToStackBehavior {
    fn class(&self) -> &'static str {
        "ReactToStackOfCubes"
    }

    fn is_runnable(&self, pre: &Preconditions<'_>) -> bool {
        self.fresh_stack(pre).is_some()
    }

    fn init(&mut self, cx: &mut BehaviorCx<'_>) -> Result<(), BehaviorError> {
        let stack = self
            .fresh_stack(&cx.preconditions())
            .ok_or_else(|| BehaviorError::NothingToDo("no unseen stack".to_string()))?;
        self.reacted.insert(stack);
        self.failed = false;
        self.transition_to_turning(cx, stack.0);
        Ok(())
    }

    fn update(&mut self, cx: &mut BehaviorCx<'_>) -> BehaviorStatus {
        match self.state {
            _ if cx.is_delegating() => BehaviorStatus::Running,
            State::Done if self.failed => BehaviorStatus::Failure,
            State::Done => BehaviorStatus::Complete,
            // a delegation was refused; nothing left to wait for
            State::Turning | State::Celebrating => BehaviorStatus::Failure,
        }
    }

    fn on_delegate_finished(&mut self, cx: &mut BehaviorCx<'_>, outcome: DelegateOutcome) {
        match self.state {
            State::Turning => {
                if !outcome.succeeded() {
                    tracing::debug!(?outcome, "turn toward stack failed, reacting anyway");
                }
                self.transition_to_celebrating(cx);
            }
            State::Celebrating => {
                self.failed = !outcome.succeeded();
                self.state = State::Done;
            }
            State::Done => {}
        }
    }
}
