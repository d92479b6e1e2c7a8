use serde::Deserialize;

use cozmo_core::rng::stream_id;
use cozmo_core::{ActionSpec, DeterministicRng};

use crate::behavior::{Behavior, BehaviorCx, BehaviorId, BehaviorStatus, DelegateOutcome};
use crate::config::BehaviorConfig;
use crate::error::{BehaviorError, ContainerError};

#[derive(Debug, Deserialize)]
struct PlayAnimationParams {
    animations: Vec<String>,
    #[serde(default = "default_loops")]
    loops: u32,
}

fn default_loops() -> u32 {
    1
}

/// Plays one animation picked from a configured list.
#[derive(Debug)]
pub(crate) struct PlayAnimationBehavior {
    id: BehaviorId,
    animations: Vec<String>,
    loops: u32,
    failed: bool,
}

impl PlayAnimationBehavior {
    pub(crate) fn from_config(config: &BehaviorConfig) -> Result<Self, ContainerError> {
        let params: PlayAnimationParams = config.params()?;
        if params.animations.is_empty() {
            return Err(ContainerError::InvalidParams {
                id: config.id.clone(),
                reason: "`animations` must not be empty".to_string(),
            });
        }
        Ok(Self {
            id: config.id.clone(),
            animations: params.animations,
            loops: params.loops.max(1),
            failed: false,
        })
    }
}

impl Behavior for PlayAnimationBehavior {
    fn class(&self) -> &'static str {
        "PlayAnimation"
    }

    fn init(&mut self, cx: &mut BehaviorCx<'_>) -> Result<(), BehaviorError> {
        self.failed = false;
        let mut rng = cx.ctx.rng(stream_id(self.id.as_str()));
        let name = rng
            .pick(&self.animations)
            .cloned()
            .ok_or_else(|| BehaviorError::Config("no animations".to_string()))?;
        cx.set_debug_state("Playing");
        cx.delegate_action(ActionSpec::PlayAnimation {
            name,
            loops: self.loops,
        });
        Ok(())
    }

    fn update(&mut self, cx: &mut BehaviorCx<'_>) -> BehaviorStatus {
        if cx.is_delegating() {
            BehaviorStatus::Running
        } else if self.failed {
            BehaviorStatus::Failure
        } else {
            BehaviorStatus::Complete
        }
    }

    fn on_delegate_finished(&mut self, _cx: &mut BehaviorCx<'_>, outcome: DelegateOutcome) {
        self.failed = !outcome.succeeded();
    }
}
