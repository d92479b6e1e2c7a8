use serde::Deserialize;

use crate::behavior::{Behavior, BehaviorCx, BehaviorStatus};
use crate::config::BehaviorConfig;
use crate::error::{BehaviorError, ContainerError};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WaitParams {
    timeout_s: Option<f32>,
}

/// Does nothing, forever or until `timeout_s`. The usual idle behavior.
#[derive(Debug)]
pub(crate) struct WaitBehavior {
    timeout_s: Option<f32>,
    started_s: f64,
}

impl WaitBehavior {
    pub(crate) fn forever() -> Self {
        Self {
            timeout_s: None,
            started_s: 0.0,
        }
    }

    pub(crate) fn from_config(config: &BehaviorConfig) -> Result<Self, ContainerError> {
        let params: WaitParams = config.params()?;
        Ok(Self {
            timeout_s: params.timeout_s,
            started_s: 0.0,
        })
    }
}

impl Behavior for WaitBehavior {
    fn class(&self) -> &'static str {
        "Wait"
    }

    fn init(&mut self, cx: &mut BehaviorCx<'_>) -> Result<(), BehaviorError> {
        self.started_s = cx.ctx.time_s;
        cx.set_debug_state("Waiting");
        Ok(())
    }

    fn update(&mut self, cx: &mut BehaviorCx<'_>) -> BehaviorStatus {
        match self.timeout_s {
            Some(timeout) if cx.ctx.time_s - self.started_s >= timeout as f64 => {
                BehaviorStatus::Complete
            }
            _ => BehaviorStatus::Running,
        }
    }
}
