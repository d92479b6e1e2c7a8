use serde::Deserialize;

use crate::behavior::{Behavior, BehaviorCx, BehaviorId, BehaviorStatus, DelegateOutcome};
use crate::config::BehaviorConfig;
use crate::error::{BehaviorError, ContainerError};

#[derive(Debug, Deserialize)]
struct SequenceParams {
    children: Vec<BehaviorId>,
    #[serde(default = "default_stop_on_failure")]
    stop_on_failure: bool,
}

fn default_stop_on_failure() -> bool {
    true
}

/// Delegates to child behaviors one after another.
#[derive(Debug)]
pub(crate) struct SequenceBehavior {
    children: Vec<BehaviorId>,
    stop_on_failure: bool,
    next: usize,
    any_failed: bool,
}

impl SequenceBehavior {
    pub(crate) fn from_config(config: &BehaviorConfig) -> Result<Self, ContainerError> {
        let params: SequenceParams = config.params()?;
        if params.children.iter().any(|child| *child == config.id) {
            return Err(ContainerError::InvalidParams {
                id: config.id.clone(),
                reason: "a sequence cannot contain itself".to_string(),
            });
        }
        Ok(Self {
            children: params.children,
            stop_on_failure: params.stop_on_failure,
            next: 0,
            any_failed: false,
        })
    }

    fn advance(&mut self, cx: &mut BehaviorCx<'_>) {
        let Some(child) = self.children.get(self.next).cloned() else {
            return;
        };
        self.next += 1;
        cx.set_debug_state(format!("Child{}", self.next));
        cx.delegate_behavior(child);
    }
}

impl Behavior for SequenceBehavior {
    fn class(&self) -> &'static str {
        "Sequence"
    }

    fn init(&mut self, cx: &mut BehaviorCx<'_>) -> Result<(), BehaviorError> {
        if self.children.is_empty() {
            return Err(BehaviorError::NothingToDo("empty sequence".to_string()));
        }
        self.next = 0;
        self.any_failed = false;
        self.advance(cx);
        Ok(())
    }

    fn update(&mut self, cx: &mut BehaviorCx<'_>) -> BehaviorStatus {
        if cx.is_delegating() {
            BehaviorStatus::Running
        } else if self.any_failed {
            BehaviorStatus::Failure
        } else {
            BehaviorStatus::Complete
        }
    }

    fn on_delegate_finished(&mut self, cx: &mut BehaviorCx<'_>, outcome: DelegateOutcome) {
        if !outcome.succeeded() {
            tracing::debug!(?outcome, "sequence child did not succeed");
            self.any_failed = true;
            if self.stop_on_failure {
                self.next = self.children.len();
                return;
            }
        }
        self.advance(cx);
    }
}
