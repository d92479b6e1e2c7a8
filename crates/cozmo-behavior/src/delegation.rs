use cozmo_core::ActionRunner;

use crate::container::BehaviorHandle;
use crate::error::SchedulerError;

#[derive(Debug)]
pub enum StackFrame {
    Behavior(BehaviorHandle),
    Action(ActionRunner),
}

impl StackFrame {
    pub fn behavior(&self) -> Option<BehaviorHandle> {
        match self {
            StackFrame::Behavior(handle) => Some(*handle),
            StackFrame::Action(_) => None,
        }
    }
}

/// Chain of delegation: index 0 is the bottom behavior, an action frame can
/// only sit on top.
#[derive(Debug)]
pub struct DelegationStack {
    frames: Vec<StackFrame>,
    max_depth: usize,
}

impl DelegationStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            max_depth,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn bottom(&self) -> Option<BehaviorHandle> {
        self.frames.first().and_then(StackFrame::behavior)
    }

    /// Deepest behavior frame: the one in control of the actuators.
    pub fn deepest_behavior(&self) -> Option<BehaviorHandle> {
        self.frames.iter().rev().find_map(StackFrame::behavior)
    }

    pub fn behavior_at(&self, index: usize) -> Option<BehaviorHandle> {
        self.frames.get(index).and_then(StackFrame::behavior)
    }

    pub fn behaviors(&self) -> impl Iterator<Item = BehaviorHandle> + '_ {
        self.frames.iter().filter_map(StackFrame::behavior)
    }

    pub fn contains(&self, handle: BehaviorHandle) -> bool {
        self.behaviors().any(|h| h == handle)
    }

    pub fn has_action(&self) -> bool {
        matches!(self.frames.last(), Some(StackFrame::Action(_)))
    }

    /// Whether the frame at `index` has a delegate above it.
    pub fn has_delegate(&self, index: usize) -> bool {
        index + 1 < self.frames.len()
    }

    pub(crate) fn push_behavior(&mut self, handle: BehaviorHandle) -> Result<usize, SchedulerError> {
        self.push(StackFrame::Behavior(handle))
    }

    pub(crate) fn push_action(&mut self, runner: ActionRunner) -> Result<usize, SchedulerError> {
        debug_assert!(!self.has_action(), "action pushed on top of an action");
        self.push(StackFrame::Action(runner))
    }

    fn push(&mut self, frame: StackFrame) -> Result<usize, SchedulerError> {
        if self.frames.len() >= self.max_depth {
            return Err(SchedulerError::DelegationDepthExceeded {
                depth: self.frames.len() + 1,
                max: self.max_depth,
            });
        }
        self.frames.push(frame);
        Ok(self.frames.len() - 1)
    }

    pub(crate) fn pop(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    pub(crate) fn leaf_action_mut(&mut self) -> Option<&mut ActionRunner> {
        match self.frames.last_mut() {
            Some(StackFrame::Action(runner)) => Some(runner),
            _ => None,
        }
    }
}
