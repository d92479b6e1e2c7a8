use crate::action::{Action, ActionCheck, ActionFrame, ActionKind, Completion};
use crate::command::Tracks;
use crate::error::ActionError;

/// Runs child actions one after another as a single action.
///
/// A retry restarts the current step only; completed steps are not replayed.
/// Each step retries within its own budget.
pub struct SequentialAction {
    steps: Vec<Box<dyn Action>>,
    index: usize,
    step_started: bool,
    last: Completion,
}

impl SequentialAction {
    pub fn new(steps: Vec<Box<dyn Action>>) -> Self {
        Self {
            steps,
            index: 0,
            step_started: false,
            last: Completion::Done,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.index
    }
}

impl Action for SequentialAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Sequential
    }

    fn tracks(&self) -> Tracks {
        self.steps
            .iter()
            .fold(Tracks::empty(), |acc, step| acc | step.tracks())
    }

    fn max_retries(&self) -> u32 {
        self.steps.get(self.index).map_or(0, |s| s.max_retries())
    }

    fn retry_epoch(&self) -> usize {
        self.index
    }

    fn timeout_s(&self) -> f32 {
        self.steps.iter().map(|s| s.timeout_s()).sum::<f32>().max(1.0)
    }

    fn init(&mut self, _frame: &mut ActionFrame<'_>) -> Result<(), ActionError> {
        self.step_started = false;
        Ok(())
    }

    fn check(&mut self, frame: &mut ActionFrame<'_>) -> ActionCheck {
        while let Some(step) = self.steps.get_mut(self.index) {
            if !self.step_started {
                match step.init(frame) {
                    Ok(()) => self.step_started = true,
                    Err(err) if err.is_transient() => return ActionCheck::Retry(err.to_string().into()),
                    Err(err) => return ActionCheck::Abort(err.to_string().into()),
                }
            }

            match step.check(frame) {
                ActionCheck::Done(completion) => {
                    self.last = completion;
                    self.index += 1;
                    self.step_started = false;
                }
                other => return other,
            }
        }
        ActionCheck::Done(self.last.clone())
    }

    fn cancel(&mut self, frame: &mut ActionFrame<'_>) {
        if self.step_started {
            if let Some(step) = self.steps.get_mut(self.index) {
                step.cancel(frame);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildState {
    Pending,
    Started,
    Done,
}

/// Runs child actions side by side. Children must lock disjoint tracks.
pub struct ParallelAction {
    children: Vec<(Box<dyn Action>, ChildState)>,
}

impl ParallelAction {
    pub fn new(children: Vec<Box<dyn Action>>) -> Self {
        Self {
            children: children
                .into_iter()
                .map(|c| (c, ChildState::Pending))
                .collect(),
        }
    }

    fn cancel_started(&mut self, frame: &mut ActionFrame<'_>) {
        for (child, state) in &mut self.children {
            if *state == ChildState::Started {
                child.cancel(frame);
                *state = ChildState::Pending;
            }
        }
    }
}

impl Action for ParallelAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Parallel
    }

    fn tracks(&self) -> Tracks {
        self.children
            .iter()
            .fold(Tracks::empty(), |acc, (child, _)| acc | child.tracks())
    }

    fn max_retries(&self) -> u32 {
        self.children
            .iter()
            .map(|(c, _)| c.max_retries())
            .max()
            .unwrap_or(0)
    }

    fn timeout_s(&self) -> f32 {
        self.children
            .iter()
            .map(|(c, _)| c.timeout_s())
            .fold(1.0, f32::max)
    }

    fn init(&mut self, frame: &mut ActionFrame<'_>) -> Result<(), ActionError> {
        let mut locked = Tracks::empty();
        for (child, _) in &self.children {
            let tracks = child.tracks();
            if locked.intersects(tracks) {
                return Err(ActionError::Precondition(format!(
                    "{} overlaps tracks {:?}",
                    child.name(),
                    locked & tracks
                )));
            }
            locked |= tracks;
        }
        // a retry restarts whatever had not finished yet
        self.cancel_started(frame);
        Ok(())
    }

    fn check(&mut self, frame: &mut ActionFrame<'_>) -> ActionCheck {
        let mut running = false;
        let mut last = Completion::Done;
        let mut halt: Option<ActionCheck> = None;

        for (child, state) in &mut self.children {
            if *state == ChildState::Done {
                continue;
            }
            if *state == ChildState::Pending {
                match child.init(frame) {
                    Ok(()) => *state = ChildState::Started,
                    Err(err) if err.is_transient() => {
                        halt = Some(ActionCheck::Retry(err.to_string().into()));
                        break;
                    }
                    Err(err) => {
                        halt = Some(ActionCheck::Abort(err.to_string().into()));
                        break;
                    }
                }
            }
            match child.check(frame) {
                ActionCheck::Running => running = true,
                ActionCheck::Done(completion) => {
                    *state = ChildState::Done;
                    last = completion;
                }
                other => {
                    halt = Some(other);
                    break;
                }
            }
        }

        if let Some(check) = halt {
            if matches!(check, ActionCheck::Abort(_)) {
                self.cancel_started(frame);
            }
            return check;
        }
        if running {
            ActionCheck::Running
        } else {
            ActionCheck::Done(last)
        }
    }

    fn cancel(&mut self, frame: &mut ActionFrame<'_>) {
        self.cancel_started(frame);
    }
}
