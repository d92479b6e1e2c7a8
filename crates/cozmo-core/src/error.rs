use thiserror::Error;

/// Errors reported by a [`crate::CommandSink`] when a command cannot be queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("robot link timed out")]
    LinkTimeout,
    #[error("robot busy: {0}")]
    Busy(String),
    #[error("command rejected: {0}")]
    Rejected(String),
}

impl CommandError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CommandError::LinkTimeout | CommandError::Busy(_))
    }
}

/// Why an action could not start (or restart after a retry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

impl ActionError {
    /// Transient errors consume a retry instead of failing the action outright.
    pub fn is_transient(&self) -> bool {
        matches!(self, ActionError::Transient(_))
    }
}

impl From<CommandError> for ActionError {
    fn from(err: CommandError) -> Self {
        if err.is_transient() {
            ActionError::Transient(err.to_string())
        } else {
            ActionError::Precondition(err.to_string())
        }
    }
}
