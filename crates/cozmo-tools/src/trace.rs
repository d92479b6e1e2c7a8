#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use cozmo_core::{WbKey, Whiteboard};

/// Tags the behavior engine emits.
pub mod tags {
    pub const BEHAVIOR_START: &str = "behavior.start";
    pub const BEHAVIOR_STOP: &str = "behavior.stop";
    pub const BEHAVIOR_RESUME: &str = "behavior.resume";
    pub const REACTION_TRIGGER: &str = "reaction.trigger";
    pub const REACTION_SUPPRESSED: &str = "reaction.suppressed";
    pub const ACTION_FINISHED: &str = "action.finished";
    pub const SAFETY_STOP: &str = "safety.stop";
}

/// One transition worth recording: what happened (`tag`), to whom
/// (`subject`) and any extra context (`detail`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TraceEvent {
    pub tick: u64,
    pub tag: Cow<'static, str>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub subject: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub detail: String,
}

impl TraceEvent {
    pub fn new(tick: u64, tag: impl Into<Cow<'static, str>>) -> Self {
        Self {
            tick,
            tag: tag.into(),
            subject: String::new(),
            detail: String::new(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

pub trait TraceSink {
    fn emit(&mut self, event: TraceEvent);
}

#[derive(Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TraceLog {
    pub events: Vec<TraceEvent>,
}

impl TraceLog {
    pub fn push(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn tagged<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a TraceEvent> + 'a {
        self.events.iter().filter(move |e| e.tag == tag)
    }

    /// `subject` of every event with `tag`, in emission order.
    pub fn subjects<'a>(&'a self, tag: &'a str) -> Vec<&'a str> {
        self.tagged(tag).map(|e| e.subject.as_str()).collect()
    }
}

/// Whiteboard key for collecting events in-memory.
pub const TRACE_LOG: WbKey<TraceLog> = WbKey::new(0xC0_2A0_7ACE_0001, "trace_log");
/// Whiteboard key for streaming events into a user-provided sink.
pub const TRACE_SINK: WbKey<Box<dyn TraceSink>> = WbKey::new(0xC0_2A0_7ACE_0002, "trace_sink");

pub fn emit(whiteboard: &mut Whiteboard, event: TraceEvent) {
    if let Some(log) = whiteboard.get_mut(TRACE_LOG) {
        log.push(event.clone());
    }
    if let Some(sink) = whiteboard.get_mut(TRACE_SINK) {
        sink.emit(event);
    }
}
