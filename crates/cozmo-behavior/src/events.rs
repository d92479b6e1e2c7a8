use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use cozmo_core::ObjectId;

use crate::container::BehaviorHandle;
use crate::error::EventError;

/// Robot-originated event kinds behaviors can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ObjectSeen,
    ObjectMoved,
    RobotPickedUp,
    FaceSeen,
    CliffDetected,
    PlacedOnCharger,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::ObjectSeen,
        EventKind::ObjectMoved,
        EventKind::RobotPickedUp,
        EventKind::FaceSeen,
        EventKind::CliffDetected,
        EventKind::PlacedOnCharger,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotEvent {
    pub kind: EventKind,
    pub tick: u64,
    #[serde(default)]
    pub object: Option<ObjectId>,
}

impl RobotEvent {
    pub fn new(kind: EventKind, tick: u64) -> Self {
        Self {
            kind,
            tick,
            object: None,
        }
    }

    pub fn with_object(mut self, object: ObjectId) -> Self {
        self.object = Some(object);
        self
    }
}

/// Typed event queue. Kinds are fixed at construction; subscriptions are
/// held by handle.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: BTreeMap<EventKind, Vec<BehaviorHandle>>,
    queue: VecDeque<RobotEvent>,
}

impl EventBus {
    pub fn new(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            subscribers: kinds.into_iter().map(|k| (k, Vec::new())).collect(),
            queue: VecDeque::new(),
        }
    }

    pub fn is_declared(&self, kind: EventKind) -> bool {
        self.subscribers.contains_key(&kind)
    }

    pub fn declared(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.subscribers.keys().copied()
    }

    pub fn subscribe(&mut self, kind: EventKind, handle: BehaviorHandle) -> Result<(), EventError> {
        let subs = self
            .subscribers
            .get_mut(&kind)
            .ok_or(EventError::Undeclared(kind))?;
        if !subs.contains(&handle) {
            subs.push(handle);
        }
        Ok(())
    }

    pub fn subscribers(&self, kind: EventKind) -> &[BehaviorHandle] {
        self.subscribers
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn publish(&mut self, event: RobotEvent) -> Result<(), EventError> {
        if !self.is_declared(event.kind) {
            return Err(EventError::Undeclared(event.kind));
        }
        self.queue.push_back(event);
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Take every queued event paired with its current subscribers.
    pub(crate) fn drain(&mut self) -> Vec<(RobotEvent, Vec<BehaviorHandle>)> {
        let queued: Vec<RobotEvent> = self.queue.drain(..).collect();
        queued
            .into_iter()
            .map(|event| {
                let subs = self.subscribers(event.kind).to_vec();
                (event, subs)
            })
            .collect()
    }
}
