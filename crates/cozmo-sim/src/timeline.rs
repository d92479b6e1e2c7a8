use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use cozmo_behavior::{EventKind, RobotEvent};
use cozmo_core::{ObjectId, ObservedObject, OffTreadsState, Pose, RobotState};

/// Scripted sensor input, keyed by tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeline {
    /// State at tick 0, before any step applies.
    pub initial: RobotState,
    pub steps: Vec<TimelineStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineStep {
    pub tick: u64,
    pub set: StatePatch,
    /// Extra events to publish besides the ones the patch implies.
    pub publish: Vec<EventKind>,
    /// Make the next N robot commands fail transiently.
    pub fail_next_commands: u32,
}

/// Fields left out keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatePatch {
    pub off_treads: Option<OffTreadsState>,
    pub cliff_detected: Option<bool>,
    pub picked_up: Option<bool>,
    pub shaken: Option<bool>,
    pub on_charger: Option<bool>,
    /// Put the carried cube down.
    pub drop_object: bool,
    /// Cubes seen this tick.
    pub objects: Vec<SeenObject>,
    pub forget_objects: Vec<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeenObject {
    pub id: ObjectId,
    pub x_mm: f32,
    pub y_mm: f32,
    #[serde(default)]
    pub stacked_on: Option<ObjectId>,
}

impl Timeline {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut timeline: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        timeline.steps.sort_by_key(|s| s.tick);
        Ok(timeline)
    }

    pub fn steps_at(&self, tick: u64) -> impl Iterator<Item = &TimelineStep> + '_ {
        self.steps.iter().filter(move |s| s.tick == tick)
    }

    /// Last tick any step touches.
    pub fn last_tick(&self) -> u64 {
        self.steps.iter().map(|s| s.tick).max().unwrap_or(0)
    }
}

impl StatePatch {
    /// Apply the patch and return the events it implies.
    pub fn apply(&self, state: &mut RobotState, tick: u64) -> Vec<RobotEvent> {
        let mut events = Vec::new();

        if let Some(off_treads) = self.off_treads {
            state.off_treads = off_treads;
        }
        if let Some(cliff) = self.cliff_detected {
            if cliff && !state.cliff_detected {
                events.push(RobotEvent::new(EventKind::CliffDetected, tick));
            }
            state.cliff_detected = cliff;
        }
        if let Some(picked_up) = self.picked_up {
            if picked_up && !state.picked_up {
                events.push(RobotEvent::new(EventKind::RobotPickedUp, tick));
            }
            state.picked_up = picked_up;
        }
        if let Some(shaken) = self.shaken {
            state.shaken = shaken;
        }
        if let Some(on_charger) = self.on_charger {
            if on_charger && !state.on_charger {
                events.push(RobotEvent::new(EventKind::PlacedOnCharger, tick));
            }
            state.on_charger = on_charger;
        }
        if self.drop_object {
            state.carrying_object = None;
        }

        for id in &self.forget_objects {
            state.objects.remove(id);
            if state.carrying_object == Some(*id) {
                state.carrying_object = None;
            }
        }
        for seen in &self.objects {
            let pose = Pose::new(seen.x_mm, seen.y_mm, 0.0);
            let kind = match state.objects.get(&seen.id) {
                Some(known) if known.pose != pose => EventKind::ObjectMoved,
                _ => EventKind::ObjectSeen,
            };
            state.objects.insert(
                seen.id,
                ObservedObject {
                    pose,
                    last_seen_tick: tick,
                    stacked_on: seen.stacked_on,
                },
            );
            events.push(RobotEvent::new(kind, tick).with_object(seen.id));
        }
        events
    }
}
