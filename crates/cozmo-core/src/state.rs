use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Planar pose in millimetres / radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x_mm: f32,
    pub y_mm: f32,
    #[serde(default)]
    pub angle_rad: f32,
}

impl Pose {
    pub fn new(x_mm: f32, y_mm: f32, angle_rad: f32) -> Self {
        Self {
            x_mm,
            y_mm,
            angle_rad,
        }
    }

    pub fn distance_to(&self, other: &Pose) -> f32 {
        (other.x_mm - self.x_mm).hypot(other.y_mm - self.y_mm)
    }

    /// Heading change (wrapped to [-pi, pi]) needed to face `target`.
    pub fn bearing_to(&self, target: &Pose) -> f32 {
        let heading = (target.y_mm - self.y_mm).atan2(target.x_mm - self.x_mm);
        wrap_angle(heading - self.angle_rad)
    }

    /// Point `standoff_mm` short of `target` along the line from `self`.
    pub fn approach(&self, target: &Pose, standoff_mm: f32) -> Pose {
        let dist = self.distance_to(target);
        let heading = (target.y_mm - self.y_mm).atan2(target.x_mm - self.x_mm);
        if dist <= standoff_mm {
            return Pose::new(self.x_mm, self.y_mm, heading);
        }
        let scale = (dist - standoff_mm) / dist;
        Pose::new(
            self.x_mm + (target.x_mm - self.x_mm) * scale,
            self.y_mm + (target.y_mm - self.y_mm) * scale,
            heading,
        )
    }
}

/// Wrap into `(-PI, PI]`. Non-finite input comes back as NaN.
pub fn wrap_angle(rad: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let wrapped = (rad + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        PI
    } else {
        wrapped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffTreadsState {
    #[default]
    OnTreads,
    InAir,
    Falling,
    OnBack,
    OnFace,
    OnSide,
}

impl OffTreadsState {
    pub fn is_on_treads(self) -> bool {
        self == OffTreadsState::OnTreads
    }
}

/// Accelerometer reading in mm/s^2.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Accel {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Accel {
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedObject {
    pub pose: Pose,
    pub last_seen_tick: u64,
    /// Object this one rests on, if it is part of a stack.
    #[serde(default)]
    pub stacked_on: Option<ObjectId>,
}

/// Immutable per-tick snapshot of everything the execution core reads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotState {
    pub pose: Pose,
    pub head_angle_rad: f32,
    pub lift_height_mm: f32,
    pub off_treads: OffTreadsState,
    pub cliff_detected: bool,
    pub picked_up: bool,
    pub shaken: bool,
    pub on_charger: bool,
    pub accel: Accel,
    pub carrying_object: Option<ObjectId>,
    pub objects: BTreeMap<ObjectId, ObservedObject>,
}

impl RobotState {
    pub fn is_on_treads(&self) -> bool {
        self.off_treads.is_on_treads()
    }

    pub fn is_carrying_object(&self) -> bool {
        self.carrying_object.is_some()
    }

    pub fn object(&self, id: ObjectId) -> Option<&ObservedObject> {
        self.objects.get(&id)
    }

    /// Objects seen within the last `max_age_ticks` ticks, nearest first.
    pub fn recently_seen(&self, now_tick: u64, max_age_ticks: u64) -> Vec<ObjectId> {
        let mut seen: Vec<(ObjectId, f32)> = self
            .objects
            .iter()
            .filter(|(_, obj)| now_tick.saturating_sub(obj.last_seen_tick) <= max_age_ticks)
            .map(|(id, obj)| (*id, self.pose.distance_to(&obj.pose)))
            .collect();
        seen.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        seen.into_iter().map(|(id, _)| id).collect()
    }

    /// `(top, bottom)` pairs for every visible two-high stack.
    pub fn stacks(&self) -> Vec<(ObjectId, ObjectId)> {
        self.objects
            .iter()
            .filter_map(|(id, obj)| {
                let below = obj.stacked_on?;
                self.objects.contains_key(&below).then_some((*id, below))
            })
            .collect()
    }
}
