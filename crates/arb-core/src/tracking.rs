use serde::{Deserialize, Serialize};

use crate::pose::Pose;

/// Provider-reported validity of a tracked pose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingState {
    Tracking,
    Paused,
    Stopped,
}

/// Engine-assigned identity of a per-frame tracked entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaneOrientation {
    Horizontal,
    Vertical,
}

/// Anything the provider tracks frame to frame with a stable identity.
pub trait Trackable {
    fn id(&self) -> EntityId;
    fn tracking_state(&self) -> TrackingState;
    fn pose(&self) -> Pose;
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackedFace {
    pub id: EntityId,
    pub state: TrackingState,
    pub pose: Pose,
    /// Number of vertices in the provider's face mesh for this frame.
    pub mesh_vertices: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackedPlane {
    pub id: EntityId,
    pub state: TrackingState,
    pub pose: Pose,
    pub orientation: PlaneOrientation,
    /// Half-extents along the plane's local x and z axes, in meters.
    pub extent: [f64; 2],
}

/// A point-cloud feature point with the provider's confidence in [0, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedPoint {
    pub id: EntityId,
    pub state: TrackingState,
    pub position: [f64; 3],
    pub confidence: f64,
}

impl Trackable for TrackedFace {
    fn id(&self) -> EntityId {
        self.id
    }
    fn tracking_state(&self) -> TrackingState {
        self.state
    }
    fn pose(&self) -> Pose {
        self.pose
    }
}

impl Trackable for TrackedPlane {
    fn id(&self) -> EntityId {
        self.id
    }
    fn tracking_state(&self) -> TrackingState {
        self.state
    }
    fn pose(&self) -> Pose {
        self.pose
    }
}

impl Trackable for TrackedPoint {
    fn id(&self) -> EntityId {
        self.id
    }
    fn tracking_state(&self) -> TrackingState {
        self.state
    }
    fn pose(&self) -> Pose {
        Pose::from_position(self.position)
    }
}
