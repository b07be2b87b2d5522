//! Seam between the anchor core and the vendor AR engine.
//!
//! Tracking, rendering and the remote anchor service all live behind
//! [`ArProvider`]. The core only ever talks to the provider from the thread
//! that owns the session; asynchronous provider work becomes visible through
//! the [`Frame`]s it hands back.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::cloud::CloudState;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::pose::Pose;
use crate::tracking::{TrackedFace, TrackedPlane, TrackedPoint, TrackingState};

/// Opaque engine-assigned anchor handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngineHandle(pub u64);

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-frame change report for one engine anchor.
#[derive(Clone, Debug, PartialEq)]
pub struct AnchorUpdate {
    pub handle: EngineHandle,
    pub pose: Pose,
    pub tracking_state: TrackingState,
}

/// Everything the provider observed for one sensor frame.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    pub index: u64,
    pub camera_pose: Option<Pose>,
    pub faces: Vec<TrackedFace>,
    pub planes: Vec<TrackedPlane>,
    pub points: Vec<TrackedPoint>,
    /// Anchors whose pose, tracking state or cloud state changed this frame.
    pub updated_anchors: Vec<AnchorUpdate>,
    /// Encoded image of the rendered frame, when the renderer produced one.
    pub rendered_image: Option<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HitTarget {
    /// A named scene node (anchor or attached child).
    Node(String),
    Plane,
    Point,
    Other,
}

/// One result of a screen-space hit test, nearest first.
#[derive(Clone, Debug, PartialEq)]
pub struct HitResult {
    pub target: HitTarget,
    pub pose: Pose,
    pub distance: f64,
}

/// The vendor AR engine as seen by the core.
pub trait ArProvider {
    /// False until the engine session exists (camera permission, install, ...).
    fn is_ready(&self) -> bool;

    fn configure(&mut self, config: &SessionConfig) -> Result<()>;

    /// Enable hosting and resolving cloud anchors.
    fn enable_cloud_anchors(&mut self) -> Result<()>;

    fn cloud_anchors_enabled(&self) -> bool;

    /// Place an anchor at `pose`.
    fn create_anchor(&mut self, pose: &Pose) -> Result<EngineHandle>;

    /// Release an anchor. Unknown handles are ignored.
    fn detach_anchor(&mut self, handle: EngineHandle);

    fn anchor_pose(&self, handle: EngineHandle) -> Option<Pose>;

    /// Start uploading the anchor behind `handle`. The returned handle is a
    /// new engine anchor whose cloud state advances asynchronously.
    fn host_cloud_anchor(&mut self, handle: EngineHandle, ttl_seconds: Option<u32>)
    -> Result<EngineHandle>;

    /// Start resolving `cloud_anchor_id` into a new engine anchor.
    fn resolve_cloud_anchor(&mut self, cloud_anchor_id: &str) -> Result<EngineHandle>;

    fn cloud_state(&self, handle: EngineHandle) -> CloudState;

    fn cloud_anchor_id(&self, handle: EngineHandle) -> Option<String>;

    /// Hosted anchor lifetimes the remote service accepts, in seconds.
    fn ttl_range(&self) -> RangeInclusive<u32>;

    /// Frames an anchor may report STOPPED before the provider no longer
    /// guarantees it can recover.
    fn stopped_anchor_grace_frames(&self) -> u64;

    /// Latest display-oriented camera pose.
    fn camera_pose(&self) -> Option<Pose>;

    /// Hit test at normalized screen coordinates, nearest hit first.
    fn hit_test(&self, x: f64, y: f64) -> Vec<HitResult>;

    /// Let the renderer know about a scene node so taps can find it.
    fn place_node(&mut self, name: &str, pose: &Pose);

    fn remove_node(&mut self, name: &str);

    /// Produce the next sensor frame, if the session is delivering frames.
    fn next_frame(&mut self) -> Option<Frame>;

    /// Stop delivering frames. `next_frame` returns `None` afterwards.
    fn stop_frames(&mut self);

    /// Close the engine session and release whatever it still holds.
    fn shutdown(&mut self);
}
