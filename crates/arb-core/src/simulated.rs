//! Deterministic in-process AR provider.
//!
//! Stands in for the vendor engine in tests and in the stdio bridge: anchors
//! get stable handles, cloud tasks finish a fixed number of frames after they
//! start, and faces, planes and feature points are synthesized from a seeded
//! RNG so every run with the same seed produces the same frames.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::ops::RangeInclusive;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::cloud::{CloudError, CloudState};
use crate::config::SessionConfig;
use crate::constants::{DEFAULT_STOPPED_GRACE_FRAMES, MAX_TTL_SECONDS, MIN_TTL_SECONDS};
use crate::error::{ArError, Result};
use crate::pose::Pose;
use crate::provider::{AnchorUpdate, ArProvider, EngineHandle, Frame, HitResult, HitTarget};
use crate::quaternion::Quaternion;
use crate::tracking::{
    EntityId, PlaneOrientation, TrackedFace, TrackedPlane, TrackedPoint, TrackingState,
};

/// Vertex count of the canonical face mesh.
const FACE_MESH_VERTICES: usize = 468;

/// Screen-space radius for node and point hits (normalized units).
const NODE_HIT_RADIUS: f64 = 0.05;
const POINT_HIT_RADIUS: f64 = 0.02;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    /// Frames between starting a cloud task and its terminal state.
    pub cloud_latency_frames: u64,
    pub max_ttl_seconds: u32,
    /// Feature points synthesized per frame while they are shown.
    pub feature_points: usize,
    pub faces: usize,
    pub planes: usize,
    pub stopped_grace_frames: u64,
    /// Whether the engine session is available at all.
    pub ready: bool,
    /// Whether frames carry a rendered image for snapshots.
    pub render_frames: bool,
    /// Anchors the remote service already knows about.
    pub cloud_anchors: Vec<SeededCloudAnchor>,
}

/// A remote anchor available for resolving from the first frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeededCloudAnchor {
    pub id: String,
    pub position: [f64; 3],
    /// Quaternion as `[x, y, z, w]`; identity when omitted.
    #[serde(default = "identity_xyzw")]
    pub rotation: [f64; 4],
}

fn identity_xyzw() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl SeededCloudAnchor {
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, Quaternion::from_xyzw(self.rotation))
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            cloud_latency_frames: 3,
            max_ttl_seconds: MAX_TTL_SECONDS,
            feature_points: 16,
            faces: 0,
            planes: 0,
            stopped_grace_frames: DEFAULT_STOPPED_GRACE_FRAMES,
            ready: true,
            render_frames: true,
            cloud_anchors: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
enum SimTask {
    Host,
    Resolve { cloud_anchor_id: String },
}

#[derive(Clone, Debug)]
struct SimCloud {
    task: SimTask,
    complete_at: u64,
    failure: Option<CloudError>,
    state: CloudState,
    cloud_anchor_id: Option<String>,
}

#[derive(Clone, Debug)]
struct SimAnchor {
    pose: Pose,
    state: TrackingState,
    cloud: Option<SimCloud>,
}

pub struct SimulatedProvider {
    config: SimulationConfig,
    session: SessionConfig,
    rng: SmallRng,
    running: bool,
    cloud_enabled: bool,
    frame: u64,
    next_handle: u64,
    next_entity: u64,
    anchors: BTreeMap<EngineHandle, SimAnchor>,
    dirty: BTreeSet<EngineHandle>,
    catalog: HashMap<String, Pose>,
    scripted_failures: VecDeque<CloudError>,
    scripted_ids: VecDeque<String>,
    faces: Vec<TrackedFace>,
    planes: Vec<TrackedPlane>,
    points: Vec<TrackedPoint>,
    nodes: BTreeMap<String, Pose>,
    camera: Pose,
}

impl SimulatedProvider {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = SmallRng::seed_from_u64(config.seed);
        let mut provider = Self {
            session: SessionConfig::default(),
            rng,
            running: true,
            cloud_enabled: false,
            frame: 0,
            next_handle: 0,
            next_entity: 0,
            anchors: BTreeMap::new(),
            dirty: BTreeSet::new(),
            catalog: HashMap::new(),
            scripted_failures: VecDeque::new(),
            scripted_ids: VecDeque::new(),
            faces: Vec::new(),
            planes: Vec::new(),
            points: Vec::new(),
            nodes: BTreeMap::new(),
            camera: Pose::identity(),
            config,
        };
        for seeded in &provider.config.cloud_anchors {
            provider.catalog.insert(seeded.id.clone(), seeded.pose());
        }
        for i in 0..provider.config.faces {
            provider.add_face(Pose::from_position([0.0, 0.0, -0.5 - 0.3 * i as f64]));
        }
        for i in 0..provider.config.planes {
            if i % 2 == 0 {
                provider.add_plane(
                    PlaneOrientation::Horizontal,
                    Pose::from_position([0.0, -1.0, -1.5 - 2.0 * i as f64]),
                    [1.0, 1.0],
                );
            } else {
                provider.add_plane(
                    PlaneOrientation::Vertical,
                    Pose::from_position([i as f64, 0.0, -3.0]),
                    [0.5, 1.0],
                );
            }
        }
        provider
    }

    fn next_entity_id(&mut self) -> EntityId {
        self.next_entity += 1;
        EntityId(self.next_entity)
    }

    fn alloc_handle(&mut self, pose: Pose, cloud: Option<SimCloud>) -> EngineHandle {
        self.next_handle += 1;
        let handle = EngineHandle(self.next_handle);
        self.anchors.insert(
            handle,
            SimAnchor {
                pose,
                state: TrackingState::Tracking,
                cloud,
            },
        );
        handle
    }

    // --- Scripting hooks ---

    pub fn set_ready(&mut self, ready: bool) {
        self.config.ready = ready;
    }

    pub fn set_rendering(&mut self, render: bool) {
        self.config.render_frames = render;
    }

    /// Make the next cloud task that starts end in `error`.
    pub fn fail_next_cloud_task(&mut self, error: CloudError) {
        self.scripted_failures.push_back(error);
    }

    /// Use `id` for the next successful upload instead of a generated one.
    pub fn set_next_cloud_id(&mut self, id: &str) {
        self.scripted_ids.push_back(id.to_string());
    }

    /// Put an anchor into the remote catalog so it can be resolved.
    pub fn seed_cloud_anchor(&mut self, cloud_anchor_id: &str, pose: Pose) {
        self.catalog.insert(cloud_anchor_id.to_string(), pose);
    }

    pub fn catalog_len(&self) -> usize {
        self.catalog.len()
    }

    pub fn live_anchor_count(&self) -> usize {
        self.anchors.len()
    }

    pub fn set_anchor_tracking(&mut self, handle: EngineHandle, state: TrackingState) {
        if let Some(anchor) = self.anchors.get_mut(&handle) {
            anchor.state = state;
            self.dirty.insert(handle);
        }
    }

    pub fn move_anchor(&mut self, handle: EngineHandle, pose: Pose) {
        if let Some(anchor) = self.anchors.get_mut(&handle) {
            anchor.pose = pose;
            self.dirty.insert(handle);
        }
    }

    pub fn add_face(&mut self, pose: Pose) -> EntityId {
        let id = self.next_entity_id();
        self.faces.push(TrackedFace {
            id,
            state: TrackingState::Tracking,
            pose,
            mesh_vertices: FACE_MESH_VERTICES,
        });
        id
    }

    pub fn move_face(&mut self, id: EntityId, pose: Pose) {
        if let Some(face) = self.faces.iter_mut().find(|f| f.id == id) {
            face.pose = pose;
        }
    }

    /// Report the face as STOPPED on the next frame, then forget it.
    pub fn stop_face(&mut self, id: EntityId) {
        if let Some(face) = self.faces.iter_mut().find(|f| f.id == id) {
            face.state = TrackingState::Stopped;
        }
    }

    pub fn add_plane(&mut self, orientation: PlaneOrientation, pose: Pose, extent: [f64; 2]) -> EntityId {
        let id = self.next_entity_id();
        self.planes.push(TrackedPlane {
            id,
            state: TrackingState::Tracking,
            pose,
            orientation,
            extent,
        });
        id
    }

    pub fn stop_plane(&mut self, id: EntityId) {
        if let Some(plane) = self.planes.iter_mut().find(|p| p.id == id) {
            plane.state = TrackingState::Stopped;
        }
    }

    // --- Frame synthesis ---

    fn advance_cloud_tasks(&mut self) {
        let frame = self.frame;
        let mut finished = Vec::new();
        for (handle, anchor) in self.anchors.iter_mut() {
            if let Some(cloud) = anchor.cloud.as_mut()
                && cloud.state == CloudState::TaskInProgress
                && frame >= cloud.complete_at
            {
                finished.push(*handle);
            }
        }

        for handle in finished {
            let id_seed: u64 = self.rng.random();
            let Some(anchor) = self.anchors.get_mut(&handle) else {
                continue;
            };
            let Some(cloud) = anchor.cloud.as_mut() else {
                continue;
            };
            cloud.state = match (cloud.failure, &cloud.task) {
                (Some(error), _) => CloudState::Error(error),
                (None, SimTask::Host) => {
                    let id = self
                        .scripted_ids
                        .pop_front()
                        .unwrap_or_else(|| format!("ua-{id_seed:016x}"));
                    self.catalog.insert(id.clone(), anchor.pose);
                    cloud.cloud_anchor_id = Some(id);
                    CloudState::Success
                }
                (None, SimTask::Resolve { cloud_anchor_id }) => {
                    match self.catalog.get(cloud_anchor_id) {
                        Some(pose) => {
                            anchor.pose = *pose;
                            CloudState::Success
                        }
                        None => CloudState::Error(CloudError::CloudIdNotFound),
                    }
                }
            };
            self.dirty.insert(handle);
        }
    }

    fn synthesize_points(&mut self) {
        if !self.session.show_feature_points {
            self.points.clear();
            return;
        }
        let count = self.config.feature_points;
        if self.points.len() != count {
            self.points = (0..count)
                .map(|i| TrackedPoint {
                    id: EntityId(1_000_000 + i as u64),
                    state: TrackingState::Tracking,
                    position: [
                        self.rng.random_range(-1.0..1.0),
                        self.rng.random_range(-1.0..0.5),
                        self.rng.random_range(-3.0..-0.5),
                    ],
                    confidence: self.rng.random_range(0.2..1.0),
                })
                .collect();
            return;
        }
        // Every fourth point drifts slightly each frame
        for (i, point) in self.points.iter_mut().enumerate() {
            if (i as u64 + self.frame) % 4 == 0 {
                point.position[0] += self.rng.random_range(-0.001..0.001);
            }
        }
    }

    fn rendered_image(&self) -> Option<Vec<u8>> {
        if !self.config.render_frames {
            return None;
        }
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&self.frame.to_le_bytes());
        Some(bytes)
    }

    fn ray(x: f64, y: f64) -> [f64; 3] {
        let d = [(x - 0.5) * 2.0, -(y - 0.5) * 2.0, -1.0];
        let len = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
        [d[0] / len, d[1] / len, d[2] / len]
    }

    fn project(p: [f64; 3]) -> Option<(f64, f64)> {
        if p[2] >= 0.0 {
            return None;
        }
        let depth = -p[2];
        Some((0.5 + p[0] / depth * 0.5, 0.5 - p[1] / depth * 0.5))
    }

    fn screen_distance(a: (f64, f64), x: f64, y: f64) -> f64 {
        ((a.0 - x).powi(2) + (a.1 - y).powi(2)).sqrt()
    }

    fn norm(p: [f64; 3]) -> f64 {
        (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt()
    }

    fn hit_plane(plane: &TrackedPlane, dir: [f64; 3]) -> Option<HitResult> {
        let axis = match plane.orientation {
            PlaneOrientation::Horizontal => [0.0, 1.0, 0.0],
            PlaneOrientation::Vertical => [0.0, 0.0, 1.0],
        };
        let normal = plane.pose.rotation.rotate(axis);
        let denom = normal[0] * dir[0] + normal[1] * dir[1] + normal[2] * dir[2];
        if denom.abs() < 1e-9 {
            return None;
        }
        let c = plane.pose.position;
        let t = (normal[0] * c[0] + normal[1] * c[1] + normal[2] * c[2]) / denom;
        if t <= 0.0 {
            return None;
        }
        let hit = [dir[0] * t, dir[1] * t, dir[2] * t];
        let local = plane
            .pose
            .rotation
            .conjugate()
            .rotate([hit[0] - c[0], hit[1] - c[1], hit[2] - c[2]]);
        let (u, v) = match plane.orientation {
            PlaneOrientation::Horizontal => (local[0], local[2]),
            PlaneOrientation::Vertical => (local[0], local[1]),
        };
        if u.abs() > plane.extent[0] || v.abs() > plane.extent[1] {
            return None;
        }
        Some(HitResult {
            target: HitTarget::Plane,
            pose: Pose::new(hit, plane.pose.rotation),
            distance: t,
        })
    }
}

impl ArProvider for SimulatedProvider {
    fn is_ready(&self) -> bool {
        self.config.ready
    }

    fn configure(&mut self, config: &SessionConfig) -> Result<()> {
        if !self.config.ready {
            return Err(ArError::ProviderUnavailable("session is null".to_string()));
        }
        self.session = config.clone();
        Ok(())
    }

    fn enable_cloud_anchors(&mut self) -> Result<()> {
        if !self.config.ready {
            return Err(ArError::ProviderUnavailable(
                "Error initializing cloud anchor mode: Session is null".to_string(),
            ));
        }
        self.cloud_enabled = true;
        Ok(())
    }

    fn cloud_anchors_enabled(&self) -> bool {
        self.cloud_enabled
    }

    fn create_anchor(&mut self, pose: &Pose) -> Result<EngineHandle> {
        if !self.config.ready {
            return Err(ArError::ProviderUnavailable("session is null".to_string()));
        }
        Ok(self.alloc_handle(*pose, None))
    }

    fn detach_anchor(&mut self, handle: EngineHandle) {
        self.anchors.remove(&handle);
        self.dirty.remove(&handle);
    }

    fn anchor_pose(&self, handle: EngineHandle) -> Option<Pose> {
        self.anchors.get(&handle).map(|a| a.pose)
    }

    fn host_cloud_anchor(
        &mut self,
        handle: EngineHandle,
        ttl_seconds: Option<u32>,
    ) -> Result<EngineHandle> {
        if !self.cloud_enabled {
            return Err(ArError::ProviderUnavailable(
                "cloud anchor mode is not enabled".to_string(),
            ));
        }
        if let Some(ttl) = ttl_seconds
            && !self.ttl_range().contains(&ttl)
        {
            return Err(ArError::InvalidTtl {
                ttl: i64::from(ttl),
                min: MIN_TTL_SECONDS,
                max: self.config.max_ttl_seconds,
            });
        }
        let pose = self
            .anchor_pose(handle)
            .ok_or_else(|| ArError::NotFound(handle.to_string()))?;
        let cloud = SimCloud {
            task: SimTask::Host,
            complete_at: self.frame + self.config.cloud_latency_frames,
            failure: self.scripted_failures.pop_front(),
            state: CloudState::TaskInProgress,
            cloud_anchor_id: None,
        };
        Ok(self.alloc_handle(pose, Some(cloud)))
    }

    fn resolve_cloud_anchor(&mut self, cloud_anchor_id: &str) -> Result<EngineHandle> {
        if !self.cloud_enabled {
            return Err(ArError::ProviderUnavailable(
                "cloud anchor mode is not enabled".to_string(),
            ));
        }
        let cloud = SimCloud {
            task: SimTask::Resolve {
                cloud_anchor_id: cloud_anchor_id.to_string(),
            },
            complete_at: self.frame + self.config.cloud_latency_frames,
            failure: self.scripted_failures.pop_front(),
            state: CloudState::TaskInProgress,
            cloud_anchor_id: Some(cloud_anchor_id.to_string()),
        };
        Ok(self.alloc_handle(Pose::identity(), Some(cloud)))
    }

    fn cloud_state(&self, handle: EngineHandle) -> CloudState {
        self.anchors
            .get(&handle)
            .and_then(|a| a.cloud.as_ref())
            .map(|c| c.state)
            .unwrap_or_default()
    }

    fn cloud_anchor_id(&self, handle: EngineHandle) -> Option<String> {
        self.anchors
            .get(&handle)
            .and_then(|a| a.cloud.as_ref())
            .and_then(|c| c.cloud_anchor_id.clone())
    }

    fn ttl_range(&self) -> RangeInclusive<u32> {
        MIN_TTL_SECONDS..=self.config.max_ttl_seconds
    }

    fn stopped_anchor_grace_frames(&self) -> u64 {
        self.config.stopped_grace_frames
    }

    fn camera_pose(&self) -> Option<Pose> {
        if self.config.ready && self.frame > 0 {
            Some(self.camera)
        } else {
            None
        }
    }

    fn hit_test(&self, x: f64, y: f64) -> Vec<HitResult> {
        let mut hits = Vec::new();

        for (name, pose) in &self.nodes {
            if let Some(screen) = Self::project(pose.position)
                && Self::screen_distance(screen, x, y) <= NODE_HIT_RADIUS
            {
                hits.push(HitResult {
                    target: HitTarget::Node(name.clone()),
                    pose: *pose,
                    distance: Self::norm(pose.position),
                });
            }
        }

        let dir = Self::ray(x, y);
        for plane in self.planes.iter().filter(|p| p.state != TrackingState::Stopped) {
            if self.session.plane_detection_config.accepts(plane.orientation)
                && let Some(hit) = Self::hit_plane(plane, dir)
            {
                hits.push(hit);
            }
        }

        for point in &self.points {
            if let Some(screen) = Self::project(point.position)
                && Self::screen_distance(screen, x, y) <= POINT_HIT_RADIUS
            {
                hits.push(HitResult {
                    target: HitTarget::Point,
                    pose: Pose::from_position(point.position),
                    distance: Self::norm(point.position),
                });
            }
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    fn place_node(&mut self, name: &str, pose: &Pose) {
        self.nodes.insert(name.to_string(), *pose);
    }

    fn remove_node(&mut self, name: &str) {
        self.nodes.remove(name);
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if !self.running || !self.config.ready {
            return None;
        }
        self.frame += 1;
        self.camera = Pose::new(
            [0.0, 0.0, 0.0],
            Quaternion::from_axis_angle([0.0, 1.0, 0.0], 0.01 * self.frame as f64),
        );
        self.advance_cloud_tasks();
        self.synthesize_points();

        let updated_anchors = std::mem::take(&mut self.dirty)
            .into_iter()
            .filter_map(|handle| {
                self.anchors.get(&handle).map(|a| AnchorUpdate {
                    handle,
                    pose: a.pose,
                    tracking_state: a.state,
                })
            })
            .collect();

        let planes = self
            .planes
            .iter()
            .filter(|p| self.session.plane_detection_config.accepts(p.orientation))
            .cloned()
            .collect();

        let frame = Frame {
            index: self.frame,
            camera_pose: Some(self.camera),
            faces: self.faces.clone(),
            planes,
            points: self.points.clone(),
            updated_anchors,
            rendered_image: self.rendered_image(),
        };

        // Stopped entities are reported exactly once
        self.faces.retain(|f| f.state != TrackingState::Stopped);
        self.planes.retain(|p| p.state != TrackingState::Stopped);
        Some(frame)
    }

    fn stop_frames(&mut self) {
        self.running = false;
    }

    fn shutdown(&mut self) {
        self.running = false;
        self.anchors.clear();
        self.dirty.clear();
        self.nodes.clear();
        tracing::debug!("simulated provider shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlaneDetection;

    fn provider() -> SimulatedProvider {
        SimulatedProvider::new(SimulationConfig::default())
    }

    #[test]
    fn test_frames_are_numbered() {
        let mut p = provider();
        assert_eq!(p.next_frame().unwrap().index, 1);
        assert_eq!(p.next_frame().unwrap().index, 2);
    }

    #[test]
    fn test_not_ready_delivers_nothing() {
        let mut p = SimulatedProvider::new(SimulationConfig {
            ready: false,
            ..SimulationConfig::default()
        });
        assert!(p.next_frame().is_none());
        assert!(p.create_anchor(&Pose::identity()).is_err());
        assert!(p.configure(&SessionConfig::default()).is_err());
    }

    #[test]
    fn test_host_completes_after_latency() {
        let mut p = provider();
        p.enable_cloud_anchors().unwrap();
        let a = p.create_anchor(&Pose::identity()).unwrap();
        let task = p.host_cloud_anchor(a, None).unwrap();
        p.next_frame();
        p.next_frame();
        assert_eq!(p.cloud_state(task), CloudState::TaskInProgress);
        let frame = p.next_frame().unwrap();
        assert_eq!(p.cloud_state(task), CloudState::Success);
        assert!(frame.updated_anchors.iter().any(|u| u.handle == task));
        assert!(p.cloud_anchor_id(task).unwrap().starts_with("ua-"));
    }

    #[test]
    fn test_configured_catalog_resolves() {
        let mut p = SimulatedProvider::new(SimulationConfig {
            cloud_latency_frames: 1,
            cloud_anchors: vec![SeededCloudAnchor {
                id: "desk".into(),
                position: [1.0, 0.0, -2.0],
                rotation: identity_xyzw(),
            }],
            ..SimulationConfig::default()
        });
        p.enable_cloud_anchors().unwrap();
        let task = p.resolve_cloud_anchor("desk").unwrap();
        p.next_frame();
        assert_eq!(p.cloud_state(task), CloudState::Success);
        assert_eq!(p.anchor_pose(task).unwrap().position, [1.0, 0.0, -2.0]);
    }

    #[test]
    fn test_scripted_cloud_id() {
        let mut p = provider();
        p.enable_cloud_anchors().unwrap();
        p.set_next_cloud_id("abc123");
        let a = p.create_anchor(&Pose::identity()).unwrap();
        let task = p.host_cloud_anchor(a, Some(60)).unwrap();
        for _ in 0..3 {
            p.next_frame();
        }
        assert_eq!(p.cloud_anchor_id(task).as_deref(), Some("abc123"));
        assert_eq!(p.catalog_len(), 1);
    }

    #[test]
    fn test_stopped_face_reported_once() {
        let mut p = provider();
        let id = p.add_face(Pose::identity());
        p.stop_face(id);
        let frame = p.next_frame().unwrap();
        assert_eq!(frame.faces[0].state, TrackingState::Stopped);
        assert!(p.next_frame().unwrap().faces.is_empty());
    }

    #[test]
    fn test_planes_follow_detection_mode() {
        let mut p = SimulatedProvider::new(SimulationConfig {
            planes: 2,
            ..SimulationConfig::default()
        });
        assert!(p.next_frame().unwrap().planes.is_empty());
        p.configure(&SessionConfig {
            plane_detection_config: PlaneDetection::Horizontal,
            ..SessionConfig::default()
        })
        .unwrap();
        let planes = p.next_frame().unwrap().planes;
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0].orientation, PlaneOrientation::Horizontal);
    }

    #[test]
    fn test_hit_test_nearest_first() {
        let mut p = provider();
        p.configure(&SessionConfig {
            plane_detection_config: PlaneDetection::Both,
            ..SessionConfig::default()
        })
        .unwrap();
        p.add_plane(
            PlaneOrientation::Vertical,
            Pose::from_position([0.0, 0.0, -3.0]),
            [2.0, 2.0],
        );
        p.place_node("chair", &Pose::from_position([0.0, 0.0, -1.0]));
        let hits = p.hit_test(0.5, 0.5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].target, HitTarget::Node("chair".into()));
        assert_eq!(hits[1].target, HitTarget::Plane);
        assert!((hits[1].distance - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rendered_image_is_png() {
        let mut p = provider();
        let bytes = p.next_frame().unwrap().rendered_image.unwrap();
        assert_eq!(&bytes[..8], &PNG_SIGNATURE);
        p.set_rendering(false);
        assert!(p.next_frame().unwrap().rendered_image.is_none());
    }
}
