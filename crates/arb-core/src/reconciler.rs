//! Per-frame diffing of provider-tracked entities.
//!
//! Each [`Reconciler`] keeps one derived record per engine identity. A frame
//! is folded in by identity: unseen ids are inserted, known ids are updated
//! only when their derived value changed, and ids that are STOPPED or missing
//! from the frame are released.

use std::collections::{HashMap, HashSet};

use crate::config::SessionConfig;
use crate::constants::UNIT_DRIFT_TOLERANCE;
use crate::pose::Pose;
use crate::provider::Frame;
use crate::tracking::{EntityId, PlaneOrientation, Trackable, TrackedPoint, TrackingState};

/// Downstream representation of one tracked entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Derived<A> {
    pub pose: Pose,
    pub attrs: A,
    /// Bumped on every in-place update; 0 right after insertion.
    pub revision: u64,
}

/// What one frame changed. Each list is sorted by id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameDiff {
    pub inserted: Vec<EntityId>,
    pub updated: Vec<EntityId>,
    pub removed: Vec<EntityId>,
}

impl FrameDiff {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    fn sort(&mut self) {
        self.inserted.sort();
        self.updated.sort();
        self.removed.sort();
    }
}

#[derive(Debug)]
pub struct Reconciler<A> {
    known: HashMap<EntityId, Derived<A>>,
}

impl<A> Default for Reconciler<A> {
    fn default() -> Self {
        Self {
            known: HashMap::new(),
        }
    }
}

impl<A: Clone + PartialEq> Reconciler<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.known.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Derived<A>> {
        self.known.get(&id)
    }

    /// Known ids, sorted.
    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.known.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Fold one frame's entities in. `derive` computes the attribute part of
    /// the derived representation.
    pub fn reconcile<T, F>(&mut self, entities: &[T], mut derive: F) -> FrameDiff
    where
        T: Trackable,
        F: FnMut(&T) -> A,
    {
        let mut diff = FrameDiff::default();
        let mut seen = HashSet::with_capacity(entities.len());

        for entity in entities {
            let id = entity.id();
            if entity.tracking_state() == TrackingState::Stopped {
                if self.known.remove(&id).is_some() {
                    diff.removed.push(id);
                }
                continue;
            }
            seen.insert(id);

            let pose = entity.pose();
            let attrs = derive(entity);
            match self.known.get_mut(&id) {
                Some(derived) => {
                    if derived.pose.approx_eq(&pose, UNIT_DRIFT_TOLERANCE) && derived.attrs == attrs
                    {
                        continue;
                    }
                    derived.pose = pose;
                    derived.attrs = attrs;
                    derived.revision += 1;
                    diff.updated.push(id);
                }
                None => {
                    self.known.insert(
                        id,
                        Derived {
                            pose,
                            attrs,
                            revision: 0,
                        },
                    );
                    diff.inserted.push(id);
                }
            }
        }

        let gone: Vec<EntityId> = self
            .known
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        for id in gone {
            self.known.remove(&id);
            diff.removed.push(id);
        }

        diff.sort();
        diff
    }

    /// Release every derived record. Returns the released ids as a diff.
    pub fn clear(&mut self) -> FrameDiff {
        let mut diff = FrameDiff {
            removed: self.known.drain().map(|(id, _)| id).collect(),
            ..FrameDiff::default()
        };
        diff.sort();
        diff
    }
}

/// Reference to an asset registered through `loadMesh`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FaceAssets {
    /// Increments on every texture load; 0 means no texture yet.
    pub texture_revision: u64,
    pub texture_len: usize,
    pub model: Option<String>,
}

impl FaceAssets {
    pub fn has_texture(&self) -> bool {
        self.texture_revision > 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FaceAttrs {
    pub assets: FaceAssets,
    pub mesh_vertices: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlaneAttrs {
    pub orientation: PlaneOrientation,
    pub extent: [f64; 2],
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointAttrs {
    pub confidence: f64,
}

impl Trackable for TrackedPointPose<'_> {
    fn id(&self) -> EntityId {
        self.0.id
    }
    fn tracking_state(&self) -> TrackingState {
        self.0.state
    }
    fn pose(&self) -> Pose {
        Pose::from_position(self.0.position)
    }
}

struct TrackedPointPose<'a>(&'a TrackedPoint);

/// Per-kind diffs for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityReport {
    pub faces: FrameDiff,
    pub planes: FrameDiff,
    pub points: FrameDiff,
}

/// Faces, planes and feature points of the active session.
#[derive(Debug, Default)]
pub struct TrackedEntities {
    pub faces: Reconciler<FaceAttrs>,
    pub planes: Reconciler<PlaneAttrs>,
    pub points: Reconciler<PointAttrs>,
}

impl TrackedEntities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile every entity kind the session currently shows.
    ///
    /// Faces wait for a loaded texture; planes and points that are switched
    /// off in `config` are released.
    pub fn reconcile_frame(
        &mut self,
        frame: &Frame,
        config: &SessionConfig,
        assets: &FaceAssets,
    ) -> EntityReport {
        let faces = if !config.face_mesh {
            self.faces.clear()
        } else if assets.has_texture() {
            self.faces.reconcile(&frame.faces, |face| FaceAttrs {
                assets: assets.clone(),
                mesh_vertices: face.mesh_vertices,
            })
        } else {
            FrameDiff::default()
        };

        let mode = config.plane_detection_config;
        let planes = if mode.is_enabled() {
            let accepted: Vec<_> = frame
                .planes
                .iter()
                .filter(|p| mode.accepts(p.orientation))
                .cloned()
                .collect();
            self.planes.reconcile(&accepted, |plane| PlaneAttrs {
                orientation: plane.orientation,
                extent: plane.extent,
            })
        } else {
            self.planes.clear()
        };

        let points = if config.show_feature_points {
            let wrapped: Vec<TrackedPointPose<'_>> =
                frame.points.iter().map(TrackedPointPose).collect();
            self.points.reconcile(&wrapped, |p| PointAttrs {
                confidence: p.0.confidence,
            })
        } else {
            self.points.clear()
        };

        let report = EntityReport {
            faces,
            planes,
            points,
        };
        tracing::debug!(
            frame = frame.index,
            faces = self.faces.len(),
            planes = self.planes.len(),
            points = self.points.len(),
            "entities reconciled"
        );
        report
    }

    pub fn clear(&mut self) {
        self.faces.clear();
        self.planes.clear();
        self.points.clear();
    }
}
