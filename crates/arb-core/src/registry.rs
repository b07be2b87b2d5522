use std::collections::HashMap;

use crate::cloud::CloudAnchorRecord;
use crate::constants::TEMP_NAME_PREFIX;
use crate::error::{ArError, Result};
use crate::pose::Pose;
use crate::provider::{AnchorUpdate, ArProvider, EngineHandle};
use crate::scene::SceneTree;
use crate::tracking::TrackingState;

/// An anchor placed in this session, addressed by its host-facing name.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalAnchor {
    pub name: String,
    pub handle: EngineHandle,
    pub pose: Pose,
    pub tracking_state: TrackingState,
    /// Frame at which tracking last switched to STOPPED.
    stopped_since: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RemovalOutcome {
    /// Anchor removed; `detached` lists every scene node released with it.
    Removed { detached: Vec<String> },
    Unknown,
}

/// Authoritative name -> anchor mapping for the active session.
///
/// Owns every [`LocalAnchor`], every [`CloudAnchorRecord`] and the scene tree
/// the anchors root. Mutations are visible to the next read immediately.
#[derive(Debug, Default)]
pub struct AnchorRegistry {
    anchors: HashMap<String, LocalAnchor>,
    by_handle: HashMap<EngineHandle, String>,
    cloud: HashMap<String, CloudAnchorRecord>,
    scene: SceneTree,
}

impl AnchorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.anchors.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&LocalAnchor> {
        self.anchors.get(name)
    }

    /// Anchor names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.anchors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn handle_of(&self, name: &str) -> Option<EngineHandle> {
        self.anchors.get(name).map(|a| a.handle)
    }

    pub fn name_of(&self, handle: EngineHandle) -> Option<&str> {
        self.by_handle.get(&handle).map(String::as_str)
    }

    pub fn get_pose(&self, name: &str) -> Result<Pose> {
        self.anchors
            .get(name)
            .map(|a| a.pose)
            .ok_or_else(|| ArError::NotFound(name.to_string()))
    }

    pub fn scene(&self) -> &SceneTree {
        &self.scene
    }

    /// Ask the provider for an anchor at `pose` and register it as `name`.
    pub fn create_anchor<P: ArProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        pose: Pose,
        name: &str,
    ) -> Result<EngineHandle> {
        self.check_new_name(name)?;
        let handle = provider.create_anchor(&pose).map_err(|e| match e {
            ArError::CreationFailed(_) => e,
            other => ArError::CreationFailed(other.to_string()),
        })?;
        self.insert(provider, name, handle, pose)?;
        tracing::debug!(name, %handle, "anchor created");
        Ok(handle)
    }

    /// Register an anchor the provider already holds (a resolved cloud anchor).
    pub fn insert_resolved<P: ArProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        name: &str,
        handle: EngineHandle,
        pose: Pose,
    ) -> Result<()> {
        self.check_new_name(name)?;
        self.insert(provider, name, handle, pose)
    }

    /// Placeholder names of in-flight resolves are reserved.
    fn check_new_name(&self, name: &str) -> Result<()> {
        if name.starts_with(TEMP_NAME_PREFIX) {
            return Err(ArError::InvalidCommand(format!(
                "anchor names starting with {TEMP_NAME_PREFIX:?} are reserved: {name}"
            )));
        }
        if self.anchors.contains_key(name) || self.scene.contains(name) {
            return Err(ArError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// True when `name` is taken by an anchor, a scene node or a cloud record.
    pub fn is_name_taken(&self, name: &str) -> bool {
        self.anchors.contains_key(name)
            || self.scene.contains(name)
            || self.cloud.contains_key(name)
    }

    fn insert<P: ArProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        name: &str,
        handle: EngineHandle,
        pose: Pose,
    ) -> Result<()> {
        self.scene.insert_anchor(name)?;
        provider.place_node(name, &pose);
        self.by_handle.insert(handle, name.to_string());
        self.anchors.insert(
            name.to_string(),
            LocalAnchor {
                name: name.to_string(),
                handle,
                pose,
                tracking_state: TrackingState::Tracking,
                stopped_since: None,
            },
        );
        Ok(())
    }

    /// Detach the anchor, its scene subtree and its cloud record.
    /// Unknown names are a no-op.
    pub fn remove_anchor<P: ArProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        name: &str,
    ) -> RemovalOutcome {
        let Some(anchor) = self.anchors.remove(name) else {
            tracing::debug!(name, "remove ignored: unknown anchor");
            return RemovalOutcome::Unknown;
        };
        provider.detach_anchor(anchor.handle);
        self.by_handle.remove(&anchor.handle);
        self.cloud.remove(name);

        let detached = self.scene.remove_subtree(name);
        for node in &detached {
            provider.remove_node(node);
        }
        tracing::debug!(name, nodes = detached.len(), "anchor removed");
        RemovalOutcome::Removed { detached }
    }

    /// Attach a named child node under an existing scene node.
    pub fn attach_node<P: ArProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        parent: &str,
        name: &str,
    ) -> Result<()> {
        let pose = self.root_pose(parent)?;
        self.scene.attach(parent, name)?;
        provider.place_node(name, &pose);
        Ok(())
    }

    /// Detach a child node and its subtree. Anchors must go through
    /// [`AnchorRegistry::remove_anchor`]; unknown names are a no-op.
    pub fn remove_node<P: ArProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        name: &str,
    ) -> Result<Vec<String>> {
        if self.anchors.contains_key(name) {
            return Err(ArError::InvalidCommand(format!(
                "'{name}' is an anchor; use removeAnchor"
            )));
        }
        let removed = self.scene.remove_subtree(name);
        for node in &removed {
            provider.remove_node(node);
        }
        Ok(removed)
    }

    pub fn select(&mut self, name: &str) -> Result<()> {
        self.scene.select(name)
    }

    pub fn clear_selection(&mut self) {
        self.scene.clear_selection();
    }

    /// Pose of the anchor at the root of `node`'s branch.
    fn root_pose(&self, node: &str) -> Result<Pose> {
        let mut id = self
            .scene
            .find(node)
            .ok_or_else(|| ArError::NotFound(node.to_string()))?;
        while let Some(parent) = self.scene.get(id).and_then(|n| n.parent) {
            id = parent;
        }
        let root = self
            .scene
            .get(id)
            .ok_or_else(|| ArError::NotFound(node.to_string()))?;
        self.get_pose(&root.name)
    }

    /// Apply the engine's tracking update for one anchor. Returns false when
    /// the handle is not one of ours.
    pub fn apply_update(&mut self, update: &AnchorUpdate, frame: u64) -> bool {
        let Some(name) = self.by_handle.get(&update.handle) else {
            return false;
        };
        let Some(anchor) = self.anchors.get_mut(name) else {
            return false;
        };
        anchor.pose = update.pose;
        match (anchor.tracking_state, update.tracking_state) {
            (TrackingState::Stopped, TrackingState::Stopped) => {}
            (_, TrackingState::Stopped) => anchor.stopped_since = Some(frame),
            _ => anchor.stopped_since = None,
        }
        anchor.tracking_state = update.tracking_state;
        true
    }

    /// Drop anchors that have been STOPPED for more than `grace` frames.
    pub fn expire_stopped<P: ArProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        frame: u64,
        grace: u64,
    ) -> Vec<String> {
        let mut expired: Vec<String> = self
            .anchors
            .values()
            .filter(|a| {
                a.stopped_since
                    .is_some_and(|since| frame.saturating_sub(since) > grace)
            })
            .map(|a| a.name.clone())
            .collect();
        expired.sort();
        for name in &expired {
            tracing::info!(name = %name, "anchor stopped tracking; releasing");
            self.remove_anchor(provider, name);
        }
        expired
    }

    /// Point `name` at `new_handle` and release the handle it had before.
    pub fn swap_handle<P: ArProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        name: &str,
        new_handle: EngineHandle,
    ) -> Result<EngineHandle> {
        let anchor = self
            .anchors
            .get_mut(name)
            .ok_or_else(|| ArError::NotFound(name.to_string()))?;
        let old = std::mem::replace(&mut anchor.handle, new_handle);
        self.by_handle.remove(&old);
        self.by_handle.insert(new_handle, name.to_string());
        if old != new_handle {
            provider.detach_anchor(old);
        }
        Ok(old)
    }

    pub fn cloud_record(&self, name: &str) -> Option<&CloudAnchorRecord> {
        self.cloud.get(name)
    }

    pub fn cloud_records(&self) -> impl Iterator<Item = &CloudAnchorRecord> {
        self.cloud.values()
    }

    pub(crate) fn cloud_record_mut(&mut self, name: &str) -> Option<&mut CloudAnchorRecord> {
        self.cloud.get_mut(name)
    }

    pub(crate) fn set_cloud_record(&mut self, record: CloudAnchorRecord) {
        self.cloud.insert(record.name.clone(), record);
    }

    pub(crate) fn remove_cloud_record(&mut self, name: &str) -> Option<CloudAnchorRecord> {
        self.cloud.remove(name)
    }

    /// Release every anchor, record and scene node at once.
    pub fn clear<P: ArProvider + ?Sized>(&mut self, provider: &mut P) {
        for anchor in self.anchors.values() {
            provider.detach_anchor(anchor.handle);
        }
        self.anchors.clear();
        self.by_handle.clear();
        self.cloud.clear();
        self.scene.clear();
    }
}
