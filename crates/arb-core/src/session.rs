//! The session: one owner for the registry, the cloud coordinator, the
//! tracked-entity reconcilers and the dispatcher.
//!
//! Every command and every frame goes through `&mut ArSession`, so all of
//! them run on whichever thread owns the session. Teardown happens in one
//! step in [`ArSession::dispose`]; afterwards every operation fails with
//! [`ArError::Disposed`].

use crate::cloud::{CloudOutcome, CloudSyncCoordinator};
use crate::codec;
use crate::config::SessionConfig;
use crate::dispatcher::{Event, EventDispatcher, HitDescriptor};
use crate::error::{ArError, Result};
use crate::pose::Pose;
use crate::provider::{ArProvider, Frame, HitTarget};
use crate::reconciler::{EntityReport, FaceAssets, TrackedEntities};
use crate::registry::{AnchorRegistry, RemovalOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created, `init` not yet received.
    Uninitialized,
    Running,
    Disposed,
}

/// Receives the rendered image of the next completed frame, or the reason
/// there will be none.
pub type SnapshotWaiter = Box<dyn FnOnce(Result<Vec<u8>>) + Send>;

/// What processing one frame did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub index: u64,
    pub entities: EntityReport,
    pub cloud: Vec<CloudOutcome>,
    /// Anchors dropped for staying STOPPED too long.
    pub expired: Vec<String>,
    pub snapshots_served: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TapOutcome {
    Node(String),
    Surfaces(usize),
    Nothing,
}

pub struct ArSession<P: ArProvider> {
    provider: P,
    lifecycle: Lifecycle,
    config: SessionConfig,
    registry: AnchorRegistry,
    coordinator: CloudSyncCoordinator,
    entities: TrackedEntities,
    dispatcher: EventDispatcher,
    assets: FaceAssets,
    camera: Option<Pose>,
    frame: u64,
    snapshot_waiters: Vec<SnapshotWaiter>,
}

impl<P: ArProvider> ArSession<P> {
    pub fn new(provider: P, dispatcher: EventDispatcher) -> Self {
        Self {
            provider,
            lifecycle: Lifecycle::Uninitialized,
            config: SessionConfig::default(),
            registry: AnchorRegistry::new(),
            coordinator: CloudSyncCoordinator::new(),
            entities: TrackedEntities::new(),
            dispatcher,
            assets: FaceAssets::default(),
            camera: None,
            frame: 0,
            snapshot_waiters: Vec::new(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &AnchorRegistry {
        &self.registry
    }

    pub fn coordinator(&self) -> &CloudSyncCoordinator {
        &self.coordinator
    }

    pub fn entities(&self) -> &TrackedEntities {
        &self.entities
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    pub fn pending_snapshots(&self) -> usize {
        self.snapshot_waiters.len()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.lifecycle == Lifecycle::Disposed {
            return Err(ArError::Disposed);
        }
        Ok(())
    }

    /// Report a provider failure to the host as well as to the caller.
    fn surface(&mut self, error: ArError) -> ArError {
        let message = match &error {
            ArError::ProviderUnavailable(m) => m.clone(),
            other => other.to_string(),
        };
        self.dispatcher.dispatch(Event::error(message));
        error
    }

    // --- Commands ---

    pub fn init(&mut self, config: SessionConfig) -> Result<()> {
        self.ensure_live()?;
        if let Err(e) = self.provider.configure(&config) {
            return Err(self.surface(e));
        }
        tracing::info!(
            face_mesh = config.face_mesh,
            planes = u8::from(config.plane_detection_config),
            feature_points = config.show_feature_points,
            "session configured"
        );
        self.config = config;
        self.lifecycle = Lifecycle::Running;
        Ok(())
    }

    pub fn enable_cloud_mode(&mut self) -> Result<()> {
        self.ensure_live()?;
        if let Err(e) = self.provider.enable_cloud_anchors() {
            return Err(self.surface(e));
        }
        tracing::info!("cloud anchor mode enabled");
        Ok(())
    }

    /// Register face assets. Faces are (re)built on the next frame.
    pub fn load_mesh(&mut self, texture: &[u8], model: Option<String>) -> Result<()> {
        self.ensure_live()?;
        if texture.is_empty() {
            return Err(ArError::InvalidCommand("texture must not be empty".to_string()));
        }
        self.assets = FaceAssets {
            texture_revision: self.assets.texture_revision + 1,
            texture_len: texture.len(),
            model,
        };
        tracing::debug!(
            revision = self.assets.texture_revision,
            bytes = texture.len(),
            "face assets loaded"
        );
        Ok(())
    }

    /// Decode `transformation` and place an anchor named `name` there.
    pub fn create_anchor(&mut self, transformation: &[f64], name: &str) -> Result<()> {
        self.ensure_live()?;
        let pose = codec::decode(transformation)?;
        self.registry
            .create_anchor(&mut self.provider, pose, name)
            .map(|_| ())
    }

    pub fn remove_anchor(&mut self, name: &str) -> Result<RemovalOutcome> {
        self.ensure_live()?;
        self.coordinator.cancel_for(&mut self.provider, name);
        Ok(self.registry.remove_anchor(&mut self.provider, name))
    }

    pub fn host_anchor(&mut self, name: &str, ttl_seconds: Option<i64>) -> Result<()> {
        self.ensure_live()?;
        self.coordinator.host_anchor(
            &mut self.registry,
            &mut self.provider,
            name,
            ttl_seconds,
            self.frame,
        )
    }

    /// Start resolving `cloud_anchor_id`; returns the temporary name.
    pub fn resolve_anchor(&mut self, cloud_anchor_id: &str) -> Result<String> {
        self.ensure_live()?;
        self.coordinator.resolve_anchor(
            &mut self.registry,
            &mut self.provider,
            cloud_anchor_id,
            self.frame,
        )
    }

    pub fn register_downloaded_anchor(
        &mut self,
        temp_name: &str,
        reply: std::result::Result<String, String>,
    ) -> Result<()> {
        self.ensure_live()?;
        self.coordinator.register_download(
            &mut self.registry,
            &mut self.provider,
            temp_name,
            reply,
            &mut self.dispatcher,
        )
    }

    pub fn anchor_pose(&self, name: &str) -> Result<Pose> {
        self.ensure_live()?;
        self.registry.get_pose(name)
    }

    pub fn camera_pose(&self) -> Result<Pose> {
        self.ensure_live()?;
        if !self.provider.is_ready() {
            return Err(ArError::ProviderUnavailable("session is null".to_string()));
        }
        self.camera
            .or_else(|| self.provider.camera_pose())
            .ok_or_else(|| ArError::ProviderUnavailable("no camera frame yet".to_string()))
    }

    pub fn attach_node(&mut self, name: &str, anchor_name: &str) -> Result<()> {
        self.ensure_live()?;
        self.registry
            .attach_node(&mut self.provider, anchor_name, name)
    }

    pub fn remove_node(&mut self, name: &str) -> Result<Vec<String>> {
        self.ensure_live()?;
        self.registry.remove_node(&mut self.provider, name)
    }

    /// Hit test at normalized screen coordinates and tell the host what was
    /// touched.
    pub fn tap(&mut self, x: f64, y: f64) -> Result<TapOutcome> {
        self.ensure_live()?;
        let hits = self.provider.hit_test(x, y);

        if let Some(HitTarget::Node(name)) = hits.first().map(|h| &h.target) {
            let name = name.clone();
            if self.config.gestures_enabled() && self.registry.select(&name).is_err() {
                tracing::debug!(name = %name, "tapped node is not in the scene");
            }
            self.dispatcher.dispatch(Event::NodeTap { name: name.clone() });
            return Ok(TapOutcome::Node(name));
        }

        if !self.config.handle_taps {
            return Ok(TapOutcome::Nothing);
        }
        let descriptors: Vec<HitDescriptor> =
            hits.iter().filter_map(HitDescriptor::from_hit).collect();
        if descriptors.is_empty() {
            return Ok(TapOutcome::Nothing);
        }
        let count = descriptors.len();
        self.dispatcher
            .dispatch(Event::PlaneOrPointTap { hits: descriptors });
        Ok(TapOutcome::Surfaces(count))
    }

    /// Queue `waiter` for the image of the next processed frame.
    pub fn request_snapshot(&mut self, waiter: SnapshotWaiter) {
        if self.lifecycle == Lifecycle::Disposed {
            waiter(Err(ArError::Disposed));
            return;
        }
        self.snapshot_waiters.push(waiter);
    }

    // --- Frames ---

    /// Pull the next frame from the provider and process it. `Ok(None)` when
    /// the provider has no frame to give.
    pub fn advance(&mut self) -> Result<Option<FrameReport>> {
        self.ensure_live()?;
        match self.provider.next_frame() {
            Some(frame) => self.process_frame(frame).map(Some),
            None => Ok(None),
        }
    }

    /// Fold one sensor frame into the session.
    ///
    /// Anchor tracking updates land first, then cloud tasks are polled with
    /// the same updates, then tracked entities are reconciled. Failures of
    /// individual anchors surface as events and never abort the frame.
    pub fn process_frame(&mut self, frame: Frame) -> Result<FrameReport> {
        self.ensure_live()?;
        self.frame = frame.index;
        if frame.camera_pose.is_some() {
            self.camera = frame.camera_pose;
        }

        for update in &frame.updated_anchors {
            self.registry.apply_update(update, frame.index);
        }
        let cloud = self.coordinator.poll(
            &mut self.registry,
            &mut self.provider,
            &frame.updated_anchors,
            &mut self.dispatcher,
            frame.index,
        );
        let grace = self.provider.stopped_anchor_grace_frames();
        let expired = self
            .registry
            .expire_stopped(&mut self.provider, frame.index, grace);
        for name in &expired {
            self.coordinator.cancel_for(&mut self.provider, name);
        }

        let entities = self
            .entities
            .reconcile_frame(&frame, &self.config, &self.assets);

        if !self.config.gestures_enabled() {
            self.registry.clear_selection();
        }

        let snapshots_served = self.serve_snapshots(frame.rendered_image);

        Ok(FrameReport {
            index: frame.index,
            entities,
            cloud,
            expired,
            snapshots_served,
        })
    }

    fn serve_snapshots(&mut self, image: Option<Vec<u8>>) -> usize {
        let waiters = std::mem::take(&mut self.snapshot_waiters);
        let served = waiters.len();
        for waiter in waiters {
            match &image {
                Some(bytes) => waiter(Ok(bytes.clone())),
                None => waiter(Err(ArError::ProviderUnavailable(
                    "frame completed without an image".to_string(),
                ))),
            }
        }
        served
    }

    /// Tear the session down. Frames stop first, then every anchor, cloud
    /// record and tracked entity is released together. Idempotent.
    pub fn dispose(&mut self) {
        if self.lifecycle == Lifecycle::Disposed {
            return;
        }
        self.lifecycle = Lifecycle::Disposed;
        self.provider.stop_frames();

        for waiter in std::mem::take(&mut self.snapshot_waiters) {
            waiter(Err(ArError::Disposed));
        }
        self.coordinator.clear(&mut self.provider);
        self.entities.clear();
        self.registry.clear(&mut self.provider);
        self.provider.shutdown();
        self.dispatcher.detach();
        tracing::info!(
            sent = self.dispatcher.sent(),
            dropped = self.dispatcher.dropped(),
            "session disposed"
        );
    }
}
