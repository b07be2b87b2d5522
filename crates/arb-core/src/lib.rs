//! arbridge anchor core.
//!
//! Keeps the scene state of an AR session consistent: named anchors and the
//! scene nodes they root, cloud host/resolve operations sampled once per
//! frame, per-frame reconciliation of tracked faces, planes and feature
//! points, and the events pushed back to the host.
//!
//! Zero I/O. The vendor engine sits behind [`ArProvider`]; the host channel
//! sits behind [`OutboundChannel`].

pub mod cloud;
pub mod codec;
pub mod command;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod pose;
pub mod provider;
pub mod quaternion;
pub mod reconciler;
pub mod registry;
pub mod scene;
pub mod session;
pub mod simulated;
pub mod time;
pub mod tracking;

pub use cloud::{
    CloudAnchorRecord, CloudError, CloudOutcome, CloudState, CloudSyncCoordinator, CloudTaskKind,
    PendingDownload,
};
pub use codec::{decode, decode_transform, encode, encode_transform};
pub use command::{Command, Request, Response, WireError, encode_image};
pub use config::{PlaneDetection, SessionConfig};
pub use constants::{MATRIX_LEN, MAX_TTL_SECONDS, MIN_TTL_SECONDS, TEMP_NAME_PREFIX};
pub use dispatcher::{
    ChannelKind, ChannelUnavailable, Event, EventDispatcher, HitDescriptor, OutboundChannel,
    OutboundMessage, RecordingChannel,
};
pub use error::{ArError, Result};
pub use pose::{Pose, Transform};
pub use provider::{AnchorUpdate, ArProvider, EngineHandle, Frame, HitResult, HitTarget};
pub use quaternion::Quaternion;
pub use reconciler::{
    Derived, EntityReport, FaceAssets, FrameDiff, Reconciler, TrackedEntities,
};
pub use registry::{AnchorRegistry, LocalAnchor, RemovalOutcome};
pub use scene::{NodeKind, SceneTree};
pub use session::{ArSession, FrameReport, Lifecycle, SnapshotWaiter, TapOutcome};
pub use simulated::{SeededCloudAnchor, SimulatedProvider, SimulationConfig};
pub use time::Timestamp;
pub use tracking::{
    EntityId, PlaneOrientation, Trackable, TrackedFace, TrackedPlane, TrackedPoint,
    TrackingState,
};
