//! Core -> host event push.
//!
//! Events are translated into [`OutboundMessage`]s and handed to an
//! [`OutboundChannel`]. Sending never blocks and never fails the caller: an
//! unavailable channel drops the event and leaves a diagnostic behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::codec::encode;
use crate::pose::Pose;
use crate::provider::{HitResult, HitTarget};

/// Outbound channel names, one per host-side manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    #[serde(rename = "arsession")]
    Session,
    #[serde(rename = "arobjects")]
    Objects,
    #[serde(rename = "aranchors")]
    Anchors,
}

/// Plane hits are type 1, feature point hits type 2.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HitDescriptor {
    #[serde(rename = "type")]
    pub kind: u8,
    pub transformation: Vec<f64>,
    pub distance: f64,
}

impl HitDescriptor {
    pub const PLANE: u8 = 1;
    pub const POINT: u8 = 2;

    /// Descriptor for plane and point hits; `None` for anything else.
    pub fn from_hit(hit: &HitResult) -> Option<Self> {
        let kind = match hit.target {
            HitTarget::Plane => Self::PLANE,
            HitTarget::Point => Self::POINT,
            HitTarget::Node(_) | HitTarget::Other => return None,
        };
        Some(Self {
            kind,
            transformation: encode(&hit.pose).to_vec(),
            distance: hit.distance,
        })
    }
}

/// Something the host should hear about.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Error {
        message: String,
    },
    NodeTap {
        name: String,
    },
    PlaneOrPointTap {
        hits: Vec<HitDescriptor>,
    },
    CloudAnchorUploaded {
        name: String,
        cloud_anchor_id: String,
    },
    /// The host answers with the permanent name for `temp_name`.
    AnchorDownloadSuccess {
        temp_name: String,
        cloud_anchor_id: String,
        pose: Pose,
    },
}

impl Event {
    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            message: message.into(),
        }
    }

    pub fn channel(&self) -> ChannelKind {
        match self {
            Event::Error { .. } | Event::PlaneOrPointTap { .. } => ChannelKind::Session,
            Event::NodeTap { .. } => ChannelKind::Objects,
            Event::CloudAnchorUploaded { .. } | Event::AnchorDownloadSuccess { .. } => {
                ChannelKind::Anchors
            }
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Event::Error { .. } => "onError",
            Event::NodeTap { .. } => "onNodeTap",
            Event::PlaneOrPointTap { .. } => "onPlaneOrPointTap",
            Event::CloudAnchorUploaded { .. } => "onCloudAnchorUploaded",
            Event::AnchorDownloadSuccess { .. } => "onAnchorDownloadSuccess",
        }
    }

    pub fn to_message(&self) -> OutboundMessage {
        let args = match self {
            Event::Error { message } => json!([message]),
            Event::NodeTap { name } => json!([name]),
            Event::PlaneOrPointTap { hits } => json!(hits),
            Event::CloudAnchorUploaded {
                name,
                cloud_anchor_id,
            } => json!({
                "name": name,
                "cloudanchorid": cloud_anchor_id,
            }),
            Event::AnchorDownloadSuccess {
                temp_name,
                cloud_anchor_id,
                pose,
            } => json!({
                "type": 0,
                "tempName": temp_name,
                "cloudanchorid": cloud_anchor_id,
                "transformation": encode(pose).to_vec(),
            }),
        };
        OutboundMessage {
            channel: self.channel(),
            method: self.method().to_string(),
            args,
        }
    }
}

/// One serialized push toward the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: ChannelKind,
    pub method: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Error)]
#[error("outbound channel unavailable: {0}")]
pub struct ChannelUnavailable(pub String);

/// Transport toward the host. Implementations must not block.
pub trait OutboundChannel {
    fn send(&self, message: OutboundMessage) -> Result<(), ChannelUnavailable>;
}

/// Routes domain events to the outbound channel.
pub struct EventDispatcher {
    channel: Option<Box<dyn OutboundChannel>>,
    sent: u64,
    dropped: u64,
    last_drop: Option<String>,
}

impl EventDispatcher {
    pub fn new(channel: Box<dyn OutboundChannel>) -> Self {
        Self {
            channel: Some(channel),
            sent: 0,
            dropped: 0,
            last_drop: None,
        }
    }

    /// A dispatcher with no channel; every event is dropped.
    pub fn detached() -> Self {
        Self {
            channel: None,
            sent: 0,
            dropped: 0,
            last_drop: None,
        }
    }

    pub fn attach(&mut self, channel: Box<dyn OutboundChannel>) {
        self.channel = Some(channel);
    }

    pub fn detach(&mut self) {
        self.channel = None;
    }

    pub fn dispatch(&mut self, event: Event) {
        let message = event.to_message();
        let result = match &self.channel {
            Some(channel) => channel.send(message),
            None => Err(ChannelUnavailable("no channel attached".to_string())),
        };
        match result {
            Ok(()) => {
                self.sent += 1;
                tracing::debug!(method = event.method(), "event dispatched");
            }
            Err(e) => {
                self.dropped += 1;
                tracing::warn!(method = event.method(), "dropping event: {e}");
                self.last_drop = Some(format!("{}: {e}", event.method()));
            }
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Diagnostic for the most recent dropped event.
    pub fn last_drop(&self) -> Option<&str> {
        self.last_drop.as_deref()
    }
}

/// In-memory channel that keeps every message; can be closed to simulate a
/// host that went away.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    messages: Arc<Mutex<Vec<OutboundMessage>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Drain everything received so far.
    pub fn take(&self) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .map(|mut m| std::mem::take(&mut *m))
            .unwrap_or_default()
    }

    pub fn methods(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.method).collect()
    }
}

impl OutboundChannel for RecordingChannel {
    fn send(&self, message: OutboundMessage) -> Result<(), ChannelUnavailable> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelUnavailable("channel closed".to_string()));
        }
        self.messages
            .lock()
            .map_err(|_| ChannelUnavailable("channel poisoned".to_string()))?
            .push(message);
        Ok(())
    }
}
