//! Session owner shared by `serve` and `script`.
//!
//! Owns the [`ArSession`], the hosted-anchor ledger and the receiving end of
//! the event channel. Uploads reported by the session are written to the
//! ledger as their events are drained.

use anyhow::{Context, Result};
use arb_core::{
    ArSession, ChannelUnavailable, Command, EventDispatcher, OutboundChannel, OutboundMessage,
    Request, Response, SimulatedProvider, SnapshotWaiter, Timestamp,
};
use arb_store::{BridgeConfig, DataDir, HostedAnchor, Store};
use serde::Serialize;
use tokio::sync::mpsc;

const UPLOADED_METHOD: &str = "onCloudAnchorUploaded";

/// One JSON line for stdout. Serialization failures are logged and skipped.
pub fn encode_line<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(line) => Some(line),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize outbound line");
            None
        }
    }
}

/// Event transport into the host's queue.
pub struct EventSink(mpsc::UnboundedSender<OutboundMessage>);

impl OutboundChannel for EventSink {
    fn send(&self, message: OutboundMessage) -> Result<(), ChannelUnavailable> {
        self.0
            .send(message)
            .map_err(|_| ChannelUnavailable("event queue closed".to_string()))
    }
}

/// What one request produced, in the order it should be written out.
pub enum Handled {
    /// Events emitted while running the command, then its response.
    Reply {
        events: Vec<OutboundMessage>,
        response: Response,
    },
    /// A snapshot was requested; the reply arrives through the waiter.
    Snapshot { id: u64 },
}

pub struct Host {
    session: ArSession<SimulatedProvider>,
    store: Store,
    events: mpsc::UnboundedReceiver<OutboundMessage>,
    session_id: String,
}

impl Host {
    /// Open the ledger, seed the simulated remote catalog and apply the
    /// configured session defaults.
    pub fn open(data_dir: &DataDir, config: &BridgeConfig) -> Result<Self> {
        data_dir.ensure().context("failed to create data directory")?;
        let store = Store::open(&data_dir.ledger_path()).context("failed to open ledger")?;
        Self::with_store(store, config)
    }

    pub fn with_store(store: Store, config: &BridgeConfig) -> Result<Self> {
        let now = Timestamp::now();
        store
            .purge_expired(now)
            .context("failed to purge expired ledger entries")?;

        let mut provider = SimulatedProvider::new(config.simulation.clone());
        let hosted = store.list_hosted(now).context("failed to read ledger")?;
        for anchor in &hosted {
            provider.seed_cloud_anchor(&anchor.cloud_anchor_id, anchor.pose);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher::new(Box::new(EventSink(tx)));
        let session = ArSession::new(provider, dispatcher);
        let session_id = uuid::Uuid::new_v4().to_string();
        store
            .set_metadata("last_session", &session_id)
            .context("failed to write session metadata")?;

        let mut host = Self {
            session,
            store,
            events: rx,
            session_id,
        };
        // A provider that is not ready yet is not fatal; the host's own
        // `init` reports it.
        if let Err(e) = host.session.init(config.session.clone()) {
            tracing::warn!(error = %e, "default session configuration rejected");
        }
        host.drain_events();
        tracing::info!(
            session = %host.session_id,
            seeded = hosted.len() + config.simulation.cloud_anchors.len(),
            "host ready"
        );
        Ok(host)
    }

    pub fn session(&self) -> &ArSession<SimulatedProvider> {
        &self.session
    }

    #[cfg(test)]
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_disposed(&self) -> bool {
        self.session.lifecycle() == arb_core::Lifecycle::Disposed
    }

    /// Run one request. Snapshots are handed back to the caller, which owns
    /// the waiting.
    pub fn handle(&mut self, request: Request) -> Handled {
        let command = match Command::parse(&request.method, request.args) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(method = %request.method, error = %e, "rejected request");
                return Handled::Reply {
                    events: self.drain_events(),
                    response: Response::err(request.id, &e),
                };
            }
        };
        if matches!(command, Command::Snapshot) {
            return Handled::Snapshot { id: request.id };
        }
        let result = self.session.execute(command);
        Handled::Reply {
            events: self.drain_events(),
            response: Response::from_result(request.id, result),
        }
    }

    pub fn request_snapshot(&mut self, waiter: SnapshotWaiter) {
        self.session.request_snapshot(waiter);
    }

    /// Process one frame on the cadence. Returns the events it produced.
    pub fn tick(&mut self) -> Vec<OutboundMessage> {
        if self.is_disposed() {
            return Vec::new();
        }
        match self.session.advance() {
            Ok(Some(report)) => {
                tracing::debug!(
                    frame = report.index,
                    cloud = report.cloud.len(),
                    expired = report.expired.len(),
                    "frame processed"
                );
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, "frame skipped"),
        }
        self.drain_events()
    }

    /// Everything queued on the event channel so far. Uploads are recorded in
    /// the ledger on the way out.
    pub fn drain_events(&mut self) -> Vec<OutboundMessage> {
        let mut drained = Vec::new();
        while let Ok(message) = self.events.try_recv() {
            if message.method == UPLOADED_METHOD {
                self.record_upload(&message);
            }
            drained.push(message);
        }
        drained
    }

    fn record_upload(&self, message: &OutboundMessage) {
        let (Some(name), Some(cloud_anchor_id)) = (
            message.args["name"].as_str(),
            message.args["cloudanchorid"].as_str(),
        ) else {
            tracing::warn!("upload event without name or cloud anchor id");
            return;
        };
        let registry = self.session.registry();
        let Ok(pose) = registry.get_pose(name) else {
            tracing::warn!(name, "uploaded anchor no longer registered, not recorded");
            return;
        };
        let ttl_seconds = registry.cloud_record(name).and_then(|r| r.ttl_seconds);
        let anchor = HostedAnchor::new(name, cloud_anchor_id, ttl_seconds, pose, Timestamp::now());
        if let Err(e) = self.store.record_hosted(&anchor) {
            tracing::error!(name, error = %e, "failed to record hosted anchor");
        }
    }

    /// Dispose the session and flush the ledger. Returns the final events.
    pub fn shutdown(&mut self) -> Vec<OutboundMessage> {
        self.session.dispose();
        let events = self.drain_events();
        if let Err(e) = self.store.checkpoint_truncate() {
            tracing::error!(error = %e, "ledger checkpoint failed");
        }
        events
    }
}
