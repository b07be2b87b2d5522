//! Cloud anchor host/resolve coordination.
//!
//! Provider network work runs off the owning thread; the coordinator only
//! learns about it through [`CloudSyncCoordinator::poll`], called once per
//! frame with that frame's anchor updates. Results are applied to the
//! registry there and nowhere else.

use std::collections::HashMap;
use std::fmt;

use crate::constants::{PENDING_DOWNLOAD_TIMEOUT_FRAMES, TEMP_NAME_PREFIX};
use crate::dispatcher::{Event, EventDispatcher};
use crate::error::{ArError, Result};
use crate::pose::Pose;
use crate::provider::{AnchorUpdate, ArProvider, EngineHandle};
use crate::registry::AnchorRegistry;

/// Terminal failure reported by the remote anchor service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloudError {
    Internal,
    NotAuthorized,
    ServiceUnavailable,
    ResourceExhausted,
    HostingDatasetProcessingFailed,
    CloudIdNotFound,
    ResolvingSdkVersionTooOld,
    ResolvingSdkVersionTooNew,
    HostingServiceUnavailable,
}

impl CloudError {
    pub fn as_str(self) -> &'static str {
        match self {
            CloudError::Internal => "ERROR_INTERNAL",
            CloudError::NotAuthorized => "ERROR_NOT_AUTHORIZED",
            CloudError::ServiceUnavailable => "ERROR_SERVICE_UNAVAILABLE",
            CloudError::ResourceExhausted => "ERROR_RESOURCE_EXHAUSTED",
            CloudError::HostingDatasetProcessingFailed => {
                "ERROR_HOSTING_DATASET_PROCESSING_FAILED"
            }
            CloudError::CloudIdNotFound => "ERROR_CLOUD_ID_NOT_FOUND",
            CloudError::ResolvingSdkVersionTooOld => "ERROR_RESOLVING_SDK_VERSION_TOO_OLD",
            CloudError::ResolvingSdkVersionTooNew => "ERROR_RESOLVING_SDK_VERSION_TOO_NEW",
            CloudError::HostingServiceUnavailable => "ERROR_HOSTING_SERVICE_UNAVAILABLE",
        }
    }
}

/// Per-anchor cloud operation state: `None -> TaskInProgress -> {Success, Error}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CloudState {
    #[default]
    None,
    TaskInProgress,
    Success,
    Error(CloudError),
}

impl CloudState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CloudState::Success | CloudState::Error(_))
    }

    pub fn is_error(self) -> bool {
        matches!(self, CloudState::Error(_))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CloudState::None => "NONE",
            CloudState::TaskInProgress => "TASK_IN_PROGRESS",
            CloudState::Success => "SUCCESS",
            CloudState::Error(e) => e.as_str(),
        }
    }
}

impl fmt::Display for CloudState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloud side of an anchor, joined to its LocalAnchor by `name`.
#[derive(Clone, Debug, PartialEq)]
pub struct CloudAnchorRecord {
    pub name: String,
    pub cloud_anchor_id: Option<String>,
    pub state: CloudState,
    /// Requested lifetime for uploads; `None` for resolves and default TTLs.
    pub ttl_seconds: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CloudTaskKind {
    Host { ttl_seconds: Option<u32> },
    Resolve { cloud_anchor_id: String },
}

#[derive(Clone, Debug)]
struct CloudTask {
    name: String,
    kind: CloudTaskKind,
    started_frame: u64,
}

/// A resolved anchor waiting for the host to name it.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingDownload {
    pub temp_name: String,
    pub handle: EngineHandle,
    pub cloud_anchor_id: String,
    pub pose: Pose,
    /// Frame at which the resolve finished.
    pub resolved_frame: u64,
}

/// Terminal result observed by one [`CloudSyncCoordinator::poll`].
#[derive(Clone, Debug, PartialEq)]
pub struct CloudOutcome {
    pub name: String,
    pub kind: CloudTaskKind,
    pub state: CloudState,
}

impl CloudOutcome {
    /// The failure as an error value, for terminal ERROR outcomes.
    pub fn as_error(&self) -> Option<ArError> {
        self.state.is_error().then(|| ArError::RemoteOperationFailed {
            name: self.name.clone(),
            state: self.state,
        })
    }
}

#[derive(Debug, Default)]
pub struct CloudSyncCoordinator {
    tasks: HashMap<EngineHandle, CloudTask>,
    awaiting_name: HashMap<String, PendingDownload>,
    next_temp: u64,
}

impl CloudSyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of host/resolve operations still waiting on the provider.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn pending_download(&self, temp_name: &str) -> Option<&PendingDownload> {
        self.awaiting_name.get(temp_name)
    }

    /// Start uploading the LocalAnchor `name`.
    pub fn host_anchor<P: ArProvider + ?Sized>(
        &mut self,
        registry: &mut AnchorRegistry,
        provider: &mut P,
        name: &str,
        ttl_seconds: Option<i64>,
        frame: u64,
    ) -> Result<()> {
        ensure_cloud_mode(provider)?;
        let handle = registry
            .handle_of(name)
            .ok_or_else(|| ArError::NotFound(name.to_string()))?;
        if registry
            .cloud_record(name)
            .is_some_and(|r| r.state == CloudState::TaskInProgress)
        {
            return Err(ArError::OperationAlreadyInFlight(name.to_string()));
        }

        let ttl = match ttl_seconds {
            Some(raw) => Some(validate_ttl(provider, raw)?),
            None => None,
        };

        let task_handle = provider.host_cloud_anchor(handle, ttl)?;
        registry.set_cloud_record(CloudAnchorRecord {
            name: name.to_string(),
            cloud_anchor_id: None,
            state: CloudState::TaskInProgress,
            ttl_seconds: ttl,
        });
        self.tasks.insert(
            task_handle,
            CloudTask {
                name: name.to_string(),
                kind: CloudTaskKind::Host { ttl_seconds: ttl },
                started_frame: frame,
            },
        );
        tracing::info!(name, ?ttl, "hosting cloud anchor");
        Ok(())
    }

    /// Start resolving `cloud_anchor_id`. Returns the temporary name the
    /// placeholder record is kept under until the host names the anchor.
    pub fn resolve_anchor<P: ArProvider + ?Sized>(
        &mut self,
        registry: &mut AnchorRegistry,
        provider: &mut P,
        cloud_anchor_id: &str,
        frame: u64,
    ) -> Result<String> {
        ensure_cloud_mode(provider)?;
        if cloud_anchor_id.trim().is_empty() {
            return Err(ArError::InvalidCommand(
                "cloud anchor id must not be empty".to_string(),
            ));
        }
        let already = self.tasks.values().any(|t| {
            matches!(&t.kind, CloudTaskKind::Resolve { cloud_anchor_id: id } if id == cloud_anchor_id)
        });
        if already {
            return Err(ArError::OperationAlreadyInFlight(cloud_anchor_id.to_string()));
        }

        let task_handle = provider.resolve_cloud_anchor(cloud_anchor_id)?;
        let temp_name = self.next_temp_name(registry);
        registry.set_cloud_record(CloudAnchorRecord {
            name: temp_name.clone(),
            cloud_anchor_id: Some(cloud_anchor_id.to_string()),
            state: CloudState::TaskInProgress,
            ttl_seconds: None,
        });
        self.tasks.insert(
            task_handle,
            CloudTask {
                name: temp_name.clone(),
                kind: CloudTaskKind::Resolve {
                    cloud_anchor_id: cloud_anchor_id.to_string(),
                },
                started_frame: frame,
            },
        );
        tracing::info!(cloud_anchor_id, temp_name = %temp_name, "resolving cloud anchor");
        Ok(temp_name)
    }

    fn next_temp_name(&mut self, registry: &AnchorRegistry) -> String {
        loop {
            self.next_temp += 1;
            let candidate = format!("{TEMP_NAME_PREFIX}{}", self.next_temp);
            let taken =
                registry.is_name_taken(&candidate) || self.awaiting_name.contains_key(&candidate);
            if !taken {
                return candidate;
            }
        }
    }

    /// Advance in-flight operations touched by this frame's anchor updates.
    ///
    /// A failed operation is reported and never retried, nor does it stop the
    /// remaining updates from being processed. A failed upload keeps its
    /// ERROR record; a failed resolve drops its placeholder. Resolved anchors
    /// the host has not named within [`PENDING_DOWNLOAD_TIMEOUT_FRAMES`] are
    /// released.
    pub fn poll<P: ArProvider + ?Sized>(
        &mut self,
        registry: &mut AnchorRegistry,
        provider: &mut P,
        updates: &[AnchorUpdate],
        dispatcher: &mut EventDispatcher,
        frame: u64,
    ) -> Vec<CloudOutcome> {
        let mut outcomes = Vec::new();
        for update in updates {
            if !self.tasks.contains_key(&update.handle) {
                continue;
            }
            let state = provider.cloud_state(update.handle);
            if !state.is_terminal() {
                continue;
            }
            let Some(task) = self.tasks.remove(&update.handle) else {
                continue;
            };
            tracing::debug!(
                name = %task.name,
                %state,
                frames = frame.saturating_sub(task.started_frame),
                "cloud task finished"
            );

            match (&task.kind, state) {
                (CloudTaskKind::Host { .. }, CloudState::Success) => {
                    self.finish_host(registry, provider, &task, update.handle, dispatcher);
                }
                (CloudTaskKind::Resolve { cloud_anchor_id }, CloudState::Success) => {
                    let pose = provider.anchor_pose(update.handle).unwrap_or(update.pose);
                    if let Some(record) = registry.cloud_record_mut(&task.name) {
                        record.state = CloudState::Success;
                    }
                    self.awaiting_name.insert(
                        task.name.clone(),
                        PendingDownload {
                            temp_name: task.name.clone(),
                            handle: update.handle,
                            cloud_anchor_id: cloud_anchor_id.clone(),
                            pose,
                            resolved_frame: frame,
                        },
                    );
                    dispatcher.dispatch(Event::AnchorDownloadSuccess {
                        temp_name: task.name.clone(),
                        cloud_anchor_id: cloud_anchor_id.clone(),
                        pose,
                    });
                }
                (kind, state) => {
                    provider.detach_anchor(update.handle);
                    let verb = match kind {
                        CloudTaskKind::Host { .. } => {
                            if let Some(record) = registry.cloud_record_mut(&task.name) {
                                record.state = state;
                            }
                            "uploading"
                        }
                        CloudTaskKind::Resolve { .. } => {
                            registry.remove_cloud_record(&task.name);
                            "downloading"
                        }
                    };
                    tracing::warn!(name = %task.name, %state, "cloud {verb} failed");
                    dispatcher.dispatch(Event::error(format!(
                        "Error {verb} anchor, state {state}"
                    )));
                }
            }

            outcomes.push(CloudOutcome {
                name: task.name,
                kind: task.kind,
                state,
            });
        }
        self.expire_unclaimed(registry, provider, dispatcher, frame);
        outcomes
    }

    fn expire_unclaimed<P: ArProvider + ?Sized>(
        &mut self,
        registry: &mut AnchorRegistry,
        provider: &mut P,
        dispatcher: &mut EventDispatcher,
        frame: u64,
    ) {
        let mut stale: Vec<String> = self
            .awaiting_name
            .values()
            .filter(|p| frame.saturating_sub(p.resolved_frame) > PENDING_DOWNLOAD_TIMEOUT_FRAMES)
            .map(|p| p.temp_name.clone())
            .collect();
        stale.sort();
        for temp_name in stale {
            let Some(pending) = self.awaiting_name.remove(&temp_name) else {
                continue;
            };
            provider.detach_anchor(pending.handle);
            registry.remove_cloud_record(&temp_name);
            tracing::warn!(temp_name = %temp_name, "downloaded anchor never named; releasing");
            dispatcher.dispatch(Event::error(format!(
                "Error while registering downloaded anchor: {temp_name} was not named \
                 within {PENDING_DOWNLOAD_TIMEOUT_FRAMES} frames"
            )));
        }
    }

    fn finish_host<P: ArProvider + ?Sized>(
        &mut self,
        registry: &mut AnchorRegistry,
        provider: &mut P,
        task: &CloudTask,
        hosted: EngineHandle,
        dispatcher: &mut EventDispatcher,
    ) {
        if !registry.contains(&task.name) {
            tracing::warn!(name = %task.name, "hosted anchor was removed mid-upload");
            provider.detach_anchor(hosted);
            return;
        }
        let cloud_anchor_id = provider.cloud_anchor_id(hosted).unwrap_or_default();
        if let Err(e) = registry.swap_handle(provider, &task.name, hosted) {
            tracing::warn!(name = %task.name, "swap after upload failed: {e}");
            provider.detach_anchor(hosted);
            return;
        }
        if let Some(record) = registry.cloud_record_mut(&task.name) {
            record.state = CloudState::Success;
            record.cloud_anchor_id = Some(cloud_anchor_id.clone());
        }
        dispatcher.dispatch(Event::CloudAnchorUploaded {
            name: task.name.clone(),
            cloud_anchor_id,
        });
    }

    /// Apply the host's reply to `onAnchorDownloadSuccess`: either the
    /// permanent name for the resolved anchor, or the host's error.
    pub fn register_download<P: ArProvider + ?Sized>(
        &mut self,
        registry: &mut AnchorRegistry,
        provider: &mut P,
        temp_name: &str,
        reply: std::result::Result<String, String>,
        dispatcher: &mut EventDispatcher,
    ) -> Result<()> {
        let pending = self
            .awaiting_name
            .remove(temp_name)
            .ok_or_else(|| ArError::NotFound(temp_name.to_string()))?;
        registry.remove_cloud_record(temp_name);

        let name = match reply {
            Ok(name) => name,
            Err(message) => {
                provider.detach_anchor(pending.handle);
                dispatcher.dispatch(Event::error(format!(
                    "Error while registering downloaded anchor: {message}"
                )));
                return Ok(());
            }
        };

        if let Err(e) = registry.insert_resolved(provider, &name, pending.handle, pending.pose) {
            provider.detach_anchor(pending.handle);
            dispatcher.dispatch(Event::error(format!(
                "Error while registering downloaded anchor: {e}"
            )));
            return Err(e);
        }
        registry.set_cloud_record(CloudAnchorRecord {
            name: name.clone(),
            cloud_anchor_id: Some(pending.cloud_anchor_id),
            state: CloudState::Success,
            ttl_seconds: None,
        });
        tracing::info!(temp_name, name = %name, "downloaded anchor registered");
        Ok(())
    }

    /// Abandon any in-flight upload for `name` and release its engine anchor.
    pub fn cancel_for<P: ArProvider + ?Sized>(&mut self, provider: &mut P, name: &str) {
        let handles: Vec<EngineHandle> = self
            .tasks
            .iter()
            .filter(|(_, t)| t.name == name)
            .map(|(h, _)| *h)
            .collect();
        for handle in handles {
            self.tasks.remove(&handle);
            provider.detach_anchor(handle);
            tracing::debug!(name, %handle, "cloud task cancelled");
        }
    }

    /// Release every in-flight and unclaimed engine anchor.
    pub fn clear<P: ArProvider + ?Sized>(&mut self, provider: &mut P) {
        for handle in self.tasks.keys() {
            provider.detach_anchor(*handle);
        }
        for pending in self.awaiting_name.values() {
            provider.detach_anchor(pending.handle);
        }
        self.tasks.clear();
        self.awaiting_name.clear();
    }
}

fn ensure_cloud_mode<P: ArProvider + ?Sized>(provider: &P) -> Result<()> {
    if !provider.is_ready() {
        return Err(ArError::ProviderUnavailable("session is null".to_string()));
    }
    if !provider.cloud_anchors_enabled() {
        return Err(ArError::ProviderUnavailable(
            "cloud anchor mode is not enabled".to_string(),
        ));
    }
    Ok(())
}

fn validate_ttl<P: ArProvider + ?Sized>(provider: &P, raw: i64) -> Result<u32> {
    let range = provider.ttl_range();
    u32::try_from(raw)
        .ok()
        .filter(|ttl| range.contains(ttl))
        .ok_or(ArError::InvalidTtl {
            ttl: raw,
            min: *range.start(),
            max: *range.end(),
        })
}
