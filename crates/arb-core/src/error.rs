use thiserror::Error;

use crate::cloud::CloudState;

/// Every failure the anchor core can report.
///
/// Local validation failures come back synchronously from the operation that
/// caused them. Provider and remote failures are also pushed to the host as
/// `onError` events and never interrupt frame processing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArError {
    #[error("no anchor named '{0}'")]
    NotFound(String),

    #[error("an anchor named '{0}' already exists")]
    DuplicateName(String),

    #[error("malformed transform: {0}")]
    MalformedTransform(String),

    #[error("a cloud operation for '{0}' is already in flight")]
    OperationAlreadyInFlight(String),

    #[error("ttl {ttl} outside accepted range {min}..={max} seconds")]
    InvalidTtl { ttl: i64, min: u32, max: u32 },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("cloud operation for '{name}' failed with state {state}")]
    RemoteOperationFailed { name: String, state: CloudState },

    #[error("provider could not create anchor: {0}")]
    CreationFailed(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("session has been disposed")]
    Disposed,
}

impl ArError {
    /// Stable identifier carried in bridge error replies.
    pub fn kind(&self) -> &'static str {
        match self {
            ArError::NotFound(_) => "NotFound",
            ArError::DuplicateName(_) => "DuplicateName",
            ArError::MalformedTransform(_) => "MalformedTransform",
            ArError::OperationAlreadyInFlight(_) => "OperationAlreadyInFlight",
            ArError::InvalidTtl { .. } => "InvalidTtl",
            ArError::ProviderUnavailable(_) => "ProviderUnavailable",
            ArError::RemoteOperationFailed { .. } => "RemoteOperationFailed",
            ArError::CreationFailed(_) => "CreationFailed",
            ArError::InvalidCommand(_) => "InvalidCommand",
            ArError::Disposed => "Disposed",
        }
    }
}

pub type Result<T> = std::result::Result<T, ArError>;
