//! Persistence for the arbridge host: the SQLite ledger of hosted cloud
//! anchors and the TOML bridge configuration.

pub mod config;
pub mod error;
pub mod paths;
pub mod schema;
pub mod store;

pub use config::{BridgeConfig, BridgeSection};
pub use error::{Result, StoreError};
pub use paths::{DataDir, default_base_dir};
pub use store::{HostedAnchor, Store};
