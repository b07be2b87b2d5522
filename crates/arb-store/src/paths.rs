//! Where the bridge keeps its ledger and configuration.

use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::error::{Result, StoreError};

pub const DATA_DIR_ENV: &str = "ARB_DATA_DIR";
pub const LEDGER_FILE: &str = "anchors.db";
pub const CONFIG_FILE: &str = "arb.toml";

/// Default base directory, `~/.arbridge`.
pub fn default_base_dir() -> PathBuf {
    home_dir().join(".arbridge")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataDir {
    base: PathBuf,
}

impl DataDir {
    /// Explicit path, then `ARB_DATA_DIR`, then the default.
    pub fn resolve(explicit: Option<&Path>) -> Self {
        let base = explicit
            .map(PathBuf::from)
            .or_else(|| env::var(DATA_DIR_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(default_base_dir);
        Self { base }
    }

    pub fn at(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.base.join(LEDGER_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.base.join(CONFIG_FILE)
    }

    /// Create the directory if it does not exist yet.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.base).map_err(|source| StoreError::Io {
            path: self.base.clone(),
            source,
        })
    }
}
