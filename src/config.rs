//! Cluster configuration loaded from TOML files.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{map_io_error, DfsError, DfsResult};
use crate::naming::DEFAULT_REPLICATION_THRESHOLD;

/// Naming server tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct NamingConfig {
    /// Shared locks of a file accumulated before another replica is made.
    #[serde(default = "default_replication_threshold")]
    pub replication_threshold: u32,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self { replication_threshold: DEFAULT_REPLICATION_THRESHOLD }
    }
}

fn default_replication_threshold() -> u32 {
    DEFAULT_REPLICATION_THRESHOLD
}

/// One storage host.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory the host serves files from.
    pub root: PathBuf,
}

/// Whole-cluster description.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub storage: Vec<StorageConfig>,
}

impl ClusterConfig {
    /// Reads and parses a TOML cluster description.
    pub async fn load(path: &Path) -> DfsResult<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(map_io_error)?;
        toml::from_str(&raw).map_err(|_| DfsError::Argument)
    }
}
