//! Append-only registry of the storage servers known to the naming server.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::api::{CommandStub, StorageStub};

/// Stub pair announced by one storage server at registration.
#[derive(Clone)]
pub struct StorageEntry {
    /// Data-plane handle handed to clients.
    pub client: StorageStub,
    /// Control-plane handle used by the naming server.
    pub command: CommandStub,
}

/// Ordered list of registered servers.
///
/// Entries are appended under the root's exclusive lock and never
/// removed, so a replica index stored in a file node permanently
/// identifies the same server.
pub struct Registry {
    entries: RwLock<Vec<StorageEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { entries: RwLock::new(Vec::new()) }
    }

    /// Number of registered servers.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Snapshot of the entry at `index`.
    pub async fn entry(&self, index: usize) -> Option<StorageEntry> {
        self.entries.read().await.get(index).cloned()
    }

    /// True when either stub is already registered.
    pub async fn knows(&self, client: &StorageStub, command: &CommandStub) -> bool {
        let entries = self.entries.read().await;
        entries.iter().any(|entry| {
            Arc::ptr_eq(&entry.client, client) || Arc::ptr_eq(&entry.command, command)
        })
    }

    /// Appends a stub pair, returning its permanent index.
    pub async fn append(&self, client: StorageStub, command: CommandStub) -> usize {
        let mut entries = self.entries.write().await;
        entries.push(StorageEntry { client, command });
        entries.len() - 1
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
