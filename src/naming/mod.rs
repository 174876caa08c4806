//! Naming server: tree metadata, hierarchical locking, replication
//! bookkeeping, and storage-server registration.

mod registry;

pub use registry::{Registry, StorageEntry};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::api::{CommandStub, Registration, Service, StorageStub};
use crate::config::NamingConfig;
use crate::error::{DfsError, DfsResult};
use crate::node::{Node, NodeKind};
use crate::path::DfsPath;

/// Shared locks of a file accumulated before another replica is made.
pub const DEFAULT_REPLICATION_THRESHOLD: u32 = 20;

/// Metadata engine owning the directory tree and the storage registry.
///
/// Lock acquisition walks every path root to target, so the global order
/// of acquisitions matches the tree's partial order and concurrent
/// clients cannot deadlock on overlapping paths.
pub struct NamingServer {
    root: Arc<Node>,
    registry: Registry,
    next_host: AtomicUsize,
    replication_threshold: u32,
}

impl NamingServer {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_REPLICATION_THRESHOLD)
    }

    /// Engine with a custom read-replication threshold.
    pub fn with_threshold(replication_threshold: u32) -> Self {
        Self {
            root: Node::directory(),
            registry: Registry::new(),
            next_host: AtomicUsize::new(0),
            replication_threshold,
        }
    }

    pub fn with_config(config: &NamingConfig) -> Self {
        Self::with_threshold(config.replication_threshold)
    }

    /// Number of registered storage servers.
    pub async fn storage_count(&self) -> usize {
        self.registry.len().await
    }

    /// Nodes on `path` in root-to-target order, the target last.
    async fn chain(&self, path: &DfsPath) -> DfsResult<Vec<Arc<Node>>> {
        let mut chain = vec![Arc::clone(&self.root)];
        let mut node = Arc::clone(&self.root);
        for component in path.components() {
            let next = node.child(component).await?;
            chain.push(Arc::clone(&next));
            node = next;
        }
        Ok(chain)
    }

    /// Acquires the hierarchical locks for `path`: every ancestor shared,
    /// the target in the requested mode. No replication side effects.
    async fn acquire_chain(&self, path: &DfsPath, exclusive: bool) -> DfsResult<Vec<Arc<Node>>> {
        let chain = self.chain(path).await?;
        let target = chain.len() - 1;
        for (depth, node) in chain.iter().enumerate() {
            node.lock().acquire(exclusive && depth == target).await;
        }
        Ok(chain)
    }

    /// Releases locks taken by [`Self::acquire_chain`]: the target first,
    /// then its ancestors back to the root.
    async fn release_chain(&self, chain: &[Arc<Node>], exclusive: bool) -> DfsResult<()> {
        let target = chain.len() - 1;
        for (depth, node) in chain.iter().enumerate().rev() {
            node.lock().release(exclusive && depth == target).await?;
        }
        Ok(())
    }

    /// Read-replication rule, run after a shared lock of a file.
    ///
    /// Every `replication_threshold`-th shared lock copies the file to the
    /// next unregistered-for-it server, when one exists.
    async fn note_shared_lock(&self, path: &DfsPath, node: &Arc<Node>) -> DfsResult<()> {
        let (replicas, reads) = match node.kind() {
            NodeKind::File { replicas, reads } => (replicas, reads),
            NodeKind::Directory { .. } => return Ok(()),
        };
        if reads.fetch_add(1, Ordering::SeqCst) + 1 != self.replication_threshold {
            return Ok(());
        }
        reads.store(0, Ordering::SeqCst);

        let total = self.registry.len().await;
        let (candidate, primary) = {
            let replicas = replicas.lock().await;
            if replicas.len() >= total {
                return Ok(());
            }
            // Indices equal registration order and are never removed, so
            // the replica count is the next unused index.
            (replicas.len(), replicas[0])
        };
        let target = self.registry.entry(candidate).await.ok_or(DfsError::State)?;
        let source = self.registry.entry(primary).await.ok_or(DfsError::State)?;
        if !target.command.copy(path, Arc::clone(&source.client)).await? {
            return Err(DfsError::State);
        }

        let mut replicas = replicas.lock().await;
        if !replicas.contains(&candidate) {
            replicas.push(candidate);
        }
        debug!(path = %path, replica = candidate, "file replicated");
        Ok(())
    }

    /// Write-invalidation rule, run after an exclusive lock of a file:
    /// only the primary replica survives.
    async fn note_exclusive_lock(&self, path: &DfsPath, node: &Arc<Node>) -> DfsResult<()> {
        let (replicas, reads) = match node.kind() {
            NodeKind::File { replicas, reads } => (replicas, reads),
            NodeKind::Directory { .. } => return Ok(()),
        };
        reads.store(0, Ordering::SeqCst);
        let extras = {
            let mut replicas = replicas.lock().await;
            replicas.split_off(1)
        };
        for index in extras {
            let entry = self.registry.entry(index).await.ok_or(DfsError::State)?;
            if !entry.command.delete(path).await? {
                return Err(DfsError::State);
            }
            debug!(path = %path, replica = index, "stale replica invalidated");
        }
        Ok(())
    }

    async fn create_file_locked(
        &self,
        path: &DfsPath,
        dir: &Arc<Node>,
        name: &str,
    ) -> DfsResult<bool> {
        let children = match dir.kind() {
            NodeKind::Directory { children } => children,
            NodeKind::File { .. } => return Err(DfsError::NotFound),
        };
        if children.lock().await.contains_key(name) {
            return Ok(false);
        }
        let total = self.registry.len().await;
        if total == 0 {
            return Err(DfsError::State);
        }
        let host = self.next_host.fetch_add(1, Ordering::SeqCst) % total;
        let entry = self.registry.entry(host).await.ok_or(DfsError::State)?;
        if !entry.command.create(path).await? {
            // The host already had bytes under this name; the tree entry
            // still points at it as the sole replica.
            warn!(path = %path, host, "storage host reported an existing file on create");
        }
        children.lock().await.insert(name.to_owned(), Node::file(host));
        Ok(true)
    }

    async fn create_directory_locked(&self, dir: &Arc<Node>, name: &str) -> DfsResult<bool> {
        let children = match dir.kind() {
            NodeKind::Directory { children } => children,
            NodeKind::File { .. } => return Err(DfsError::NotFound),
        };
        let mut children = children.lock().await;
        if children.contains_key(name) {
            return Ok(false);
        }
        children.insert(name.to_owned(), Node::directory());
        Ok(true)
    }

    async fn delete_locked(&self, path: &DfsPath, dir: &Arc<Node>, name: &str) -> DfsResult<bool> {
        let children = match dir.kind() {
            NodeKind::Directory { children } => children,
            NodeKind::File { .. } => return Err(DfsError::NotFound),
        };
        let child = children.lock().await.get(name).cloned().ok_or(DfsError::NotFound)?;

        let mut hosts = BTreeSet::new();
        for (_, file) in child.collect_files(path.clone()).await {
            if let NodeKind::File { replicas, .. } = file.kind() {
                hosts.extend(replicas.lock().await.iter().copied());
            }
        }
        let mut all_removed = true;
        for host in hosts {
            let entry = self.registry.entry(host).await.ok_or(DfsError::State)?;
            let removed = entry.command.delete(path).await?;
            if !removed {
                warn!(path = %path, host, "storage host failed to delete");
            }
            all_removed &= removed;
        }

        children.lock().await.remove(name);
        Ok(all_removed)
    }

    /// Walks `file`'s parent chain under the held root lock, creating
    /// missing directories, and inserts a file node for `replica`.
    /// Returns false when an existing entry blocks the insertion.
    async fn insert_registered(&self, file: &DfsPath, replica: usize) -> bool {
        let components: Vec<&str> = file.components().collect();
        let mut node = Arc::clone(&self.root);
        for component in &components[..components.len() - 1] {
            let next = match node.kind() {
                NodeKind::Directory { children } => {
                    let mut children = children.lock().await;
                    match children.get(*component) {
                        Some(child) => Arc::clone(child),
                        None => {
                            let child = Node::directory();
                            children.insert((*component).to_owned(), Arc::clone(&child));
                            child
                        }
                    }
                }
                // A file already owns this prefix.
                NodeKind::File { .. } => return false,
            };
            node = next;
        }
        match node.kind() {
            NodeKind::Directory { children } => {
                let mut children = children.lock().await;
                let name = components[components.len() - 1];
                if children.contains_key(name) {
                    return false;
                }
                children.insert(name.to_owned(), Node::file(replica));
                true
            }
            NodeKind::File { .. } => false,
        }
    }

    async fn register_locked(
        &self,
        client: StorageStub,
        command: CommandStub,
        files: Vec<DfsPath>,
    ) -> DfsResult<Vec<DfsPath>> {
        if self.registry.knows(&client, &command).await {
            return Err(DfsError::State);
        }
        let replica = self.registry.append(client, command).await;

        let mut duplicates = Vec::new();
        for file in files {
            if file.is_root() {
                continue;
            }
            if !self.insert_registered(&file, replica).await {
                duplicates.push(file);
            }
        }
        info!(replica, duplicates = duplicates.len(), "storage server registered");
        Ok(duplicates)
    }
}

impl Default for NamingServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service for NamingServer {
    async fn lock(&self, path: &DfsPath, exclusive: bool) -> DfsResult<()> {
        let chain = self.acquire_chain(path, exclusive).await?;
        let target = &chain[chain.len() - 1];
        let noted = if exclusive {
            self.note_exclusive_lock(path, target).await
        } else {
            self.note_shared_lock(path, target).await
        };
        if let Err(err) = noted {
            // The call failed as a whole; do not leave its locks behind.
            let _ = self.release_chain(&chain, exclusive).await;
            return Err(err);
        }
        Ok(())
    }

    async fn unlock(&self, path: &DfsPath, exclusive: bool) -> DfsResult<()> {
        let chain = self.chain(path).await.map_err(|_| DfsError::Argument)?;
        self.release_chain(&chain, exclusive).await
    }

    async fn is_directory(&self, path: &DfsPath) -> DfsResult<bool> {
        let chain = self.acquire_chain(path, false).await?;
        let result = chain[chain.len() - 1].is_directory();
        self.release_chain(&chain, false).await?;
        Ok(result)
    }

    async fn list(&self, directory: &DfsPath) -> DfsResult<Vec<String>> {
        let chain = self.acquire_chain(directory, false).await?;
        let names = match chain[chain.len() - 1].kind() {
            NodeKind::Directory { children } => {
                Ok(children.lock().await.keys().cloned().collect())
            }
            NodeKind::File { .. } => Err(DfsError::NotFound),
        };
        self.release_chain(&chain, false).await?;
        names
    }

    async fn create_file(&self, path: &DfsPath) -> DfsResult<bool> {
        let (parent, name) = match (path.parent(), path.last()) {
            (Some(parent), Some(name)) => (parent, name),
            _ => return Ok(false),
        };
        let chain = self.acquire_chain(&parent, true).await?;
        let created = self.create_file_locked(path, &chain[chain.len() - 1], name).await;
        self.release_chain(&chain, true).await?;
        created
    }

    async fn create_directory(&self, path: &DfsPath) -> DfsResult<bool> {
        let (parent, name) = match (path.parent(), path.last()) {
            (Some(parent), Some(name)) => (parent, name),
            _ => return Ok(false),
        };
        let chain = self.acquire_chain(&parent, true).await?;
        let created = self.create_directory_locked(&chain[chain.len() - 1], name).await;
        self.release_chain(&chain, true).await?;
        created
    }

    async fn delete(&self, path: &DfsPath) -> DfsResult<bool> {
        let (parent, name) = match (path.parent(), path.last()) {
            (Some(parent), Some(name)) => (parent, name),
            _ => return Ok(false),
        };
        let chain = self.acquire_chain(&parent, true).await?;
        let removed = self.delete_locked(path, &chain[chain.len() - 1], name).await;
        self.release_chain(&chain, true).await?;
        removed
    }

    async fn get_storage(&self, path: &DfsPath) -> DfsResult<StorageStub> {
        let node = Arc::clone(&self.root).resolve_kind(path, false).await?;
        let primary = match node.kind() {
            NodeKind::File { replicas, .. } => {
                replicas.lock().await.first().copied().ok_or(DfsError::State)?
            }
            NodeKind::Directory { .. } => return Err(DfsError::NotFound),
        };
        let entry = self.registry.entry(primary).await.ok_or(DfsError::State)?;
        Ok(Arc::clone(&entry.client))
    }
}

#[async_trait]
impl Registration for NamingServer {
    /// Onboards a storage server under the root's exclusive lock, which
    /// serializes registration against every tree mutation (all of which
    /// take the root shared on their way down).
    async fn register(
        &self,
        client: StorageStub,
        command: CommandStub,
        files: Vec<DfsPath>,
    ) -> DfsResult<Vec<DfsPath>> {
        self.root.lock().acquire(true).await;
        let outcome = self.register_locked(client, command, files).await;
        self.root.lock().release(true).await?;
        outcome
    }
}
