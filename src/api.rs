//! Remote interface definitions for the naming and storage servers.
//!
//! The RPC transport is an external collaborator: these traits are the
//! boundary it marshals, and a stub is any shared handle implementing one
//! of them. Within one process the handles are plain `Arc`s.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DfsResult;
use crate::path::DfsPath;

/// Handle to a storage server's data plane.
pub type StorageStub = Arc<dyn Storage>;

/// Handle to a storage server's control plane.
pub type CommandStub = Arc<dyn Command>;

/// Client-facing interface of the naming server.
#[async_trait]
pub trait Service: Sync + Send {
    /// Locks `path` shared or exclusive, taking shared locks on every
    /// ancestor first.
    async fn lock(&self, path: &DfsPath, exclusive: bool) -> DfsResult<()>;

    /// Releases a lock previously taken with the same mode.
    async fn unlock(&self, path: &DfsPath, exclusive: bool) -> DfsResult<()>;

    /// True when `path` names a directory.
    async fn is_directory(&self, path: &DfsPath) -> DfsResult<bool>;

    /// Child names of a directory, in unspecified order.
    async fn list(&self, directory: &DfsPath) -> DfsResult<Vec<String>>;

    /// Creates an empty file on one storage server; false when the name
    /// is already taken.
    async fn create_file(&self, path: &DfsPath) -> DfsResult<bool>;

    /// Creates a directory node; false when the name is already taken.
    async fn create_directory(&self, path: &DfsPath) -> DfsResult<bool>;

    /// Removes `path` from the tree and from every host replicating it.
    async fn delete(&self, path: &DfsPath) -> DfsResult<bool>;

    /// Data-plane stub of the server holding the file's primary replica.
    async fn get_storage(&self, path: &DfsPath) -> DfsResult<StorageStub>;
}

/// Storage-facing interface of the naming server.
#[async_trait]
pub trait Registration: Sync + Send {
    /// Announces a storage server and the files it already hosts.
    ///
    /// Returns the announced paths that were already present in the tree;
    /// the caller is expected to delete those from its local root so that
    /// exactly one replica of each survives registration.
    async fn register(
        &self,
        client: StorageStub,
        command: CommandStub,
        files: Vec<DfsPath>,
    ) -> DfsResult<Vec<DfsPath>>;
}

/// Client-facing data plane of a storage server.
#[async_trait]
pub trait Storage: Sync + Send {
    /// Current length of the file in bytes.
    async fn size(&self, path: &DfsPath) -> DfsResult<u64>;

    /// Reads exactly `length` bytes starting at `offset`.
    async fn read(&self, path: &DfsPath, offset: u64, length: u32) -> DfsResult<Vec<u8>>;

    /// Writes `data` at `offset`, extending the file when needed.
    async fn write(&self, path: &DfsPath, offset: u64, data: &[u8]) -> DfsResult<()>;
}

/// Naming-facing control plane of a storage server.
#[async_trait]
pub trait Command: Sync + Send {
    /// Creates an empty file, creating missing ancestor directories.
    async fn create(&self, path: &DfsPath) -> DfsResult<bool>;

    /// Recursively removes `path`, pruning emptied ancestor directories.
    async fn delete(&self, path: &DfsPath) -> DfsResult<bool>;

    /// Pulls the file's bytes from another storage server.
    async fn copy(&self, path: &DfsPath, source: StorageStub) -> DfsResult<bool>;
}
