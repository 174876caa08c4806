//! Storage server engine: file operations rooted at a local directory.

mod server;

pub use server::{StorageServer, StoppedHook};

use std::cmp;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::{Command, Storage, StorageStub};
use crate::error::{map_io_error, DfsError, DfsResult};
use crate::path::DfsPath;

/// Bytes pulled per request while copying a file between servers.
const COPY_CHUNK: u32 = 64 * 1024;

/// File-service engine of one storage host.
///
/// Paths are interpreted relative to the fixed root directory. Every
/// operation holds the host guard for its duration, so local file I/O on
/// one host never interleaves.
#[derive(Debug)]
pub struct StorageEngine {
    root: PathBuf,
    guard: Mutex<()>,
}

impl StorageEngine {
    /// Engine rooted at `root`, canonicalised when possible.
    pub fn new(root: PathBuf) -> Self {
        let canonical = root.canonicalize().unwrap_or(root);
        Self { root: canonical, guard: Mutex::new(()) }
    }

    /// Borrow the root directory.
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Absolute location of `path` under the root.
    fn full_path(&self, path: &DfsPath) -> PathBuf {
        let mut full = self.root.clone();
        for component in path.components() {
            full.push(component);
        }
        full
    }

    /// Paths of every regular file under the root, relative to it.
    pub async fn enumerate(&self) -> DfsResult<Vec<DfsPath>> {
        let _guard = self.guard.lock().await;
        let mut found = Vec::new();
        let mut pending = vec![(DfsPath::root(), self.root.clone())];
        while let Some((rel, abs)) = pending.pop() {
            let mut entries = fs::read_dir(&abs).await.map_err(map_io_error)?;
            while let Some(entry) = entries.next_entry().await.map_err(map_io_error)? {
                let name = entry.file_name();
                let child_rel = match name.to_str().map(|name| rel.join(name)) {
                    // Names the naming tree cannot hold are left alone.
                    Some(Ok(child_rel)) => child_rel,
                    Some(Err(_)) | None => continue,
                };
                let kind = entry.file_type().await.map_err(map_io_error)?;
                if kind.is_dir() {
                    pending.push((child_rel, entry.path()));
                } else if kind.is_file() {
                    found.push(child_rel);
                }
            }
        }
        Ok(found)
    }

    async fn size_locked(&self, path: &DfsPath) -> DfsResult<u64> {
        let meta = fs::metadata(self.full_path(path)).await.map_err(map_io_error)?;
        if meta.is_dir() {
            return Err(DfsError::NotFound);
        }
        Ok(meta.len())
    }

    /// Removes the target file or subtree, then walks upward removing each
    /// now-empty ancestor directory, the root excluded.
    async fn delete_locked(&self, path: &DfsPath) -> bool {
        let full = self.full_path(path);
        let removed = match fs::metadata(&full).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&full).await.is_ok(),
            Ok(_) => fs::remove_file(&full).await.is_ok(),
            Err(_) => false,
        };
        if !removed {
            return false;
        }
        self.prune_ancestors(path).await
    }

    async fn prune_ancestors(&self, path: &DfsPath) -> bool {
        let mut current = path.parent();
        while let Some(ancestor) = current {
            if ancestor.is_root() {
                break;
            }
            let full = self.full_path(&ancestor);
            match Self::dir_is_empty(&full).await {
                Ok(true) => {
                    if fs::remove_dir(&full).await.is_err() {
                        return false;
                    }
                }
                Ok(false) => break,
                Err(_) => return false,
            }
            current = ancestor.parent();
        }
        true
    }

    async fn dir_is_empty(full: &Path) -> std::io::Result<bool> {
        let mut entries = fs::read_dir(full).await?;
        Ok(entries.next_entry().await?.is_none())
    }
}

#[async_trait]
impl Storage for StorageEngine {
    async fn size(&self, path: &DfsPath) -> DfsResult<u64> {
        let _guard = self.guard.lock().await;
        self.size_locked(path).await
    }

    async fn read(&self, path: &DfsPath, offset: u64, length: u32) -> DfsResult<Vec<u8>> {
        let _guard = self.guard.lock().await;
        let size = self.size_locked(path).await?;
        let end = offset.checked_add(length as u64).ok_or(DfsError::OutOfRange)?;
        if end > size {
            return Err(DfsError::OutOfRange);
        }
        let mut data = vec![0u8; length as usize];
        if length > 0 {
            let mut file = File::open(self.full_path(path)).await.map_err(map_io_error)?;
            file.seek(SeekFrom::Start(offset)).await.map_err(map_io_error)?;
            file.read_exact(&mut data).await.map_err(map_io_error)?;
        }
        Ok(data)
    }

    async fn write(&self, path: &DfsPath, offset: u64, data: &[u8]) -> DfsResult<()> {
        let _guard = self.guard.lock().await;
        let full = self.full_path(path);
        let meta = fs::metadata(&full).await.map_err(map_io_error)?;
        if meta.is_dir() {
            return Err(DfsError::NotFound);
        }
        let mut file = OpenOptions::new().write(true).open(&full).await.map_err(map_io_error)?;
        file.seek(SeekFrom::Start(offset)).await.map_err(map_io_error)?;
        file.write_all(data).await.map_err(map_io_error)?;
        file.flush().await.map_err(map_io_error)?;
        Ok(())
    }
}

#[async_trait]
impl Command for StorageEngine {
    async fn create(&self, path: &DfsPath) -> DfsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let _guard = self.guard.lock().await;
        let full = self.full_path(path);
        let parent = match full.parent() {
            Some(parent) => parent.to_path_buf(),
            None => return Ok(false),
        };
        if fs::create_dir_all(&parent).await.is_err() {
            return Ok(false);
        }
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        Ok(options.open(&full).await.is_ok())
    }

    async fn delete(&self, path: &DfsPath) -> DfsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let _guard = self.guard.lock().await;
        Ok(self.delete_locked(path).await)
    }

    async fn copy(&self, path: &DfsPath, source: StorageStub) -> DfsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let size = source.size(path).await?;

        let _guard = self.guard.lock().await;
        let full = self.full_path(path);
        self.delete_locked(path).await;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await.map_err(map_io_error)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
            .map_err(map_io_error)?;

        let mut offset = 0u64;
        while offset < size {
            let length = cmp::min(COPY_CHUNK as u64, size - offset) as u32;
            let block = source.read(path, offset, length).await?;
            if block.len() != length as usize {
                return Err(DfsError::Remote);
            }
            file.write_all(&block).await.map_err(map_io_error)?;
            offset += block.len() as u64;
        }
        file.flush().await.map_err(map_io_error)?;
        debug!(path = %path, bytes = size, "file pulled from peer");
        Ok(true)
    }
}
