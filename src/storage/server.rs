//! Storage server lifecycle: registration on start, teardown on stop.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::{Command, CommandStub, Registration, Storage, StorageStub};
use crate::error::{DfsError, DfsResult};
use crate::path::DfsPath;
use crate::storage::StorageEngine;

/// Notification fired once when the server stops.
pub type StoppedHook = Box<dyn FnOnce() + Send>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
    Stopped,
}

/// Lifecycle wrapper around a [`StorageEngine`].
///
/// The server, not the bare engine, is what registration hands to the
/// naming server: every remote call goes through a phase check, so once
/// stopped the server answers [`DfsError::State`] on both of its stubs.
/// Starting announces the engine and reconciles the local root against
/// the returned duplicate list. A stopped server is not restartable.
pub struct StorageServer {
    engine: Arc<StorageEngine>,
    phase: Mutex<Phase>,
    stopped_hook: Mutex<Option<StoppedHook>>,
    this: Weak<StorageServer>,
}

impl StorageServer {
    /// The server shares itself with the naming server as its stubs, so
    /// construction hands back an `Arc` directly.
    pub fn new(engine: Arc<StorageEngine>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            engine,
            phase: Mutex::new(Phase::Idle),
            stopped_hook: Mutex::new(None),
            this: this.clone(),
        })
    }

    /// Replaces the notification fired by [`Self::stop`]. Default is silent.
    pub async fn on_stopped(&self, hook: StoppedHook) {
        *self.stopped_hook.lock().await = Some(hook);
    }

    async fn ensure_serving(&self) -> DfsResult<()> {
        if *self.phase.lock().await == Phase::Stopped {
            return Err(DfsError::State);
        }
        Ok(())
    }

    /// Announces the server and deletes every local file the naming
    /// server reports as already hosted elsewhere.
    pub async fn start(&self, naming: &dyn Registration) -> DfsResult<()> {
        let mut phase = self.phase.lock().await;
        if *phase != Phase::Idle {
            return Err(DfsError::State);
        }

        let files = self.engine.enumerate().await?;
        let this = self.this.upgrade().ok_or(DfsError::State)?;
        let client = Arc::clone(&this) as StorageStub;
        let command = this as CommandStub;
        let duplicates = naming.register(client, command, files).await?;
        for path in &duplicates {
            if !self.engine.delete(path).await? {
                warn!(path = %path, "stale local copy survived reconciliation");
            }
        }

        *phase = Phase::Started;
        info!(
            root = %self.engine.root_path().display(),
            dropped = duplicates.len(),
            "storage server started"
        );
        Ok(())
    }

    /// Stops the server and fires the stopped notification once.
    pub async fn stop(&self) {
        let mut phase = self.phase.lock().await;
        if *phase == Phase::Stopped {
            return;
        }
        *phase = Phase::Stopped;
        if let Some(hook) = self.stopped_hook.lock().await.take() {
            hook();
        }
        info!("storage server stopped");
    }
}

#[async_trait]
impl Storage for StorageServer {
    async fn size(&self, path: &DfsPath) -> DfsResult<u64> {
        self.ensure_serving().await?;
        self.engine.size(path).await
    }

    async fn read(&self, path: &DfsPath, offset: u64, length: u32) -> DfsResult<Vec<u8>> {
        self.ensure_serving().await?;
        self.engine.read(path, offset, length).await
    }

    async fn write(&self, path: &DfsPath, offset: u64, data: &[u8]) -> DfsResult<()> {
        self.ensure_serving().await?;
        self.engine.write(path, offset, data).await
    }
}

#[async_trait]
impl Command for StorageServer {
    async fn create(&self, path: &DfsPath) -> DfsResult<bool> {
        self.ensure_serving().await?;
        self.engine.create(path).await
    }

    async fn delete(&self, path: &DfsPath) -> DfsResult<bool> {
        self.ensure_serving().await?;
        self.engine.delete(path).await
    }

    async fn copy(&self, path: &DfsPath, source: StorageStub) -> DfsResult<bool> {
        self.ensure_serving().await?;
        self.engine.copy(path, source).await
    }
}
