//! Nodes of the naming server's directory tree.

use std::collections::HashMap;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{DfsError, DfsResult};
use crate::lock::NodeLock;
use crate::path::DfsPath;

/// Payload of a tree node: directories own children, files own replicas.
#[derive(Debug)]
pub enum NodeKind {
    /// Interior node mapping child names to nodes.
    Directory { children: Mutex<HashMap<String, Arc<Node>>> },
    /// Leaf node listing the storage servers holding its bytes.
    ///
    /// The first replica is the primary; `reads` counts shared locks
    /// since the last replication or invalidation.
    File { replicas: Mutex<Vec<usize>>, reads: AtomicU32 },
}

/// One entry of the naming tree, alive for the lifetime of its path.
#[derive(Debug)]
pub struct Node {
    lock: NodeLock,
    kind: NodeKind,
}

impl Node {
    /// Fresh directory node with no children.
    pub fn directory() -> Arc<Self> {
        Arc::new(Self {
            lock: NodeLock::new(),
            kind: NodeKind::Directory { children: Mutex::new(HashMap::new()) },
        })
    }

    /// Fresh file node whose sole replica is `primary`.
    pub fn file(primary: usize) -> Arc<Self> {
        Arc::new(Self {
            lock: NodeLock::new(),
            kind: NodeKind::File { replicas: Mutex::new(vec![primary]), reads: AtomicU32::new(0) },
        })
    }

    pub fn lock(&self) -> &NodeLock {
        &self.lock
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    /// The named child of a directory; files and missing names are
    /// reported as [`DfsError::NotFound`].
    pub async fn child(&self, name: &str) -> DfsResult<Arc<Node>> {
        match &self.kind {
            NodeKind::Directory { children } => {
                children.lock().await.get(name).cloned().ok_or(DfsError::NotFound)
            }
            NodeKind::File { .. } => Err(DfsError::NotFound),
        }
    }

    /// Walks `path` from this node, one component at a time.
    pub async fn resolve(self: Arc<Self>, path: &DfsPath) -> DfsResult<Arc<Node>> {
        let mut node = self;
        for component in path.components() {
            let next = node.child(component).await?;
            node = next;
        }
        Ok(node)
    }

    /// Resolves `path`, then checks that the node kind matches.
    pub async fn resolve_kind(
        self: Arc<Self>,
        path: &DfsPath,
        directory: bool,
    ) -> DfsResult<Arc<Node>> {
        let node = self.resolve(path).await?;
        if node.is_directory() != directory {
            return Err(DfsError::NotFound);
        }
        Ok(node)
    }

    /// Collects every file node at or below this node, with its path.
    ///
    /// `at` names this node; a file node yields itself.
    pub async fn collect_files(self: Arc<Self>, at: DfsPath) -> Vec<(DfsPath, Arc<Node>)> {
        let mut found = Vec::new();
        let mut pending = vec![(at, self)];
        while let Some((path, node)) = pending.pop() {
            match node.kind() {
                NodeKind::Directory { children } => {
                    let children = children.lock().await;
                    for (name, child) in children.iter() {
                        pending.push((path.child(name), Arc::clone(child)));
                    }
                }
                NodeKind::File { .. } => found.push((path, Arc::clone(&node))),
            }
        }
        found
    }
}
