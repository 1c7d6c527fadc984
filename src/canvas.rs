//! Project and node operations on top of a [`CanvasRepository`].
//!
//! [`CanvasManager`] is what a view layer talks to. It owns no state of its
//! own besides per-project locks: every call reads from the repository, so
//! the store stays the single source of truth.
//!
//! - [`projects`]: create, rename, delete (cascading), and list projects
//! - [`ordering`]: capture nodes, keep their order, delete and restore them
//! - [`versions`]: original vs. edited text of text nodes
//! - [`bootstrap`]: make sure the Inbox exists

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::StoreConfig;
use crate::domain::{CanvasNode, NodeId, Project, ProjectId};
use crate::error::{CanvasError, CanvasResult};
use crate::store::CanvasRepository;
use crate::store::sqlite::SqliteStore;

pub mod bootstrap;
pub mod ordering;
pub mod projects;
pub mod versions;

/// One async lock per project, created on first use.
///
/// Appends, reorders and edits within a project run one at a time; different
/// projects never wait on each other.
#[derive(Default)]
struct ProjectLocks {
    inner: Mutex<HashMap<ProjectId, Arc<AsyncMutex<()>>>>,
}

impl ProjectLocks {
    async fn acquire(&self, id: ProjectId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }

    fn forget(&self, id: ProjectId) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }
}

/// High-level canvas operations for a single store.
pub struct CanvasManager {
    repo: Arc<dyn CanvasRepository>,
    locks: ProjectLocks,
}

impl CanvasManager {
    /// Creates a manager over any repository implementation.
    pub fn new(repo: Arc<dyn CanvasRepository>) -> Self {
        CanvasManager {
            repo,
            locks: ProjectLocks::default(),
        }
    }

    /// Opens the SQLite store described by `config` and wraps it.
    pub async fn open(config: &StoreConfig) -> CanvasResult<Self> {
        let store = SqliteStore::open(config).await?;
        Ok(Self::new(Arc::new(store)))
    }

    /// The underlying repository.
    pub fn repository(&self) -> &Arc<dyn CanvasRepository> {
        &self.repo
    }

    async fn require_project(&self, id: ProjectId) -> CanvasResult<Project> {
        self.repo
            .get_project(id)
            .await?
            .ok_or_else(|| CanvasError::project_not_found(id))
    }

    async fn require_node(&self, id: NodeId) -> CanvasResult<CanvasNode> {
        self.repo
            .get_node(id)
            .await?
            .ok_or_else(|| CanvasError::node_not_found(id))
    }
}
