//! Persistence of projects and nodes.
//!
//! [`CanvasRepository`] is the seam between the canvas logic and whatever
//! keeps the records. Two implementations ship with the crate:
//!
//! - [`sqlite::SqliteStore`]: durable storage in a single SQLite file
//! - [`memory::MemoryStore`]: a process-local fake for tests
//!
//! Every mutation is durable before its future resolves. Operations that
//! touch several records (`append_node`, `apply_order`,
//! `delete_project_with_nodes`, `create_inbox_if_absent`) are all-or-nothing.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::domain::{
    CanvasNode, NewProject, NodeDraft, NodeId, NodePatch, Project, ProjectId, ProjectPatch,
};
use crate::error::{CanvasError, CanvasResult};

pub mod memory;
pub mod sqlite;

#[async_trait]
pub trait CanvasRepository: Send + Sync {
    // --- Projects ---
    async fn create_project(&self, project: NewProject) -> CanvasResult<ProjectId>;

    async fn get_project(&self, id: ProjectId) -> CanvasResult<Option<Project>>;

    /// Merges `patch` into the stored project and returns the result.
    async fn update_project(&self, id: ProjectId, patch: ProjectPatch) -> CanvasResult<Project>;

    /// Removes the project record only. Returns whether a row was removed.
    async fn delete_project(&self, id: ProjectId) -> CanvasResult<bool>;

    /// Removes the project and every node referencing it in one transaction.
    /// Returns the number of nodes removed.
    async fn delete_project_with_nodes(&self, id: ProjectId) -> CanvasResult<u64>;

    /// All projects, most recently updated first.
    async fn list_projects(&self) -> CanvasResult<Vec<Project>>;

    async fn find_inbox(&self) -> CanvasResult<Option<Project>>;

    /// Creates the inbox unless one exists. Returns the inbox and whether it
    /// was created by this call.
    async fn create_inbox_if_absent(&self, name: &str, at: i64) -> CanvasResult<(Project, bool)>;

    // --- Nodes ---
    //
    // Writes that change a project's content take a `touched_at` timestamp.
    // When given, the owning project's `updated_at` is set to it inside the
    // same transaction as the node write.

    /// Stores a node at an explicit position.
    ///
    /// Fails with [`CanvasError::NotFound`] if the project does not exist.
    async fn create_node(
        &self,
        project_id: ProjectId,
        draft: NodeDraft,
        order: i64,
    ) -> CanvasResult<CanvasNode>;

    /// Stores a node after the last one in its project, computing the
    /// position and inserting in one transaction.
    ///
    /// Fails with [`CanvasError::NotFound`] if the project does not exist.
    async fn append_node(
        &self,
        project_id: ProjectId,
        draft: NodeDraft,
        touched_at: Option<i64>,
    ) -> CanvasResult<CanvasNode>;

    async fn get_node(&self, id: NodeId) -> CanvasResult<Option<CanvasNode>>;

    /// Merges `patch` into the stored node and returns the result.
    async fn update_node(
        &self,
        id: NodeId,
        patch: NodePatch,
        touched_at: Option<i64>,
    ) -> CanvasResult<CanvasNode>;

    /// Removes a node, returning it if it existed.
    async fn delete_node(
        &self,
        id: NodeId,
        touched_at: Option<i64>,
    ) -> CanvasResult<Option<CanvasNode>>;

    async fn list_nodes(&self) -> CanvasResult<Vec<CanvasNode>>;

    /// Nodes of one project, ascending by order.
    async fn list_nodes_by_project(&self, project_id: ProjectId) -> CanvasResult<Vec<CanvasNode>>;

    async fn count_nodes_by_project(&self, project_id: ProjectId) -> CanvasResult<u64>;

    /// Node counts for every project that has at least one node.
    async fn node_counts(&self) -> CanvasResult<HashMap<ProjectId, u64>>;

    /// Rewrites each node's order to its index in `ordered`.
    ///
    /// `ordered` must be exactly the project's node ids; otherwise nothing is
    /// written and [`CanvasError::InvalidArgument`] is returned. An empty
    /// project with an empty list writes nothing, not even the timestamp.
    async fn apply_order(
        &self,
        project_id: ProjectId,
        ordered: &[NodeId],
        touched_at: Option<i64>,
    ) -> CanvasResult<()>;
}

/// Position for the next appended node.
///
/// This is the node count, lifted past the current maximum when deletions
/// left gaps so the new position never collides with an existing one.
pub(crate) fn next_order(count: u64, max_order: Option<i64>) -> i64 {
    let after_last = max_order.map_or(0, |max| max + 1);
    (count as i64).max(after_last)
}

/// Explicit positions must be non-negative; negative values are reserved for
/// the intermediate step of a reorder.
pub(crate) fn check_order(order: i64) -> CanvasResult<()> {
    if order < 0 {
        return Err(CanvasError::invalid(format!("order must be >= 0, got {order}")));
    }
    Ok(())
}

/// Checks that `proposed` is a permutation of `current`.
pub(crate) fn check_permutation(current: &[NodeId], proposed: &[NodeId]) -> CanvasResult<()> {
    let known: HashSet<NodeId> = current.iter().copied().collect();
    let mut seen = HashSet::with_capacity(proposed.len());

    for id in proposed {
        if !known.contains(id) {
            return Err(CanvasError::invalid(format!(
                "node {id} does not belong to this project"
            )));
        }
        if !seen.insert(*id) {
            return Err(CanvasError::invalid(format!("node {id} listed twice")));
        }
    }

    if seen.len() != known.len() {
        return Err(CanvasError::invalid(format!(
            "expected {} node ids, got {}",
            known.len(),
            seen.len()
        )));
    }

    Ok(())
}
