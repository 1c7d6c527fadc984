use tracing::{debug, info, warn};

use crate::canvas::CanvasManager;
use crate::domain::{CanvasNode, NodeDraft, NodeId, ProjectId, now_millis};
use crate::error::{CanvasError, CanvasResult, ErrorKind};

impl CanvasManager {
    /// Adds a node after the last node of `project_id`.
    ///
    /// The new node's order equals the project's node count whenever the
    /// project has no gaps left by deletions.
    ///
    /// # Errors
    /// Returns [`CanvasError::NotFound`] if the project does not exist.
    pub async fn append_node(
        &self,
        project_id: ProjectId,
        draft: NodeDraft,
    ) -> CanvasResult<CanvasNode> {
        let _guard = self.locks.acquire(project_id).await;
        self.require_project(project_id).await?;

        let node = self
            .repo
            .append_node(project_id, draft, Some(now_millis()))
            .await?;

        debug!(
            project_id = %project_id,
            node_id = %node.id,
            order = node.order,
            node_type = node.node_type.as_str(),
            "appended node"
        );
        Ok(node)
    }

    /// Captures a text snippet into a project.
    pub async fn capture_text(
        &self,
        project_id: ProjectId,
        text: &str,
        source_url: Option<String>,
        source_icon: Option<String>,
    ) -> CanvasResult<CanvasNode> {
        self.append_node(project_id, NodeDraft::text(text, source_url, source_icon))
            .await
    }

    /// Captures an image into a project.
    pub async fn capture_image(
        &self,
        project_id: ProjectId,
        file_data: Vec<u8>,
        file_name: &str,
        source_url: Option<String>,
    ) -> CanvasResult<CanvasNode> {
        self.append_node(project_id, NodeDraft::image(file_data, file_name, source_url))
            .await
    }

    /// Captures a link into a project.
    pub async fn capture_link(
        &self,
        project_id: ProjectId,
        url: &str,
        title: Option<String>,
        source_icon: Option<String>,
    ) -> CanvasResult<CanvasNode> {
        self.append_node(project_id, NodeDraft::link(url, title, source_icon))
            .await
    }

    /// Nodes of a project in display order.
    pub async fn list_nodes(&self, project_id: ProjectId) -> CanvasResult<Vec<CanvasNode>> {
        self.repo.list_nodes_by_project(project_id).await
    }

    pub async fn count_nodes(&self, project_id: ProjectId) -> CanvasResult<u64> {
        self.repo.count_nodes_by_project(project_id).await
    }

    /// Rewrites the order of every node in `project_id` to its index in
    /// `ordered`. Either all nodes move or none do.
    ///
    /// Repeating a call with the same list leaves the project unchanged.
    ///
    /// # Errors
    /// - [`CanvasError::NotFound`] if the project does not exist
    /// - [`CanvasError::InvalidArgument`] if `ordered` is not exactly the
    ///   project's node ids (missing, duplicated, or foreign ids)
    pub async fn reorder(&self, project_id: ProjectId, ordered: &[NodeId]) -> CanvasResult<()> {
        let _guard = self.locks.acquire(project_id).await;
        self.require_project(project_id).await?;

        let applied = self
            .repo
            .apply_order(project_id, ordered, Some(now_millis()))
            .await;
        if let Err(e) = applied {
            if e.kind() == ErrorKind::InvalidArgument {
                warn!(project_id = %project_id, error = %e, "rejected reorder");
            }
            return Err(e);
        }

        debug!(project_id = %project_id, nodes = ordered.len(), "reordered nodes");
        Ok(())
    }

    /// Deletes a node and hands it back so the caller can offer an undo.
    ///
    /// Remaining nodes keep their order values.
    ///
    /// # Errors
    /// Returns [`CanvasError::NotFound`] if the node does not exist.
    pub async fn delete_node(&self, node_id: NodeId) -> CanvasResult<CanvasNode> {
        let project_id = self.require_node(node_id).await?.project_id;
        let _guard = self.locks.acquire(project_id).await;

        let removed = self
            .repo
            .delete_node(node_id, Some(now_millis()))
            .await?
            .ok_or_else(|| CanvasError::node_not_found(node_id))?;

        info!(project_id = %project_id, node_id = %node_id, "deleted node");
        Ok(removed)
    }

    /// Puts a previously deleted node back at the end of its project.
    ///
    /// The restored node gets a fresh id and order; its content, provenance,
    /// creation time and text versions are kept.
    ///
    /// # Errors
    /// Returns [`CanvasError::NotFound`] if its project no longer exists.
    pub async fn restore_node(&self, removed: CanvasNode) -> CanvasResult<CanvasNode> {
        let project_id = removed.project_id;
        let restored = self.append_node(project_id, removed.into_draft()).await?;

        info!(project_id = %project_id, node_id = %restored.id, "restored node");
        Ok(restored)
    }
}
