use tracing::debug;

use crate::canvas::CanvasManager;
use crate::domain::{CanvasNode, NodeId, NodePatch, NodeType, TextVersions, now_millis};
use crate::error::{CanvasError, CanvasResult};

impl CanvasManager {
    /// Replaces the displayed text of a text node, keeping the captured
    /// original.
    ///
    /// The first edit copies the current text into `original_text` and flags
    /// the node as edited; later edits only replace `edited_text` and `text`.
    /// Content is trimmed first. Submitting the current edited text again
    /// writes nothing and returns the node as stored.
    ///
    /// # Errors
    /// - [`CanvasError::NotFound`] if the node does not exist
    /// - [`CanvasError::InvalidArgument`] if the node is not a text node
    pub async fn update_text_node(&self, node_id: NodeId, content: &str) -> CanvasResult<CanvasNode> {
        let project_id = self.require_node(node_id).await?.project_id;
        let _guard = self.locks.acquire(project_id).await;

        // re-read under the lock; the node may have changed while we waited
        let node = self.require_node(node_id).await?;
        if node.node_type != NodeType::Text {
            return Err(CanvasError::invalid(format!(
                "node {node_id} is a {} node, not text",
                node.node_type.as_str()
            )));
        }

        let Some(patch) = text_edit(&node, content.trim()) else {
            return Ok(node);
        };

        let first_edit = !node.has_edited;
        let updated = self
            .repo
            .update_node(node_id, patch, Some(now_millis()))
            .await?;

        debug!(node_id = %node_id, first_edit, "updated text node");
        Ok(updated)
    }

    /// The captured and edited versions of a text node.
    pub async fn text_versions(&self, node_id: NodeId) -> CanvasResult<TextVersions> {
        let node = self.require_node(node_id).await?;
        if node.node_type != NodeType::Text {
            return Err(CanvasError::invalid(format!("node {node_id} is not a text node")));
        }

        Ok(TextVersions {
            original: node.original_text.or_else(|| node.text.clone()),
            edited: if node.has_edited { node.edited_text } else { None },
        })
    }
}

/// Computes the write an edit needs, or `None` when nothing would change.
fn text_edit(node: &CanvasNode, trimmed: &str) -> Option<NodePatch> {
    if node.has_edited {
        if node.edited_text.as_deref() == Some(trimmed) {
            return None;
        }
        return Some(NodePatch {
            edited_text: Some(trimmed.to_owned()),
            text: Some(trimmed.to_owned()),
            ..Default::default()
        });
    }

    Some(NodePatch {
        original_text: node.text.clone(),
        edited_text: Some(trimmed.to_owned()),
        text: Some(trimmed.to_owned()),
        has_edited: Some(true),
        ..Default::default()
    })
}
