use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::{
    CanvasNode, NewProject, NodeDraft, NodeId, NodePatch, Project, ProjectId, ProjectPatch,
};
use crate::error::{CanvasError, CanvasResult};
use crate::store::{CanvasRepository, check_order, check_permutation, next_order};

#[derive(Default)]
struct State {
    last_project_id: i64,
    last_node_id: i64,
    projects: BTreeMap<ProjectId, Project>,
    nodes: BTreeMap<NodeId, CanvasNode>,
    writes: u64,
}

impl State {
    fn project_nodes(&self, project_id: ProjectId) -> impl Iterator<Item = &CanvasNode> {
        self.nodes.values().filter(move |n| n.project_id == project_id)
    }

    fn order_taken(&self, project_id: ProjectId, order: i64) -> bool {
        self.project_nodes(project_id).any(|n| n.order == order)
    }

    fn require_project(&self, project_id: ProjectId) -> CanvasResult<()> {
        if self.projects.contains_key(&project_id) {
            Ok(())
        } else {
            Err(CanvasError::project_not_found(project_id))
        }
    }

    fn touch(&mut self, project_id: ProjectId, touched_at: Option<i64>) {
        if let (Some(at), Some(project)) = (touched_at, self.projects.get_mut(&project_id)) {
            project.updated_at = at;
        }
    }

    fn insert_node(&mut self, project_id: ProjectId, draft: NodeDraft, order: i64) -> CanvasNode {
        self.last_node_id += 1;
        let node = draft.place(NodeId(self.last_node_id), project_id, order);
        self.nodes.insert(node.id, node.clone());
        self.writes += 1;
        node
    }
}

/// An in-memory [`CanvasRepository`].
///
/// Holds everything behind one mutex, so each call is trivially atomic. It
/// enforces the same uniqueness rules as the SQLite schema and counts
/// committed writes, which lets tests assert that an operation wrote nothing.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutations committed so far.
    pub fn write_count(&self) -> u64 {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a panic mid-call never leaves partial state behind, so poisoning is harmless
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn sort_projects(projects: &mut [Project]) {
    projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl CanvasRepository for MemoryStore {
    async fn create_project(&self, project: NewProject) -> CanvasResult<ProjectId> {
        let mut state = self.lock();
        state.last_project_id += 1;
        let id = ProjectId(state.last_project_id);

        state.projects.insert(
            id,
            Project {
                id,
                name: project.name,
                project_type: project.project_type,
                updated_at: project.updated_at,
                is_inbox: false,
                file_handle: project.file_handle,
            },
        );
        state.writes += 1;
        Ok(id)
    }

    async fn get_project(&self, id: ProjectId) -> CanvasResult<Option<Project>> {
        Ok(self.lock().projects.get(&id).cloned())
    }

    async fn update_project(&self, id: ProjectId, patch: ProjectPatch) -> CanvasResult<Project> {
        let mut state = self.lock();
        let project = state
            .projects
            .get_mut(&id)
            .ok_or_else(|| CanvasError::project_not_found(id))?;
        project.apply(patch);
        let updated = project.clone();
        state.writes += 1;
        Ok(updated)
    }

    async fn delete_project(&self, id: ProjectId) -> CanvasResult<bool> {
        let mut state = self.lock();
        let removed = state.projects.remove(&id).is_some();
        if removed {
            state.writes += 1;
        }
        Ok(removed)
    }

    async fn delete_project_with_nodes(&self, id: ProjectId) -> CanvasResult<u64> {
        let mut state = self.lock();
        if state.projects.remove(&id).is_none() {
            return Err(CanvasError::project_not_found(id));
        }

        let before = state.nodes.len();
        state.nodes.retain(|_, n| n.project_id != id);
        let removed = (before - state.nodes.len()) as u64;
        state.writes += 1;
        Ok(removed)
    }

    async fn list_projects(&self) -> CanvasResult<Vec<Project>> {
        let mut projects: Vec<Project> = self.lock().projects.values().cloned().collect();
        sort_projects(&mut projects);
        Ok(projects)
    }

    async fn find_inbox(&self) -> CanvasResult<Option<Project>> {
        Ok(self.lock().projects.values().find(|p| p.is_inbox).cloned())
    }

    async fn create_inbox_if_absent(&self, name: &str, at: i64) -> CanvasResult<(Project, bool)> {
        let mut state = self.lock();
        if let Some(inbox) = state.projects.values().find(|p| p.is_inbox) {
            return Ok((inbox.clone(), false));
        }

        state.last_project_id += 1;
        let inbox = Project {
            id: ProjectId(state.last_project_id),
            name: name.to_string(),
            project_type: Default::default(),
            updated_at: at,
            is_inbox: true,
            file_handle: None,
        };
        state.projects.insert(inbox.id, inbox.clone());
        state.writes += 1;
        Ok((inbox, true))
    }

    async fn create_node(
        &self,
        project_id: ProjectId,
        draft: NodeDraft,
        order: i64,
    ) -> CanvasResult<CanvasNode> {
        check_order(order)?;
        let mut state = self.lock();
        state.require_project(project_id)?;
        if state.order_taken(project_id, order) {
            return Err(CanvasError::invalid(format!(
                "order {order} already used in project {project_id}"
            )));
        }
        Ok(state.insert_node(project_id, draft, order))
    }

    async fn append_node(
        &self,
        project_id: ProjectId,
        draft: NodeDraft,
        touched_at: Option<i64>,
    ) -> CanvasResult<CanvasNode> {
        let mut state = self.lock();
        state.require_project(project_id)?;
        let count = state.project_nodes(project_id).count() as u64;
        let max = state.project_nodes(project_id).map(|n| n.order).max();
        let order = next_order(count, max);
        let node = state.insert_node(project_id, draft, order);
        state.touch(project_id, touched_at);
        Ok(node)
    }

    async fn get_node(&self, id: NodeId) -> CanvasResult<Option<CanvasNode>> {
        Ok(self.lock().nodes.get(&id).cloned())
    }

    async fn update_node(
        &self,
        id: NodeId,
        patch: NodePatch,
        touched_at: Option<i64>,
    ) -> CanvasResult<CanvasNode> {
        let mut state = self.lock();
        let project_id = state
            .nodes
            .get(&id)
            .map(|n| n.project_id)
            .ok_or_else(|| CanvasError::node_not_found(id))?;

        if let Some(order) = patch.order {
            check_order(order)?;
            let clash = state
                .project_nodes(project_id)
                .any(|n| n.id != id && n.order == order);
            if clash {
                return Err(CanvasError::invalid(format!(
                    "order {order} already used in project {project_id}"
                )));
            }
        }

        let Some(node) = state.nodes.get_mut(&id) else {
            return Err(CanvasError::node_not_found(id));
        };
        node.apply(patch);
        let updated = node.clone();
        state.touch(project_id, touched_at);
        state.writes += 1;
        Ok(updated)
    }

    async fn delete_node(
        &self,
        id: NodeId,
        touched_at: Option<i64>,
    ) -> CanvasResult<Option<CanvasNode>> {
        let mut state = self.lock();
        let removed = state.nodes.remove(&id);
        if let Some(node) = &removed {
            state.touch(node.project_id, touched_at);
            state.writes += 1;
        }
        Ok(removed)
    }

    async fn list_nodes(&self) -> CanvasResult<Vec<CanvasNode>> {
        Ok(self.lock().nodes.values().cloned().collect())
    }

    async fn list_nodes_by_project(&self, project_id: ProjectId) -> CanvasResult<Vec<CanvasNode>> {
        let mut nodes: Vec<CanvasNode> = self.lock().project_nodes(project_id).cloned().collect();
        nodes.sort_by_key(|n| n.order);
        Ok(nodes)
    }

    async fn count_nodes_by_project(&self, project_id: ProjectId) -> CanvasResult<u64> {
        Ok(self.lock().project_nodes(project_id).count() as u64)
    }

    async fn node_counts(&self) -> CanvasResult<HashMap<ProjectId, u64>> {
        let mut counts = HashMap::new();
        for node in self.lock().nodes.values() {
            *counts.entry(node.project_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn apply_order(
        &self,
        project_id: ProjectId,
        ordered: &[NodeId],
        touched_at: Option<i64>,
    ) -> CanvasResult<()> {
        let mut state = self.lock();
        let current: Vec<NodeId> = state.project_nodes(project_id).map(|n| n.id).collect();
        check_permutation(&current, ordered)?;

        for (position, id) in ordered.iter().enumerate() {
            if let Some(node) = state.nodes.get_mut(id) {
                node.order = position as i64;
            }
        }
        if !ordered.is_empty() {
            state.touch(project_id, touched_at);
            state.writes += 1;
        }
        Ok(())
    }
}
