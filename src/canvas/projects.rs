use tracing::info;

use crate::canvas::CanvasManager;
use crate::domain::{
    NewProject, Project, ProjectId, ProjectPatch, ProjectSummary, ProjectType, now_millis,
};
use crate::error::{CanvasError, CanvasResult};

impl CanvasManager {
    /// Creates a new, empty project.
    ///
    /// # Errors
    /// Returns [`CanvasError::InvalidArgument`] if `name` is blank.
    pub async fn create_project(
        &self,
        name: &str,
        project_type: ProjectType,
    ) -> CanvasResult<Project> {
        let name = valid_name(name)?;
        let id = self
            .repo
            .create_project(NewProject::new(name, project_type))
            .await?;

        self.require_project(id).await
    }

    /// Fetches a project by id.
    ///
    /// # Errors
    /// Returns [`CanvasError::NotFound`] if no such project exists.
    pub async fn get_project(&self, id: ProjectId) -> CanvasResult<Project> {
        self.require_project(id).await
    }

    /// Renames a project and bumps its `updated_at`.
    ///
    /// # Errors
    /// - [`CanvasError::InvalidArgument`] if `name` is blank or the project is the Inbox
    /// - [`CanvasError::NotFound`] if no such project exists
    pub async fn rename_project(&self, id: ProjectId, name: &str) -> CanvasResult<Project> {
        let name = valid_name(name)?;
        let project = self.require_project(id).await?;
        if project.is_inbox {
            return Err(CanvasError::invalid("the inbox cannot be renamed"));
        }

        self.repo
            .update_project(
                id,
                ProjectPatch {
                    name: Some(name),
                    updated_at: Some(now_millis()),
                    ..Default::default()
                },
            )
            .await
    }

    /// Stores (or clears) the opaque handle of a file-backed project.
    pub async fn set_file_handle(
        &self,
        id: ProjectId,
        handle: Option<Vec<u8>>,
    ) -> CanvasResult<Project> {
        self.repo
            .update_project(
                id,
                ProjectPatch {
                    file_handle: Some(handle),
                    ..Default::default()
                },
            )
            .await
    }

    /// Deletes a project together with all of its nodes.
    ///
    /// Returns how many nodes were removed.
    ///
    /// # Errors
    /// - [`CanvasError::InvalidArgument`] if the project is the Inbox
    /// - [`CanvasError::NotFound`] if no such project exists
    pub async fn delete_project(&self, id: ProjectId) -> CanvasResult<u64> {
        let _guard = self.locks.acquire(id).await;

        let project = self.require_project(id).await?;
        if project.is_inbox {
            return Err(CanvasError::invalid("the inbox cannot be deleted"));
        }

        let removed = self.repo.delete_project_with_nodes(id).await?;
        self.locks.forget(id);

        info!(project_id = %id, nodes = removed, "deleted project");
        Ok(removed)
    }

    /// Lists every project with its node count.
    ///
    /// The Inbox comes first; the rest follow by most recent update.
    pub async fn list_projects(&self) -> CanvasResult<Vec<ProjectSummary>> {
        let projects = self.repo.list_projects().await?;
        let counts = self.repo.node_counts().await?;

        let (mut inbox, others): (Vec<_>, Vec<_>) =
            projects.into_iter().partition(|p| p.is_inbox);
        inbox.extend(others);

        Ok(inbox
            .into_iter()
            .map(|project| ProjectSummary {
                node_count: counts.get(&project.id).copied().unwrap_or(0),
                project,
            })
            .collect())
    }
}

/// Trims a proposed project name and rejects blank ones.
fn valid_name(name: &str) -> CanvasResult<String> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(CanvasError::invalid("project name cannot be empty"));
    }

    Ok(trimmed.to_owned())
}
