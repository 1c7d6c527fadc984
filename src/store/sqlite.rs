use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::info;

use crate::config::StoreConfig;
use crate::domain::{
    CanvasNode, NewProject, NodeDraft, NodeId, NodePatch, Project, ProjectId, ProjectPatch,
};
use crate::error::{CanvasError, CanvasResult};
use crate::store::{CanvasRepository, check_order, check_permutation, next_order};

/// A [`CanvasRepository`] backed by a SQLite database file.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct ProjectRecord {
    id: i64,
    name: String,
    project_type: String,
    updated_at: i64,
    is_inbox: bool,
    file_handle: Option<Vec<u8>>,
}

impl ProjectRecord {
    fn into_domain(self) -> CanvasResult<Project> {
        Ok(Project {
            id: ProjectId(self.id),
            name: self.name,
            project_type: self.project_type.parse()?,
            updated_at: self.updated_at,
            is_inbox: self.is_inbox,
            file_handle: self.file_handle,
        })
    }
}

#[derive(FromRow)]
struct NodeRecord {
    id: i64,
    project_id: i64,
    node_type: String,
    sort_order: i64,
    text: Option<String>,
    original_text: Option<String>,
    edited_text: Option<String>,
    has_edited: bool,
    file_data: Option<Vec<u8>>,
    file_name: Option<String>,
    url: Option<String>,
    source_url: Option<String>,
    source_icon: Option<String>,
    created_at: i64,
}

impl NodeRecord {
    fn into_domain(self) -> CanvasResult<CanvasNode> {
        Ok(CanvasNode {
            id: NodeId(self.id),
            project_id: ProjectId(self.project_id),
            node_type: self.node_type.parse()?,
            order: self.sort_order,
            text: self.text,
            original_text: self.original_text,
            edited_text: self.edited_text,
            has_edited: self.has_edited,
            file_data: self.file_data,
            file_name: self.file_name,
            url: self.url,
            source_url: self.source_url,
            source_icon: self.source_icon,
            created_at: self.created_at,
        })
    }
}

impl SqliteStore {
    /// Opens (creating if needed) the database described by `config` and
    /// brings its schema up to date.
    ///
    /// The parent directory of the database file is created when missing.
    ///
    /// # Errors
    /// - [`CanvasError::Io`] if the parent directory cannot be created
    /// - [`CanvasError::Storage`] if the connection fails
    /// - [`CanvasError::Migration`] if the schema cannot be migrated
    pub async fn open(config: &StoreConfig) -> CanvasResult<Self> {
        let path = &config.database_path;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "opened canvas store");

        let store = SqliteStore { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Shorthand for [`SqliteStore::open`] with default pool settings.
    pub async fn open_at(path: &Path) -> CanvasResult<Self> {
        Self::open(&StoreConfig::at(path)).await
    }

    pub async fn run_migrations(&self) -> CanvasResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("canvas store schema is up to date");
        Ok(())
    }

    /// Starts a transaction that holds the database write lock from the
    /// start.
    ///
    /// A deferred transaction that reads before it writes cannot wait for
    /// another connection's write to finish; SQLite fails it with
    /// `SQLITE_BUSY_SNAPSHOT` instead. Taking the lock up front lets the busy
    /// timeout queue concurrent writers.
    async fn begin_write(&self) -> CanvasResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn fetch_project(conn: &mut SqliteConnection, id: ProjectId) -> CanvasResult<Option<Project>> {
    let record = sqlx::query_as::<_, ProjectRecord>(
        "SELECT id, name, project_type, updated_at, is_inbox, file_handle
         FROM projects WHERE id = ?",
    )
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;

    record.map(ProjectRecord::into_domain).transpose()
}

async fn fetch_node(conn: &mut SqliteConnection, id: NodeId) -> CanvasResult<Option<CanvasNode>> {
    let record = sqlx::query_as::<_, NodeRecord>(
        "SELECT id, project_id, node_type, sort_order, text, original_text, edited_text,
                has_edited, file_data, file_name, url, source_url, source_icon, created_at
         FROM nodes WHERE id = ?",
    )
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;

    record.map(NodeRecord::into_domain).transpose()
}

async fn require_project(conn: &mut SqliteConnection, id: ProjectId) -> CanvasResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE id = ?")
        .bind(id.0)
        .fetch_one(&mut *conn)
        .await?;

    if count == 0 {
        return Err(CanvasError::project_not_found(id));
    }
    Ok(())
}

/// Sets a project's `updated_at` when a timestamp is given. A missing project
/// is left alone.
async fn touch_project(
    conn: &mut SqliteConnection,
    id: ProjectId,
    touched_at: Option<i64>,
) -> CanvasResult<()> {
    let Some(at) = touched_at else {
        return Ok(());
    };

    sqlx::query("UPDATE projects SET updated_at = ? WHERE id = ?")
        .bind(at)
        .bind(id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_node(
    conn: &mut SqliteConnection,
    project_id: ProjectId,
    draft: NodeDraft,
    order: i64,
) -> CanvasResult<CanvasNode> {
    let result = sqlx::query(
        "INSERT INTO nodes (project_id, node_type, sort_order, text, original_text, edited_text,
                            has_edited, file_data, file_name, url, source_url, source_icon, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(project_id.0)
    .bind(draft.node_type.as_str())
    .bind(order)
    .bind(draft.text.as_deref())
    .bind(draft.original_text.as_deref())
    .bind(draft.edited_text.as_deref())
    .bind(draft.has_edited)
    .bind(draft.file_data.as_deref())
    .bind(draft.file_name.as_deref())
    .bind(draft.url.as_deref())
    .bind(draft.source_url.as_deref())
    .bind(draft.source_icon.as_deref())
    .bind(draft.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(draft.place(NodeId(result.last_insert_rowid()), project_id, order))
}

#[async_trait]
impl CanvasRepository for SqliteStore {
    async fn create_project(&self, project: NewProject) -> CanvasResult<ProjectId> {
        let result = sqlx::query(
            "INSERT INTO projects (name, project_type, updated_at, file_handle, is_inbox)
             VALUES (?, ?, ?, ?, 0)",
        )
        .bind(&project.name)
        .bind(project.project_type.as_str())
        .bind(project.updated_at)
        .bind(project.file_handle.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(ProjectId(result.last_insert_rowid()))
    }

    async fn get_project(&self, id: ProjectId) -> CanvasResult<Option<Project>> {
        let mut conn = self.pool.acquire().await?;
        fetch_project(&mut conn, id).await
    }

    async fn update_project(&self, id: ProjectId, patch: ProjectPatch) -> CanvasResult<Project> {
        let mut tx = self.begin_write().await?;

        let mut project = fetch_project(&mut tx, id)
            .await?
            .ok_or_else(|| CanvasError::project_not_found(id))?;
        project.apply(patch);

        sqlx::query("UPDATE projects SET name = ?, updated_at = ?, file_handle = ? WHERE id = ?")
            .bind(&project.name)
            .bind(project.updated_at)
            .bind(project.file_handle.as_deref())
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(project)
    }

    async fn delete_project(&self, id: ProjectId) -> CanvasResult<bool> {
        let res = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn delete_project_with_nodes(&self, id: ProjectId) -> CanvasResult<u64> {
        let mut tx = self.begin_write().await?;

        let res = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 0 {
            // dropping `tx` rolls back
            return Err(CanvasError::project_not_found(id));
        }

        let nodes = sqlx::query("DELETE FROM nodes WHERE project_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(nodes.rows_affected())
    }

    async fn list_projects(&self) -> CanvasResult<Vec<Project>> {
        let records = sqlx::query_as::<_, ProjectRecord>(
            "SELECT id, name, project_type, updated_at, is_inbox, file_handle
             FROM projects ORDER BY updated_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(ProjectRecord::into_domain).collect()
    }

    async fn find_inbox(&self) -> CanvasResult<Option<Project>> {
        let record = sqlx::query_as::<_, ProjectRecord>(
            "SELECT id, name, project_type, updated_at, is_inbox, file_handle
             FROM projects WHERE is_inbox = 1 LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        record.map(ProjectRecord::into_domain).transpose()
    }

    async fn create_inbox_if_absent(&self, name: &str, at: i64) -> CanvasResult<(Project, bool)> {
        let mut tx = self.begin_write().await?;

        // the partial unique index on is_inbox turns a second insert into a no-op
        let res = sqlx::query(
            "INSERT OR IGNORE INTO projects (name, project_type, updated_at, is_inbox)
             VALUES (?, 'canvas', ?, 1)",
        )
        .bind(name)
        .bind(at)
        .execute(&mut *tx)
        .await?;
        let created = res.rows_affected() == 1;

        let record = sqlx::query_as::<_, ProjectRecord>(
            "SELECT id, name, project_type, updated_at, is_inbox, file_handle
             FROM projects WHERE is_inbox = 1 LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CanvasError::Corrupt("inbox missing after insert".into()))?;

        tx.commit().await?;
        Ok((record.into_domain()?, created))
    }

    async fn create_node(
        &self,
        project_id: ProjectId,
        draft: NodeDraft,
        order: i64,
    ) -> CanvasResult<CanvasNode> {
        check_order(order)?;
        let mut tx = self.begin_write().await?;

        require_project(&mut tx, project_id).await?;
        let node = insert_node(&mut tx, project_id, draft, order).await?;

        tx.commit().await?;
        Ok(node)
    }

    async fn append_node(
        &self,
        project_id: ProjectId,
        draft: NodeDraft,
        touched_at: Option<i64>,
    ) -> CanvasResult<CanvasNode> {
        let mut tx = self.begin_write().await?;

        require_project(&mut tx, project_id).await?;
        let (count, max_order) = sqlx::query_as::<_, (i64, Option<i64>)>(
            "SELECT COUNT(*), MAX(sort_order) FROM nodes WHERE project_id = ?",
        )
        .bind(project_id.0)
        .fetch_one(&mut *tx)
        .await?;

        let order = next_order(count as u64, max_order);
        let node = insert_node(&mut tx, project_id, draft, order).await?;
        touch_project(&mut tx, project_id, touched_at).await?;

        tx.commit().await?;
        Ok(node)
    }

    async fn get_node(&self, id: NodeId) -> CanvasResult<Option<CanvasNode>> {
        let mut conn = self.pool.acquire().await?;
        fetch_node(&mut conn, id).await
    }

    async fn update_node(
        &self,
        id: NodeId,
        patch: NodePatch,
        touched_at: Option<i64>,
    ) -> CanvasResult<CanvasNode> {
        if let Some(order) = patch.order {
            check_order(order)?;
        }

        let mut tx = self.begin_write().await?;

        let mut node = fetch_node(&mut tx, id)
            .await?
            .ok_or_else(|| CanvasError::node_not_found(id))?;
        node.apply(patch);

        sqlx::query(
            "UPDATE nodes
             SET sort_order = ?, text = ?, original_text = ?, edited_text = ?, has_edited = ?
             WHERE id = ?",
        )
        .bind(node.order)
        .bind(node.text.as_deref())
        .bind(node.original_text.as_deref())
        .bind(node.edited_text.as_deref())
        .bind(node.has_edited)
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
        touch_project(&mut tx, node.project_id, touched_at).await?;

        tx.commit().await?;
        Ok(node)
    }

    async fn delete_node(
        &self,
        id: NodeId,
        touched_at: Option<i64>,
    ) -> CanvasResult<Option<CanvasNode>> {
        let mut tx = self.begin_write().await?;

        let Some(node) = fetch_node(&mut tx, id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM nodes WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        touch_project(&mut tx, node.project_id, touched_at).await?;

        tx.commit().await?;
        Ok(Some(node))
    }

    async fn list_nodes(&self) -> CanvasResult<Vec<CanvasNode>> {
        let records = sqlx::query_as::<_, NodeRecord>(
            "SELECT id, project_id, node_type, sort_order, text, original_text, edited_text,
                    has_edited, file_data, file_name, url, source_url, source_icon, created_at
             FROM nodes ORDER BY project_id, sort_order",
        )
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(NodeRecord::into_domain).collect()
    }

    async fn list_nodes_by_project(&self, project_id: ProjectId) -> CanvasResult<Vec<CanvasNode>> {
        let records = sqlx::query_as::<_, NodeRecord>(
            "SELECT id, project_id, node_type, sort_order, text, original_text, edited_text,
                    has_edited, file_data, file_name, url, source_url, source_icon, created_at
             FROM nodes WHERE project_id = ? ORDER BY sort_order",
        )
        .bind(project_id.0)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(NodeRecord::into_domain).collect()
    }

    async fn count_nodes_by_project(&self, project_id: ProjectId) -> CanvasResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM nodes WHERE project_id = ?")
            .bind(project_id.0)
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    async fn node_counts(&self) -> CanvasResult<HashMap<ProjectId, u64>> {
        let rows = sqlx::query_as::<_, (i64, i64)>(
            "SELECT project_id, COUNT(*) FROM nodes GROUP BY project_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(project_id, count)| (ProjectId(project_id), count as u64))
            .collect())
    }

    async fn apply_order(
        &self,
        project_id: ProjectId,
        ordered: &[NodeId],
        touched_at: Option<i64>,
    ) -> CanvasResult<()> {
        let mut tx = self.begin_write().await?;

        let current: Vec<NodeId> =
            sqlx::query_scalar::<_, i64>("SELECT id FROM nodes WHERE project_id = ?")
                .bind(project_id.0)
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .map(NodeId)
                .collect();

        check_permutation(&current, ordered)?;
        if ordered.is_empty() {
            return Ok(());
        }

        // Park every row on a distinct negative slot first so that no
        // intermediate write trips the (project_id, sort_order) unique index.
        sqlx::query("UPDATE nodes SET sort_order = -1 - sort_order WHERE project_id = ?")
            .bind(project_id.0)
            .execute(&mut *tx)
            .await?;

        for (position, id) in ordered.iter().enumerate() {
            sqlx::query("UPDATE nodes SET sort_order = ? WHERE id = ? AND project_id = ?")
                .bind(position as i64)
                .bind(id.0)
                .bind(project_id.0)
                .execute(&mut *tx)
                .await?;
        }
        touch_project(&mut tx, project_id, touched_at).await?;

        tx.commit().await?;
        Ok(())
    }
}
