use canvas_core::domain::{NewProject, NodeDraft, NodeId, ProjectId, ProjectType};
use canvas_core::store::CanvasRepository;
use canvas_core::store::memory::MemoryStore;
use canvas_core::{CanvasManager, CanvasResult, ErrorKind, StoreConfig};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// Helper: a manager over a fresh SQLite file
async fn sqlite_manager(tmpdir: &TempDir) -> CanvasResult<CanvasManager> {
    let path = tmpdir.path().join(format!("canvas_{}.db", Uuid::new_v4()));
    CanvasManager::open(&StoreConfig::at(path)).await
}

async fn orders(manager: &CanvasManager, project: ProjectId) -> CanvasResult<Vec<(NodeId, i64)>> {
    Ok(manager
        .list_nodes(project)
        .await?
        .into_iter()
        .map(|n| (n.id, n.order))
        .collect())
}

#[tokio::test]
async fn appends_get_dense_orders() -> CanvasResult<()> {
    let tmpdir = TempDir::new()?;
    let manager = sqlite_manager(&tmpdir).await?;
    let project = manager.create_project("Board", ProjectType::Canvas).await?;

    manager.capture_text(project.id, "one", None, None).await?;
    manager
        .capture_image(project.id, vec![1, 2, 3], "pic.png", None)
        .await?;
    manager
        .capture_link(project.id, "https://example.com", Some("Example".into()), None)
        .await?;
    manager.capture_text(project.id, "four", None, None).await?;

    let got: Vec<i64> = orders(&manager, project.id).await?.into_iter().map(|(_, o)| o).collect();
    assert_eq!(got, vec![0, 1, 2, 3]);
    assert_eq!(manager.count_nodes(project.id).await?, 4);

    Ok(())
}

#[tokio::test]
async fn concurrent_appends_never_share_an_order() -> CanvasResult<()> {
    let tmpdir = TempDir::new()?;
    let manager = Arc::new(sqlite_manager(&tmpdir).await?);
    let project_id = manager.create_project("Busy", ProjectType::Canvas).await?.id;

    let mut handles = Vec::new();
    for i in 0..12 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            manager
                .capture_text(project_id, &format!("snippet {i}"), None, None)
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("append task panicked")?;
    }

    let mut got: Vec<i64> = orders(&manager, project_id).await?.into_iter().map(|(_, o)| o).collect();
    got.sort();
    assert_eq!(got, (0..12).collect::<Vec<_>>());

    Ok(())
}

#[tokio::test]
async fn append_to_missing_project_is_not_found() -> CanvasResult<()> {
    let tmpdir = TempDir::new()?;
    let manager = sqlite_manager(&tmpdir).await?;

    let err = manager
        .append_node(ProjectId(99), NodeDraft::text("orphan", None, None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    Ok(())
}

#[tokio::test]
async fn reorder_applies_positions_and_is_idempotent() -> CanvasResult<()> {
    let tmpdir = TempDir::new()?;
    let manager = sqlite_manager(&tmpdir).await?;
    let project = manager.create_project("Board", ProjectType::Canvas).await?;

    let a = manager.capture_text(project.id, "a", None, None).await?;
    let b = manager.capture_text(project.id, "b", None, None).await?;
    let c = manager.capture_text(project.id, "c", None, None).await?;

    let wanted = [c.id, a.id, b.id];
    manager.reorder(project.id, &wanted).await?;
    let once = orders(&manager, project.id).await?;
    assert_eq!(once, vec![(c.id, 0), (a.id, 1), (b.id, 2)]);

    manager.reorder(project.id, &wanted).await?;
    assert_eq!(orders(&manager, project.id).await?, once);

    Ok(())
}

#[tokio::test]
async fn bad_permutations_leave_orders_untouched() -> CanvasResult<()> {
    let tmpdir = TempDir::new()?;
    let manager = sqlite_manager(&tmpdir).await?;
    let project = manager.create_project("Board", ProjectType::Canvas).await?;
    let other = manager.create_project("Other", ProjectType::Canvas).await?;

    let a = manager.capture_text(project.id, "a", None, None).await?;
    let b = manager.capture_text(project.id, "b", None, None).await?;
    let c = manager.capture_text(project.id, "c", None, None).await?;
    let stranger = manager.capture_text(other.id, "x", None, None).await?;

    let before = orders(&manager, project.id).await?;

    let bad_lists = [
        vec![a.id, b.id],                    // missing
        vec![a.id, b.id, b.id],              // duplicate
        vec![a.id, b.id, stranger.id],       // foreign
        vec![a.id, b.id, c.id, stranger.id], // extra
    ];
    for bad in bad_lists {
        let err = manager.reorder(project.id, &bad).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{bad:?}");
        assert_eq!(orders(&manager, project.id).await?, before);
    }

    Ok(())
}

#[tokio::test]
async fn reorder_missing_project_is_not_found() -> CanvasResult<()> {
    let tmpdir = TempDir::new()?;
    let manager = sqlite_manager(&tmpdir).await?;

    let err = manager.reorder(ProjectId(5), &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    Ok(())
}

#[tokio::test]
async fn delete_keeps_gaps_and_next_append_stays_unique() -> CanvasResult<()> {
    let tmpdir = TempDir::new()?;
    let manager = sqlite_manager(&tmpdir).await?;
    let project = manager.create_project("Board", ProjectType::Canvas).await?;

    let a = manager.capture_text(project.id, "a", None, None).await?;
    let b = manager.capture_text(project.id, "b", None, None).await?;
    let c = manager.capture_text(project.id, "c", None, None).await?;

    let removed = manager.delete_node(a.id).await?;
    assert_eq!(removed.id, a.id);

    // no renumbering after a delete
    assert_eq!(orders(&manager, project.id).await?, vec![(b.id, 1), (c.id, 2)]);

    let d = manager.capture_text(project.id, "d", None, None).await?;
    assert_eq!(d.order, 3);

    let listed: Vec<_> = manager
        .list_nodes(project.id)
        .await?
        .into_iter()
        .map(|n| n.text.unwrap_or_default())
        .collect();
    assert_eq!(listed, vec!["b", "c", "d"]);

    // a full permutation closes the gaps again
    manager.reorder(project.id, &[b.id, c.id, d.id]).await?;
    let dense: Vec<i64> = orders(&manager, project.id).await?.into_iter().map(|(_, o)| o).collect();
    assert_eq!(dense, vec![0, 1, 2]);

    Ok(())
}

#[tokio::test]
async fn delete_missing_node_is_not_found() -> CanvasResult<()> {
    let tmpdir = TempDir::new()?;
    let manager = sqlite_manager(&tmpdir).await?;

    let err = manager.delete_node(NodeId(1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    Ok(())
}

#[tokio::test]
async fn restore_puts_deleted_node_back_at_the_end() -> CanvasResult<()> {
    let tmpdir = TempDir::new()?;
    let manager = sqlite_manager(&tmpdir).await?;
    let project = manager.create_project("Board", ProjectType::Canvas).await?;

    let a = manager
        .capture_text(project.id, "captured", Some("https://src.example".into()), None)
        .await?;
    manager.update_text_node(a.id, "edited").await?;
    let b = manager.capture_text(project.id, "b", None, None).await?;

    let removed = manager.delete_node(a.id).await?;
    let restored = manager.restore_node(removed.clone()).await?;

    assert_ne!(restored.id, a.id);
    assert!(restored.order > b.order);
    assert_eq!(restored.created_at, removed.created_at);
    assert_eq!(restored.source_url.as_deref(), Some("https://src.example"));
    assert_eq!(restored.original_text.as_deref(), Some("captured"));
    assert_eq!(restored.text.as_deref(), Some("edited"));
    assert!(restored.has_edited);
    assert_eq!(manager.count_nodes(project.id).await?, 2);

    Ok(())
}

#[tokio::test]
async fn node_changes_bump_project_updated_at() -> CanvasResult<()> {
    let tmpdir = TempDir::new()?;
    let manager = sqlite_manager(&tmpdir).await?;
    let project = manager.create_project("Board", ProjectType::Canvas).await?;

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    manager.capture_text(project.id, "fresh", None, None).await?;

    let after = manager.get_project(project.id).await?;
    assert!(after.updated_at > project.updated_at);

    Ok(())
}

#[tokio::test]
async fn node_change_and_timestamp_are_one_write() -> CanvasResult<()> {
    let store = Arc::new(MemoryStore::new());
    let manager = CanvasManager::new(store.clone());
    let project_id = store
        .create_project(NewProject {
            name: "Board".into(),
            project_type: ProjectType::Canvas,
            updated_at: 0,
            file_handle: None,
        })
        .await?;

    let writes = store.write_count();
    let a = manager.capture_text(project_id, "a", None, None).await?;
    assert_eq!(store.write_count(), writes + 1);
    let stamped = manager.get_project(project_id).await?.updated_at;
    assert!(stamped > 0);

    let b = manager.capture_text(project_id, "b", None, None).await?;
    manager.update_text_node(a.id, "a2").await?;
    manager.reorder(project_id, &[b.id, a.id]).await?;
    manager.delete_node(b.id).await?;
    assert_eq!(store.write_count(), writes + 5);
    assert!(manager.get_project(project_id).await?.updated_at >= stamped);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_work_across_projects_runs_concurrently() -> CanvasResult<()> {
    let tmpdir = TempDir::new()?;
    let manager = Arc::new(sqlite_manager(&tmpdir).await?);

    let mut project_ids = Vec::new();
    for i in 0..6 {
        let project = manager
            .create_project(&format!("Board {i}"), ProjectType::Canvas)
            .await?;
        manager.capture_text(project.id, "seed", None, None).await?;
        project_ids.push(project.id);
    }

    let mut handles = Vec::new();
    for &project_id in &project_ids {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            for round in 0..8 {
                let node = manager
                    .capture_text(project_id, &format!("round {round}"), None, None)
                    .await?;
                manager
                    .update_text_node(node.id, &format!("round {round}, edited"))
                    .await?;

                let mut ids: Vec<NodeId> = manager
                    .list_nodes(project_id)
                    .await?
                    .into_iter()
                    .map(|n| n.id)
                    .collect();
                ids.reverse();
                manager.reorder(project_id, &ids).await?;
            }
            CanvasResult::Ok(())
        }));
    }
    for handle in handles {
        handle.await.expect("worker task panicked")?;
    }

    for project_id in project_ids {
        let got = orders(&manager, project_id).await?;
        assert_eq!(got.len(), 9);

        let unique: HashSet<i64> = got.iter().map(|(_, o)| *o).collect();
        assert_eq!(unique.len(), got.len(), "project {project_id}: {got:?}");
    }

    Ok(())
}
