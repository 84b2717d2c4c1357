//! libsql Store Integration Tests
//!
//! Runs `HierarchyService` against a real on-disk libsql database to verify
//! that batch reorders are atomic, that reparenting is cycle guarded, and
//! that data survives reopening the database.

#[cfg(test)]
mod libsql_store_tests {
    use anyhow::Result;
    use planboard_core::db::{DatabaseService, LibsqlStore, NodeStore};
    use planboard_core::models::{CreateNodeParams, NodeKind, RankUpdate};
    use planboard_core::services::{HierarchyService, OrderingError};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn open_store(path: PathBuf) -> Result<Arc<LibsqlStore>> {
        let db = DatabaseService::new(path).await?;
        Ok(Arc::new(LibsqlStore::new(Arc::new(db))))
    }

    /// Helper to create test service on a fresh database
    async fn create_test_service(
        kind: NodeKind,
    ) -> Result<(HierarchyService<LibsqlStore>, TempDir)> {
        let temp_dir = TempDir::new()?;
        let store = open_store(temp_dir.path().join("test.db")).await?;
        Ok((HierarchyService::new(store, kind), temp_dir))
    }

    async fn create_chain(
        service: &HierarchyService<LibsqlStore>,
        scope: &str,
        ids: &[&str],
    ) -> Result<()> {
        let mut parent: Option<&str> = None;
        for id in ids {
            let mut params = CreateNodeParams::new(scope, id.to_uppercase()).with_id(*id);
            if let Some(parent_id) = parent {
                params = params.with_parent(parent_id);
            }
            service.create_node(params).await?;
            parent = Some(*id);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_move_up_persists_swapped_ranks() -> Result<()> {
        let (service, _temp) = create_test_service(NodeKind::Feature).await?;
        for id in ["a", "b", "c"] {
            service
                .create_node(CreateNodeParams::new("project-1", id).with_id(id))
                .await?;
        }

        let outcome = service.move_up("c").await?;

        let order: Vec<(&str, i64)> = outcome
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), n.rank))
            .collect();
        assert_eq!(order, vec![("a", 100), ("c", 200), ("b", 300)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_rank_batch_leaves_database_untouched() -> Result<()> {
        let (service, _temp) = create_test_service(NodeKind::Feature).await?;
        for id in ["a", "b", "c"] {
            service
                .create_node(CreateNodeParams::new("project-1", id).with_id(id))
                .await?;
        }
        let before = service.list_scope("project-1").await?;

        let err = service
            .reorder(
                "project-1",
                vec![
                    RankUpdate::new("a", 50),
                    RankUpdate::new("b", 300),
                    RankUpdate::new("c", 300),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderingError::DuplicateRank { rank: 300, .. }));
        assert_eq!(service.list_scope("project-1").await?, before);
        Ok(())
    }

    #[tokio::test]
    async fn test_reparent_into_descendant_is_rejected() -> Result<()> {
        let (service, _temp) = create_test_service(NodeKind::Feature).await?;
        // root -> a -> b -> c
        create_chain(&service, "project-1", &["root", "a", "b", "c"]).await?;

        let err = service.reparent("a", Some("c")).await.unwrap_err();
        assert!(matches!(err, OrderingError::CircularReference { .. }));

        let a = service.get_node("a").await?;
        assert_eq!(a.parent_id.as_deref(), Some("root"));
        assert_eq!(a.version, 1);

        // Moving the leaf to the top is fine
        let c = service.reparent("c", None).await?;
        assert_eq!(c.parent_id, None);
        assert_eq!(c.rank, 200);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_with_children_is_refused() -> Result<()> {
        let (service, _temp) = create_test_service(NodeKind::Feature).await?;
        create_chain(&service, "project-1", &["parent", "child"]).await?;

        let err = service.delete_node("parent").await.unwrap_err();
        assert!(matches!(err, OrderingError::HierarchyViolation(_)));

        service.delete_node("child").await?;
        service.delete_node("parent").await?;
        assert!(service.list_scope("project-1").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_reorders_serialize() -> Result<()> {
        let (service, _temp) = create_test_service(NodeKind::File).await?;
        for id in ["f1", "f2", "f3", "f4"] {
            service
                .create_node(CreateNodeParams::new("project-1", id).with_id(id))
                .await?;
        }

        let mut handles = Vec::new();
        for batch in [
            vec![RankUpdate::new("f1", 400), RankUpdate::new("f4", 100)],
            vec![RankUpdate::new("f2", 300), RankUpdate::new("f3", 200)],
        ] {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.reorder("project-1", batch).await
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await? {
                assert!(e.is_retryable(), "unexpected error: {:?}", e);
            }
        }

        let nodes = service.list_scope("project-1").await?;
        assert_eq!(nodes.len(), 4);
        for node in &nodes {
            assert!(node.rank > 0);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_state_survives_reopen() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("planboard.db");

        {
            let store = open_store(db_path.clone()).await?;
            let service = HierarchyService::new(store, NodeKind::RoadMapItem);
            create_chain(&service, "board", &["epic", "story"]).await?;
            service.normalize_scope("board").await?;
        }

        let store = open_store(db_path).await?;
        let story = store.find_by_id("story").await?.expect("story persisted");
        assert_eq!(story.kind, NodeKind::RoadMapItem);
        assert_eq!(story.parent_id.as_deref(), Some("epic"));

        let service = HierarchyService::new(store, NodeKind::RoadMapItem);
        let tree = service.get_tree("board").await?;
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children[0].node.id, "story");
        Ok(())
    }
}
