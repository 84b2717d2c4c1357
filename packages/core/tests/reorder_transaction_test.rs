//! Reorder Transaction Tests
//!
//! End-to-end behaviour of batch reorders through `HierarchyService`:
//! all-or-nothing commits, stale-read detection and bounded write latency.
//! Interleavings with a concurrent writer are forced with `GatedStore`.

#[cfg(test)]
mod reorder_transaction_tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use planboard_core::config::HierarchyConfig;
    use planboard_core::db::{DatabaseError, MemoryStore, NodeStore};
    use planboard_core::models::{
        BatchReorderRequest, CreateNodeParams, NodeKind, NodeWrite, OrderedNode, RankUpdate,
    };
    use planboard_core::services::{HierarchyService, OrderingError};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Barrier;

    /// Store whose batch writes stall before reaching the inner store
    struct SlowStore {
        inner: MemoryStore,
        write_delay: Duration,
    }

    #[async_trait]
    impl NodeStore for SlowStore {
        async fn find_by_id(&self, id: &str) -> Result<Option<OrderedNode>, DatabaseError> {
            self.inner.find_by_id(id).await
        }

        async fn find_many_by_scope(
            &self,
            kind: NodeKind,
            scope_id: &str,
        ) -> Result<Vec<OrderedNode>, DatabaseError> {
            self.inner.find_many_by_scope(kind, scope_id).await
        }

        async fn find_children(&self, parent_id: &str) -> Result<Vec<OrderedNode>, DatabaseError> {
            self.inner.find_children(parent_id).await
        }

        async fn insert(&self, node: OrderedNode) -> Result<OrderedNode, DatabaseError> {
            self.inner.insert(node).await
        }

        async fn update_many(
            &self,
            writes: Vec<NodeWrite>,
        ) -> Result<Vec<OrderedNode>, DatabaseError> {
            tokio::time::sleep(self.write_delay).await;
            self.inner.update_many(writes).await
        }

        async fn delete(&self, id: &str) -> Result<bool, DatabaseError> {
            self.inner.delete(id).await
        }
    }

    /// Store that parks every batch write and delete at `arrive`, then at
    /// `release` if set, before reaching the inner store
    struct GatedStore {
        inner: MemoryStore,
        arrive: Barrier,
        release: Option<Barrier>,
    }

    impl GatedStore {
        /// Writers meet each other at the gate and then race
        fn rendezvous(parties: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                arrive: Barrier::new(parties),
                release: None,
            }
        }

        /// One writer is held until the test has made its own change
        fn held() -> Self {
            Self {
                inner: MemoryStore::new(),
                arrive: Barrier::new(2),
                release: Some(Barrier::new(2)),
            }
        }

        async fn pass(&self) {
            self.arrive.wait().await;
            if let Some(release) = &self.release {
                release.wait().await;
            }
        }

        async fn seed(&self, id: &str, rank: i64) -> Result<()> {
            self.inner
                .insert(OrderedNode::new_with_id(id, NodeKind::Feature, "project-1", id, rank))
                .await?;
            Ok(())
        }

        async fn parents(&self) -> Result<HashMap<String, String>> {
            Ok(self
                .inner
                .find_many_by_scope(NodeKind::Feature, "project-1")
                .await?
                .into_iter()
                .filter_map(|n| n.parent_id.map(|p| (n.id, p)))
                .collect())
        }
    }

    #[async_trait]
    impl NodeStore for GatedStore {
        async fn find_by_id(&self, id: &str) -> Result<Option<OrderedNode>, DatabaseError> {
            self.inner.find_by_id(id).await
        }

        async fn find_many_by_scope(
            &self,
            kind: NodeKind,
            scope_id: &str,
        ) -> Result<Vec<OrderedNode>, DatabaseError> {
            self.inner.find_many_by_scope(kind, scope_id).await
        }

        async fn find_children(&self, parent_id: &str) -> Result<Vec<OrderedNode>, DatabaseError> {
            self.inner.find_children(parent_id).await
        }

        async fn insert(&self, node: OrderedNode) -> Result<OrderedNode, DatabaseError> {
            self.inner.insert(node).await
        }

        async fn update_many(
            &self,
            writes: Vec<NodeWrite>,
        ) -> Result<Vec<OrderedNode>, DatabaseError> {
            self.pass().await;
            self.inner.update_many(writes).await
        }

        async fn delete(&self, id: &str) -> Result<bool, DatabaseError> {
            self.pass().await;
            self.inner.delete(id).await
        }
    }

    async fn seed_features(
        service: &HierarchyService<MemoryStore>,
        names: &[&str],
    ) -> Result<Vec<OrderedNode>> {
        let mut nodes = Vec::new();
        for name in names {
            let params = CreateNodeParams::new("project-1", *name).with_id(name.to_lowercase());
            nodes.push(service.create_node(params).await?);
        }
        Ok(nodes)
    }

    fn ranks(nodes: &[OrderedNode]) -> Vec<(String, i64)> {
        nodes.iter().map(|n| (n.id.clone(), n.rank)).collect()
    }

    #[tokio::test]
    async fn test_batch_request_round_trip() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let service = HierarchyService::new(store, NodeKind::Feature);
        seed_features(&service, &["A", "B", "C"]).await?;

        let request: BatchReorderRequest = serde_json::from_value(serde_json::json!({
            "projectId": "project-1",
            "updates": [{ "id": "a", "order": 300 }, { "id": "c", "order": 100 }]
        }))?;

        let response = service.apply_batch_request(request).await?;

        assert!(response.success);
        assert_eq!(response.updated_count, 2);
        assert_eq!(
            ranks(&response.data),
            vec![
                ("c".to_string(), 100),
                ("b".to_string(), 200),
                ("a".to_string(), 300)
            ]
        );

        let body = serde_json::to_value(&response)?;
        assert_eq!(body["updatedCount"], 2);
        assert_eq!(body["data"][0]["order"], 100);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_pair_rejects_whole_batch() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let service = HierarchyService::new(store, NodeKind::Feature);
        seed_features(&service, &["A", "B", "C"]).await?;
        let before = service.list_scope("project-1").await?;

        let err = service
            .reorder(
                "project-1",
                vec![
                    RankUpdate::new("a", 900),
                    RankUpdate::new("b", 800),
                    RankUpdate::new("missing", 700),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderingError::NotFound { ref ids } if ids == &["missing"]));
        assert!(!err.is_retryable());
        assert_eq!(service.list_scope("project-1").await?, before);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_batch_is_a_retryable_conflict() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let service = HierarchyService::new(store.clone(), NodeKind::Feature);
        seed_features(&service, &["A", "B"]).await?;

        // Another writer bumps "b" to version 2 before this batch commits
        let stale_b = store.find_by_id("b").await?.unwrap();
        service.reorder("project-1", vec![RankUpdate::new("b", 250)]).await?;

        let err: OrderingError = store
            .update_many(vec![
                NodeWrite::new("a", 1).rank(200),
                NodeWrite::new("b", stale_b.version).rank(100),
            ])
            .await
            .unwrap_err()
            .into();

        assert!(matches!(err, OrderingError::Conflict { .. }));
        assert!(err.is_retryable());
        assert_eq!(store.find_by_id("a").await?.unwrap().rank, 100);
        assert_eq!(store.find_by_id("b").await?.unwrap().rank, 250);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_batches_leave_a_consistent_order() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let service = HierarchyService::new(store, NodeKind::Feature);
        seed_features(&service, &["A", "B", "C", "D"]).await?;

        let first = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .reorder(
                        "project-1",
                        vec![RankUpdate::new("a", 400), RankUpdate::new("d", 100)],
                    )
                    .await
            })
        };
        let second = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .reorder(
                        "project-1",
                        vec![RankUpdate::new("b", 300), RankUpdate::new("c", 200)],
                    )
                    .await
            })
        };

        // Disjoint rows: neither batch can invalidate the other
        assert_eq!(first.await??.updated_count, 2);
        assert_eq!(second.await??.updated_count, 2);

        let nodes = service.list_scope("project-1").await?;
        assert_eq!(
            ranks(&nodes),
            vec![
                ("d".to_string(), 100),
                ("c".to_string(), 200),
                ("b".to_string(), 300),
                ("a".to_string(), 400)
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_crossed_reparents_cannot_both_commit() -> Result<()> {
        let store = Arc::new(GatedStore::rendezvous(2));
        store.seed("a", 100).await?;
        store.seed("b", 200).await?;
        let service = HierarchyService::new(store.clone(), NodeKind::Feature);

        // Both cycle checks read the same acyclic state before either writes
        let (a_under_b, b_under_a) = tokio::join!(
            service.reparent("a", Some("b")),
            service.reparent("b", Some("a"))
        );

        let (winner, loser) = match (&a_under_b, &b_under_a) {
            (Ok(_), Err(e)) => ("a", e),
            (Err(e), Ok(_)) => ("b", e),
            other => panic!("exactly one reparent must commit, got {:?}", other),
        };
        assert!(matches!(loser, OrderingError::Conflict { .. }));
        assert!(loser.is_retryable());

        let parents = store.parents().await?;
        assert_eq!(parents.len(), 1, "stored parents: {:?}", parents);
        assert!(parents.contains_key(winner));

        // Retrying the loser now sees the committed parent and refuses the loop
        let (node, parent) = if winner == "a" { ("b", "a") } else { ("a", "b") };
        let err = service.reparent(node, Some(parent)).await.unwrap_err();
        assert!(matches!(err, OrderingError::CircularReference { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_move_conflicts_with_rank_change_after_planning() -> Result<()> {
        let store = Arc::new(GatedStore::held());
        for (id, rank) in [("a", 100), ("b", 200), ("c", 300)] {
            store.seed(id, rank).await?;
        }
        let service = HierarchyService::new(store.clone(), NodeKind::Feature);

        let mover = {
            let service = service.clone();
            tokio::spawn(async move { service.move_up("c").await })
        };

        // move_up(c) has planned c:200, b:300 and is parked at the write
        store.arrive.wait().await;
        store
            .inner
            .update_many(vec![NodeWrite::new("b", 1).rank(150)])
            .await?;
        if let Some(release) = &store.release {
            release.wait().await;
        }

        let err = mover.await?.unwrap_err();
        assert!(matches!(err, OrderingError::Conflict { .. }));
        assert_eq!(store.inner.find_by_id("b").await?.unwrap().rank, 150);
        assert_eq!(store.inner.find_by_id("c").await?.unwrap().rank, 300);
        Ok(())
    }

    #[tokio::test]
    async fn test_move_conflicts_with_change_to_unwritten_sibling() -> Result<()> {
        let store = Arc::new(GatedStore::held());
        for (id, rank) in [("a", 100), ("b", 200), ("c", 300)] {
            store.seed(id, rank).await?;
        }
        let service = HierarchyService::new(store.clone(), NodeKind::Feature);

        let mover = {
            let service = service.clone();
            tokio::spawn(async move { service.move_up("c").await })
        };

        // "a" jumps between b and c; swapping b and c is no longer a one-step move
        store.arrive.wait().await;
        store
            .inner
            .update_many(vec![NodeWrite::new("a", 1).rank(250)])
            .await?;
        if let Some(release) = &store.release {
            release.wait().await;
        }

        let err = mover.await?.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.inner.find_by_id("b").await?.unwrap().rank, 200);
        assert_eq!(store.inner.find_by_id("c").await?.unwrap().rank, 300);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_refused_when_child_arrives_after_check() -> Result<()> {
        let store = Arc::new(GatedStore::held());
        store.seed("p", 100).await?;
        let service = HierarchyService::new(store.clone(), NodeKind::Feature);

        let deleter = {
            let service = service.clone();
            tokio::spawn(async move { service.delete_node("p").await })
        };

        store.arrive.wait().await;
        store
            .inner
            .insert(
                OrderedNode::new_with_id("child", NodeKind::Feature, "project-1", "child", 100)
                    .with_parent("p"),
            )
            .await?;
        if let Some(release) = &store.release {
            release.wait().await;
        }

        let err = deleter.await?.unwrap_err();
        assert!(matches!(err, OrderingError::HierarchyViolation(_)));
        assert!(store.inner.find_by_id("p").await?.is_some());
        assert_eq!(store.parents().await?.get("child").map(String::as_str), Some("p"));
        Ok(())
    }

    #[tokio::test]
    async fn test_write_timeout_reports_unknown_outcome() -> Result<()> {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            write_delay: Duration::from_millis(500),
        });
        for (id, rank) in [("a", 100), ("b", 200)] {
            store
                .insert(OrderedNode::new_with_id(id, NodeKind::Feature, "project-1", id, rank))
                .await?;
        }

        let config = HierarchyConfig {
            store_timeout_ms: Some(20),
            ..HierarchyConfig::default()
        };
        let service = HierarchyService::with_config(store, NodeKind::Feature, config)?;

        let err = service
            .reorder(
                "project-1",
                vec![RankUpdate::new("a", 200), RankUpdate::new("b", 100)],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderingError::OutcomeUnknown { .. }));
        assert!(!err.is_retryable());
        Ok(())
    }

    #[tokio::test]
    async fn test_service_works_over_trait_object() -> Result<()> {
        let store: Arc<dyn NodeStore> = Arc::new(MemoryStore::new());
        let service = HierarchyService::new(store, NodeKind::RoadMapItem);

        let q1 = service
            .create_node(CreateNodeParams::new("board", "Q1"))
            .await?;
        let q2 = service
            .create_node(CreateNodeParams::new("board", "Q2"))
            .await?;
        service.move_down(&q1.id).await?;

        let order: Vec<String> = service
            .list_scope("board")
            .await?
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(order, vec![q2.id, q1.id]);
        Ok(())
    }
}
