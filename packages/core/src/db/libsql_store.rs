//! libsql-backed `NodeStore`
//!
//! Each batch runs inside `BEGIN IMMEDIATE` … `COMMIT`, so the write lock is
//! taken before the first row is read and a concurrent reorder in the same
//! database waits (up to the busy timeout) instead of interleaving. Every row
//! update is additionally guarded by `WHERE version = ?`.

use crate::db::{DatabaseError, DatabaseService, NodeStore};
use crate::models::{NodeKind, NodeWrite, OrderedNode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const NODE_COLUMNS: &str =
    "id, kind, scope_id, parent_id, rank, dev_rank, name, version, created_at, modified_at";

#[derive(Debug, Clone)]
pub struct LibsqlStore {
    db: Arc<DatabaseService>,
}

impl LibsqlStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    async fn query_nodes(
        conn: &libsql::Connection,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<OrderedNode>, DatabaseError> {
        let mut rows = conn.query(sql, params).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute query: {}", e))
        })?;

        let mut nodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            nodes.push(row_to_node(&row)?);
        }
        Ok(nodes)
    }

    async fn rollback(conn: &libsql::Connection) {
        if let Err(e) = conn.execute("ROLLBACK", ()).await {
            tracing::error!("Failed to roll back ordered node transaction: {}", e);
        }
    }

    /// Body of `update_many`, run after `BEGIN IMMEDIATE`. Any error leaves
    /// the transaction open for the caller to roll back.
    async fn apply_writes(
        conn: &libsql::Connection,
        writes: &[NodeWrite],
    ) -> Result<Vec<OrderedNode>, DatabaseError> {
        let now = Utc::now();
        let modified_at = now.to_rfc3339();
        let mut written = Vec::with_capacity(writes.len());

        for write in writes {
            let mut node = Self::query_nodes(
                conn,
                &format!("SELECT {} FROM ordered_nodes WHERE id = ?", NODE_COLUMNS),
                [write.id.as_str()],
            )
            .await?
            .pop()
            .ok_or_else(|| DatabaseError::node_not_found(&write.id))?;

            if node.version != write.expected_version {
                return Err(DatabaseError::version_conflict(
                    &write.id,
                    write.expected_version,
                    node.version,
                ));
            }

            if write.check_only {
                continue;
            }

            write.apply_to(&mut node, now);

            let affected = conn
                .execute(
                    "UPDATE ordered_nodes
                     SET parent_id = ?, rank = ?, dev_rank = ?, version = ?, modified_at = ?
                     WHERE id = ? AND version = ?",
                    libsql::params![
                        node.parent_id.as_deref(),
                        node.rank,
                        node.dev_rank,
                        node.version,
                        modified_at.as_str(),
                        node.id.as_str(),
                        write.expected_version,
                    ],
                )
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to update node {}: {}", write.id, e))
                })?;

            if affected != 1 {
                return Err(DatabaseError::version_conflict(
                    &write.id,
                    write.expected_version,
                    write.expected_version + 1,
                ));
            }

            written.push(node);
        }

        Ok(written)
    }
}

fn parse_timestamp(id: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::corrupt_row(id, format!("bad timestamp '{}': {}", value, e)))
}

fn row_to_node(row: &libsql::Row) -> Result<OrderedNode, DatabaseError> {
    let id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let kind = kind
        .parse::<NodeKind>()
        .map_err(|e| DatabaseError::corrupt_row(&id, e.to_string()))?;
    let created_at: String = row.get(8)?;
    let modified_at: String = row.get(9)?;

    Ok(OrderedNode {
        kind,
        scope_id: row.get(2)?,
        parent_id: row.get::<Option<String>>(3)?,
        rank: row.get(4)?,
        dev_rank: row.get::<Option<i64>>(5)?,
        name: row.get(6)?,
        version: row.get(7)?,
        created_at: parse_timestamp(&id, &created_at)?,
        modified_at: parse_timestamp(&id, &modified_at)?,
        id,
    })
}

#[async_trait]
impl NodeStore for LibsqlStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<OrderedNode>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut nodes = Self::query_nodes(
            &conn,
            &format!("SELECT {} FROM ordered_nodes WHERE id = ?", NODE_COLUMNS),
            [id],
        )
        .await?;
        Ok(nodes.pop())
    }

    async fn find_many_by_scope(
        &self,
        kind: NodeKind,
        scope_id: &str,
    ) -> Result<Vec<OrderedNode>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        Self::query_nodes(
            &conn,
            &format!(
                "SELECT {} FROM ordered_nodes WHERE kind = ? AND scope_id = ?",
                NODE_COLUMNS
            ),
            [kind.as_str(), scope_id],
        )
        .await
    }

    async fn find_children(&self, parent_id: &str) -> Result<Vec<OrderedNode>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        Self::query_nodes(
            &conn,
            &format!(
                "SELECT {} FROM ordered_nodes WHERE parent_id = ?",
                NODE_COLUMNS
            ),
            [parent_id],
        )
        .await
    }

    async fn insert(&self, node: OrderedNode) -> Result<OrderedNode, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;

        if self.find_by_id(&node.id).await?.is_some() {
            return Err(DatabaseError::duplicate_id(node.id));
        }

        conn.execute(
            "INSERT INTO ordered_nodes (id, kind, scope_id, parent_id, rank, dev_rank, name, version, created_at, modified_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                node.id.as_str(),
                node.kind.as_str(),
                node.scope_id.as_str(),
                node.parent_id.as_deref(),
                node.rank,
                node.dev_rank,
                node.name.as_str(),
                node.version,
                node.created_at.to_rfc3339(),
                node.modified_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| {
            let message = e.to_string();
            if message.contains("UNIQUE constraint failed") {
                DatabaseError::duplicate_id(node.id.clone())
            } else if message.contains("FOREIGN KEY constraint failed") {
                DatabaseError::node_not_found(node.parent_id.clone().unwrap_or_default())
            } else {
                DatabaseError::sql_execution(format!("Failed to insert node {}: {}", node.id, message))
            }
        })?;

        Ok(node)
    }

    async fn update_many(&self, writes: Vec<NodeWrite>) -> Result<Vec<OrderedNode>, DatabaseError> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.db.connect_with_timeout().await?;

        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;

        let written = match Self::apply_writes(&conn, &writes).await {
            Ok(written) => written,
            Err(e) => {
                Self::rollback(&conn).await;
                return Err(e);
            }
        };

        if let Err(e) = conn.execute("COMMIT", ()).await {
            Self::rollback(&conn).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }

        Ok(written)
    }

    async fn delete(&self, id: &str) -> Result<bool, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let affected = match conn
            .execute("DELETE FROM ordered_nodes WHERE id = ?", [id])
            .await
        {
            Ok(affected) => affected,
            Err(e) if e.to_string().contains("FOREIGN KEY constraint failed") => {
                let children = self.find_children(id).await?.len();
                return Err(DatabaseError::has_children(id, children));
            }
            Err(e) => {
                return Err(DatabaseError::sql_execution(format!(
                    "Failed to delete node {}: {}",
                    id, e
                )))
            }
        };
        Ok(affected > 0)
    }
}
