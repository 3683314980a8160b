use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orchestrator_core::{
    models::{Node, NodeStatus},
    traits::NodeRepository,
    OrchestratorError, OrchestratorResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

const NODE_COLUMNS: &str = "id, name, host, port, status, last_heartbeat, created_at, updated_at";

pub struct SqliteNodeRepository {
    pool: SqlitePool,
}

impl SqliteNodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_node(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<Node> {
        let port: i64 = row.try_get("port")?;
        let port = u16::try_from(port)
            .map_err(|_| OrchestratorError::internal(format!("节点端口超出范围: {port}")))?;

        Ok(Node {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            host: row.try_get("host")?,
            port,
            status: row.try_get("status")?,
            last_heartbeat: row.try_get("last_heartbeat")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn fetch_by_id(
        executor: impl sqlx::SqliteExecutor<'_>,
        id: i64,
    ) -> OrchestratorResult<Option<Node>> {
        let row = sqlx::query(&format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?"))
            .bind(id)
            .fetch_optional(executor)
            .await?;

        row.as_ref().map(Self::row_to_node).transpose()
    }
}

#[async_trait]
impl NodeRepository for SqliteNodeRepository {
    #[instrument(skip(self, node), fields(node_name = %node.name))]
    async fn create(&self, node: &Node) -> OrchestratorResult<Node> {
        let result = sqlx::query(
            r#"
            INSERT INTO nodes (name, host, port, status, last_heartbeat, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&node.name)
        .bind(&node.host)
        .bind(i64::from(node.port))
        .bind(node.status)
        .bind(node.last_heartbeat)
        .bind(node.created_at)
        .bind(node.updated_at)
        .execute(&self.pool)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(OrchestratorError::validation(format!(
                    "节点名称已存在: {}",
                    node.name
                )));
            }
            Err(e) => return Err(e.into()),
        };

        debug!("登记执行节点成功: {} (ID: {})", node.name, id);
        Ok(Node {
            id,
            ..node.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Node>> {
        Self::fetch_by_id(&self.pool, id).await
    }

    async fn list(&self) -> OrchestratorResult<Vec<Node>> {
        let rows = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_node).collect()
    }

    #[instrument(skip(self, node), fields(node_id = node.id))]
    async fn update(&self, node: &Node) -> OrchestratorResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET host = ?, port = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&node.host)
        .bind(i64::from(node.port))
        .bind(node.status)
        .bind(node.updated_at)
        .bind(node.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NodeNotFound { id: node.id });
        }

        debug!("更新节点成功: {} (ID: {})", node.name, node.id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn upsert_by_name(
        &self,
        name: &str,
        host: &str,
        port: u16,
        status: NodeStatus,
        heartbeat: DateTime<Utc>,
    ) -> OrchestratorResult<(Node, bool)> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM nodes WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO nodes (name, host, port, status, last_heartbeat, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                host = excluded.host,
                port = excluded.port,
                status = excluded.status,
                last_heartbeat = excluded.last_heartbeat,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(host)
        .bind(i64::from(port))
        .bind(status)
        .bind(heartbeat)
        .bind(heartbeat)
        .bind(heartbeat)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!("SELECT {NODE_COLUMNS} FROM nodes WHERE name = ?"))
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;
        let node = Self::row_to_node(&row)?;

        tx.commit().await?;

        Ok((node, existing.is_none()))
    }

    #[instrument(skip(self))]
    async fn set_status(
        &self,
        id: i64,
        status: NodeStatus,
        heartbeat: Option<DateTime<Utc>>,
    ) -> OrchestratorResult<Node> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET status = ?, last_heartbeat = COALESCE(?, last_heartbeat), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(heartbeat)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NodeNotFound { id });
        }

        debug!("节点 {} 状态更新为 {}", id, status);
        Self::fetch_by_id(&self.pool, id)
            .await?
            .ok_or(OrchestratorError::NodeNotFound { id })
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> OrchestratorResult<bool> {
        let mut tx = self.pool.begin().await?;

        let detached = sqlx::query("UPDATE tasks SET node_id = NULL WHERE node_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let deleted = sqlx::query("DELETE FROM nodes WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        debug!("删除节点 {}，解除了 {} 个任务的分配", id, detached);
        Ok(deleted > 0)
    }
}
