pub mod sqlite_job_repository;
pub mod sqlite_node_repository;
pub mod sqlite_task_repository;

pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_node_repository::SqliteNodeRepository;
pub use sqlite_task_repository::SqliteTaskRepository;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use orchestrator_core::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

const SCHEMA: &str = include_str!("schema.sql");

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("解析数据库URL失败: {}", config.url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(1800))
            .connect_with(connect_options)
            .await
            .context("创建数据库连接池失败")?;

        Ok(Self { pool })
    }

    /// 单连接的内存数据库，用于测试和临时运行
    pub async fn in_memory() -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("解析内存数据库URL失败")?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .context("创建内存数据库失败")?;

        let manager = Self { pool };
        manager.migrate().await?;
        Ok(manager)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 建表（幂等）
    pub async fn migrate(&self) -> Result<()> {
        info!("运行SQLite数据库迁移");
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("执行迁移语句失败: {statement}"))?;
        }
        info!("数据库迁移完成");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
