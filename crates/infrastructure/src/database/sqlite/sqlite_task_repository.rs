use async_trait::async_trait;
use orchestrator_core::{models::Task, traits::TaskRepository, OrchestratorError, OrchestratorResult};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

const TASK_COLUMNS: &str = "id, name, description, cron_expression, command, command_type, requirements, status, node_id, created_at, updated_at";

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<Task> {
        Ok(Task {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            cron_expression: row.try_get("cron_expression")?,
            command: row.try_get("command")?,
            command_type: row.try_get("command_type")?,
            requirements: row.try_get("requirements")?,
            status: row.try_get("status")?,
            node_id: row.try_get("node_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task), fields(task_name = %task.name))]
    async fn create(&self, task: &Task) -> OrchestratorResult<Task> {
        let id = sqlx::query(
            r#"
            INSERT INTO tasks (name, description, cron_expression, command, command_type, requirements, status, node_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.name)
        .bind(&task.description)
        .bind(&task.cron_expression)
        .bind(&task.command)
        .bind(task.command_type)
        .bind(&task.requirements)
        .bind(task.status)
        .bind(task.node_id)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        debug!("创建任务成功: {} (ID: {})", task.name, id);
        Ok(Task {
            id,
            ..task.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn list(&self) -> OrchestratorResult<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self, task), fields(task_id = task.id))]
    async fn update(&self, task: &Task) -> OrchestratorResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET name = ?, description = ?, cron_expression = ?, command = ?, command_type = ?,
                requirements = ?, status = ?, node_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.name)
        .bind(&task.description)
        .bind(&task.cron_expression)
        .bind(&task.command)
        .bind(task.command_type)
        .bind(&task.requirements)
        .bind(task.status)
        .bind(task.node_id)
        .bind(task.updated_at)
        .bind(task.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::TaskNotFound { id: task.id });
        }

        debug!("更新任务成功: {} (ID: {})", task.name, task.id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> OrchestratorResult<bool> {
        let mut tx = self.pool.begin().await?;

        let jobs = sqlx::query("DELETE FROM jobs WHERE task_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let tasks = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        debug!("删除任务 {} 及其 {} 条执行记录", id, jobs);
        Ok(tasks > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::{DatabaseManager, SqliteJobRepository};
    use chrono::Utc;
    use orchestrator_core::models::{CommandType, Job, TaskStatus};
    use orchestrator_core::traits::JobRepository;

    fn sample_task(name: &str) -> Task {
        let now = Utc::now();
        Task {
            id: 0,
            name: name.to_string(),
            description: None,
            cron_expression: "*/5 * * * *".to_string(),
            command: "echo hello".to_string(),
            command_type: CommandType::Shell,
            requirements: None,
            status: TaskStatus::Active,
            node_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteTaskRepository::new(db.pool().clone());

        let created = repo.create(&sample_task("report")).await.unwrap();
        assert!(created.id > 0);

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "report");
        assert_eq!(fetched.status, TaskStatus::Active);
        assert_eq!(fetched.command_type, CommandType::Shell);
        assert!(repo.get_by_id(created.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_task() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteTaskRepository::new(db.pool().clone());

        let mut task = sample_task("ghost");
        task.id = 42;
        let err = repo.update(&task).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TaskNotFound { id: 42 }));
    }

    #[tokio::test]
    async fn test_update_persists_all_fields() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteTaskRepository::new(db.pool().clone());

        let mut task = repo.create(&sample_task("etl")).await.unwrap();
        task.status = TaskStatus::Paused;
        task.command_type = CommandType::Python;
        task.requirements = Some("requests==2.31".to_string());
        repo.update(&task).await.unwrap();

        let fetched = repo.get_by_id(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Paused);
        assert_eq!(fetched.command_type, CommandType::Python);
        assert_eq!(fetched.requirements.as_deref(), Some("requests==2.31"));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteTaskRepository::new(db.pool().clone());

        repo.create(&sample_task("first")).await.unwrap();
        repo.create(&sample_task("second")).await.unwrap();

        let tasks = repo.list().await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].name, "second");
    }

    #[tokio::test]
    async fn test_delete_cascades_jobs() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteTaskRepository::new(db.pool().clone());
        let jobs = SqliteJobRepository::new(db.pool().clone());

        let task = repo.create(&sample_task("cleanup")).await.unwrap();
        jobs.create(&Job::new(task.id, Utc::now())).await.unwrap();
        jobs.create(&Job::new(task.id, Utc::now())).await.unwrap();

        assert!(repo.delete(task.id).await.unwrap());
        assert!(repo.get_by_id(task.id).await.unwrap().is_none());
        assert!(jobs.list(Some(task.id)).await.unwrap().is_empty());
        assert!(!repo.delete(task.id).await.unwrap());
    }
}
