use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orchestrator_core::{
    models::{Job, JobStatus},
    traits::JobRepository,
    OrchestratorError, OrchestratorResult,
};
use sqlx::{Row, SqlitePool};
use tracing::debug;

const JOB_COLUMNS: &str = "id, task_id, status, start_time, end_time, result, error_message";

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<Job> {
        Ok(Job {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            status: row.try_get("status")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            result: row.try_get("result")?,
            error_message: row.try_get("error_message")?,
        })
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn create(&self, job: &Job) -> OrchestratorResult<Job> {
        let id = sqlx::query(
            r#"
            INSERT INTO jobs (task_id, status, start_time, end_time, result, error_message)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.task_id)
        .bind(job.status)
        .bind(job.start_time)
        .bind(job.end_time)
        .bind(&job.result)
        .bind(&job.error_message)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        debug!("创建执行记录成功: 任务 {} (ID: {})", job.task_id, id);
        Ok(Job { id, ..job.clone() })
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn list(&self, task_id: Option<i64>) -> OrchestratorResult<Vec<Job>> {
        let rows = match task_id {
            Some(task_id) => {
                sqlx::query(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE task_id = ? ORDER BY start_time DESC, id DESC"
                ))
                .bind(task_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs ORDER BY start_time DESC, id DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn close(
        &self,
        id: i64,
        status: JobStatus,
        result: Option<String>,
        error_message: Option<String>,
        end_time: DateTime<Utc>,
    ) -> OrchestratorResult<Job> {
        if !status.is_terminal() {
            return Err(OrchestratorError::validation(format!(
                "执行记录只能关闭为终态，收到: {status}"
            )));
        }

        let affected = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, end_time = ?, result = ?, error_message = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(status)
        .bind(end_time)
        .bind(&result)
        .bind(&error_message)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return match self.get_by_id(id).await? {
                Some(_) => Err(OrchestratorError::JobAlreadyClosed { id }),
                None => Err(OrchestratorError::JobNotFound { id }),
            };
        }

        debug!("执行记录 {} 已关闭为 {}", id, status);
        self.get_by_id(id)
            .await?
            .ok_or(OrchestratorError::JobNotFound { id })
    }
}
