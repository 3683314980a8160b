//! 数据仓储层接口定义
//!
//! 每个仓储只负责一个实体：
//! - `TaskRepository` - 任务定义的CRUD，删除时级联删除执行记录
//! - `JobRepository` - 执行记录的创建与一次性关闭
//! - `NodeRepository` - 执行节点的注册、按名称 upsert 与状态维护
//!
//! 所有实现必须是 `Send + Sync`，控制器以 `Arc<dyn ...>` 持有它们。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Job, JobStatus, Node, NodeStatus, Task};
use crate::OrchestratorResult;

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 持久化新任务，返回带有存储分配 id 的记录
    async fn create(&self, task: &Task) -> OrchestratorResult<Task>;

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Task>>;

    /// 按创建时间倒序列出
    async fn list(&self) -> OrchestratorResult<Vec<Task>>;

    /// 整体覆盖已有记录，记录不存在时返回 `TaskNotFound`
    async fn update(&self, task: &Task) -> OrchestratorResult<()>;

    /// 删除任务及其全部执行记录，返回是否确实删除了记录
    async fn delete(&self, id: i64) -> OrchestratorResult<bool>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &Job) -> OrchestratorResult<Job>;

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Job>>;

    /// 按开始时间倒序列出，可按任务过滤
    async fn list(&self, task_id: Option<i64>) -> OrchestratorResult<Vec<Job>>;

    /// 关闭一条运行中的执行记录
    ///
    /// `status` 必须是终态；记录已关闭时返回 `JobAlreadyClosed`。
    async fn close(
        &self,
        id: i64,
        status: JobStatus,
        result: Option<String>,
        error_message: Option<String>,
        end_time: DateTime<Utc>,
    ) -> OrchestratorResult<Job>;
}

#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// 手动登记节点，名称重复时返回校验错误
    async fn create(&self, node: &Node) -> OrchestratorResult<Node>;

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Node>>;

    async fn list(&self) -> OrchestratorResult<Vec<Node>>;

    /// 覆盖地址与状态，记录不存在时返回 `NodeNotFound`
    async fn update(&self, node: &Node) -> OrchestratorResult<()>;

    /// 按名称插入或更新地址，同时把状态置为 `status`、心跳时间置为 `heartbeat`
    ///
    /// 返回最新记录以及是否为新建。
    async fn upsert_by_name(
        &self,
        name: &str,
        host: &str,
        port: u16,
        status: NodeStatus,
        heartbeat: DateTime<Utc>,
    ) -> OrchestratorResult<(Node, bool)>;

    /// 更新状态，`heartbeat` 为 `Some` 时同时刷新心跳时间
    async fn set_status(
        &self,
        id: i64,
        status: NodeStatus,
        heartbeat: Option<DateTime<Utc>>,
    ) -> OrchestratorResult<Node>;

    /// 删除节点，引用它的任务的 node_id 被置空
    async fn delete(&self, id: i64) -> OrchestratorResult<bool>;
}
