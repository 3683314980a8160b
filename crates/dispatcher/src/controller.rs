//! 编排控制器
//!
//! 串联状态机检查、节点注册表查询和节点下发，并把结果落到任务/执行记录上。
//! 同一任务的所有修改类用例通过 [`TaskLocks`] 串行执行。

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use chrono::Utc;
use orchestrator_core::{
    models::{
        Job, JobStatus, NewTask, Node, NodeStatus, NodeSummary, Task, TaskPatch, TaskStatus,
        UpdateValue,
    },
    traits::{JobRepository, TaskRepository},
    OrchestratorError, OrchestratorResult,
};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::dispatch_client::{DispatchAction, DispatchClient, HealthResult, TaskPayload};
use crate::node_registry::NodeRegistry;
use crate::state_machine::{TaskAction, TaskStateMachine};

/// 立即执行被节点接受时写入执行记录的结果
pub const EXECUTE_ACCEPTED_MESSAGE: &str = "任务执行已启动";

type LockMap = Arc<StdMutex<HashMap<i64, Arc<Mutex<()>>>>>;

/// 按任务 id 分配的异步互斥锁
///
/// 条目在最后一个持有者释放时移除，映射表只包含正在被使用的任务。
#[derive(Default)]
pub struct TaskLocks {
    locks: LockMap,
}

impl TaskLocks {
    pub async fn acquire(&self, task_id: i64) -> TaskLockGuard {
        let lock = {
            let mut locks = lock_map(&self.locks);
            Arc::clone(locks.entry(task_id).or_default())
        };
        // 等待中被取消时 acquiring 先于 guard 释放，guard 仍能清理条目
        let mut guard = TaskLockGuard {
            task_id,
            locks: Arc::clone(&self.locks),
            guard: None,
        };
        let acquiring = lock.lock_owned();
        guard.guard = Some(acquiring.await);
        guard
    }

    /// 当前登记的任务锁数量
    pub fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 持有期间同一任务的其他修改类用例会等待
pub struct TaskLockGuard {
    task_id: i64,
    locks: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TaskLockGuard {
    fn drop(&mut self) {
        // 先释放互斥锁，再在映射表锁内判断是否还有等待者
        drop(self.guard.take());
        let mut locks = lock_map(&self.locks);
        if let Some(lock) = locks.get(&self.task_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&self.task_id);
            }
        }
    }
}

fn lock_map(locks: &LockMap) -> MutexGuard<'_, HashMap<i64, Arc<Mutex<()>>>> {
    locks.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Success,
    PartialSuccess,
}

/// assign-node 的结果
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentReport {
    pub status: AssignmentStatus,
    pub message: String,
    pub node: NodeSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// redeploy 的结果
#[derive(Debug, Clone, Serialize)]
pub struct RedeployReport {
    pub task_id: i64,
    pub node: NodeSummary,
    pub started: bool,
}

/// 节点健康检查的结果
#[derive(Debug, Clone, Serialize)]
pub struct NodeHealthReport {
    pub node: Node,
    pub health: HealthResult,
    pub healthy: bool,
}

/// 一次更新前后的任务快照
#[derive(Debug, Clone)]
pub struct TaskChange {
    pub before: Task,
    pub after: Task,
}

impl TaskChange {
    pub fn node_changed(&self) -> bool {
        self.before.node_id != self.after.node_id
    }

    /// 是否需要把新定义同步到节点
    pub fn requires_dispatch(&self) -> bool {
        self.after.node_id.is_some()
            && (self.node_changed() || self.before.definition_differs(&self.after))
    }
}

/// 尽力而为的部署结果
#[derive(Debug, Default)]
struct Deployment {
    accepted: bool,
    started: bool,
    error: Option<String>,
}

pub struct OrchestrationController {
    task_repo: Arc<dyn TaskRepository>,
    job_repo: Arc<dyn JobRepository>,
    registry: Arc<NodeRegistry>,
    client: Arc<DispatchClient>,
    locks: TaskLocks,
    span: Span,
}

impl OrchestrationController {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        job_repo: Arc<dyn JobRepository>,
        registry: Arc<NodeRegistry>,
        client: Arc<DispatchClient>,
        span: Span,
    ) -> Self {
        Self {
            task_repo,
            job_repo,
            registry,
            client,
            locks: TaskLocks::default(),
            span,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    fn use_case_span(&self, use_case: &'static str, task_id: i64) -> Span {
        info_span!(parent: &self.span, "use_case", use_case, task_id)
    }

    // ---- 读取 ----

    pub async fn get_task(&self, task_id: i64) -> OrchestratorResult<Task> {
        self.task_repo
            .get_by_id(task_id)
            .await?
            .ok_or(OrchestratorError::TaskNotFound { id: task_id })
    }

    pub async fn list_tasks(&self) -> OrchestratorResult<Vec<Task>> {
        self.task_repo.list().await
    }

    pub async fn get_job(&self, job_id: i64) -> OrchestratorResult<Job> {
        self.job_repo
            .get_by_id(job_id)
            .await?
            .ok_or(OrchestratorError::JobNotFound { id: job_id })
    }

    pub async fn list_jobs(&self, task_id: Option<i64>) -> OrchestratorResult<Vec<Job>> {
        self.job_repo.list(task_id).await
    }

    // ---- 用例 ----

    /// 立即执行一次，返回已关闭的执行记录
    ///
    /// 校验失败时不会创建执行记录；节点拒绝时返回 `failed` 状态的记录。
    pub async fn execute(&self, task_id: i64) -> OrchestratorResult<Job> {
        let span = self.use_case_span("execute", task_id);
        async {
            let _guard = self.locks.acquire(task_id).await;
            let task = self.get_task(task_id).await?;
            let node = self.assigned_node(&task).await?;
            TaskStateMachine::check(TaskAction::Execute, &task, node.as_ref())?;
            let node = require_node(node)?;

            let job = self.job_repo.create(&Job::new(task.id, Utc::now())).await?;
            let (status, result, error_message) =
                match self.client.trigger_immediate(&node, task.id).await {
                    Ok(outcome) if outcome.success => {
                        (JobStatus::Success, Some(EXECUTE_ACCEPTED_MESSAGE.to_string()), None)
                    }
                    Ok(outcome) => (JobStatus::Failed, None, outcome.error),
                    Err(e) => (JobStatus::Failed, None, Some(e.to_string())),
                };

            let job = match self
                .job_repo
                .close(job.id, status, result, error_message, Utc::now())
                .await
            {
                Ok(job) => job,
                Err(e) => {
                    error!("关闭执行记录 {} 失败，该记录将停留在 running 状态: {}", job.id, e);
                    return Err(e);
                }
            };

            match job.status {
                JobStatus::Success => info!("任务 {} 在节点 {} 上触发成功", task.id, node.name),
                _ => error!(
                    "任务 {} 在节点 {} 上触发失败: {}",
                    task.id,
                    node.name,
                    job.error_message.as_deref().unwrap_or_default()
                ),
            }
            Ok(job)
        }
        .instrument(span)
        .await
    }

    /// 暂停：单次 stop，成功后置为 paused，失败时状态不变
    pub async fn pause(&self, task_id: i64) -> OrchestratorResult<Task> {
        let span = self.use_case_span("pause", task_id);
        async {
            let _guard = self.locks.acquire(task_id).await;
            let task = self.get_task(task_id).await?;
            let node = self.assigned_node(&task).await?;
            let transition = TaskStateMachine::check(TaskAction::Pause, &task, node.as_ref())?;
            let node = require_node(node)?;

            let policy = self.client.retry_policy().single_attempt();
            self.client.stop(&node, task.id, policy).await?;

            let task = self.persist_status(task, transition.target_status).await?;
            info!("任务已暂停: {}", task.id);
            Ok(task)
        }
        .instrument(span)
        .await
    }

    /// 恢复：单次 start，成功后置为 active，失败时状态不变
    pub async fn resume(&self, task_id: i64) -> OrchestratorResult<Task> {
        let span = self.use_case_span("resume", task_id);
        async {
            let _guard = self.locks.acquire(task_id).await;
            let task = self.get_task(task_id).await?;
            let node = self.assigned_node(&task).await?;
            let transition = TaskStateMachine::check(TaskAction::Resume, &task, node.as_ref())?;
            let node = require_node(node)?;

            let policy = self.client.retry_policy().single_attempt();
            self.client.start(&node, task.id, policy).await?;

            let task = self.persist_status(task, transition.target_status).await?;
            info!("任务已恢复: {}", task.id);
            Ok(task)
        }
        .instrument(span)
        .await
    }

    /// 把任务分配到新节点
    ///
    /// 目标节点必须存在、为 active 且通过健康探测，否则不做任何修改。
    /// 旧节点上的 stop 只尽力而为；新节点上的部署失败体现为 `partial_success`。
    pub async fn assign_node(
        &self,
        task_id: i64,
        node_id: Option<i64>,
    ) -> OrchestratorResult<AssignmentReport> {
        let span = self.use_case_span("assign_node", task_id);
        async {
            let node_id = node_id.ok_or_else(|| OrchestratorError::validation("缺少节点ID"))?;

            let _guard = self.locks.acquire(task_id).await;
            let task = self.get_task(task_id).await?;
            let target = self.registry.get(node_id).await?;
            let transition = TaskStateMachine::check(TaskAction::AssignNode, &task, Some(&target))?;

            let health = self.client.probe_health(&target).await;
            if !health.is_healthy() {
                return Err(OrchestratorError::NodeUnhealthy(health.describe()));
            }

            if transition.includes(DispatchAction::Stop) {
                if let Some(old_node) = self.assigned_node(&task).await? {
                    self.stop_best_effort(&old_node, task.id).await;
                }
            }

            let mut task = task;
            task.node_id = Some(target.id);
            task.updated_at = Utc::now();
            self.task_repo.update(&task).await?;

            let deployment = if transition.includes(DispatchAction::SendDefinition) {
                self.deploy_best_effort(&target, &task).await
            } else {
                Deployment {
                    accepted: true,
                    started: false,
                    error: None,
                }
            };

            let deployed = deployment.accepted
                && (deployment.started || !transition.includes(DispatchAction::Start));
            let report = if deployed {
                AssignmentReport {
                    status: AssignmentStatus::Success,
                    message: "节点分配成功".to_string(),
                    node: target.summary(),
                    error_detail: None,
                }
            } else {
                AssignmentReport {
                    status: AssignmentStatus::PartialSuccess,
                    message: "节点分配成功，但任务部署失败".to_string(),
                    node: target.summary(),
                    error_detail: deployment.error,
                }
            };

            info!(
                "任务 {} 已分配到节点 {} ({:?})",
                task.id, target.name, report.status
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// 重新下发任务定义
    ///
    /// 定义始终未被节点接受时返回错误；之后的 start 失败只记录日志。
    pub async fn redeploy(&self, task_id: i64) -> OrchestratorResult<RedeployReport> {
        let span = self.use_case_span("redeploy", task_id);
        async {
            let _guard = self.locks.acquire(task_id).await;
            let task = self.get_task(task_id).await?;
            let node = self.assigned_node(&task).await?;
            let transition = TaskStateMachine::check(TaskAction::Redeploy, &task, node.as_ref())?;
            let node = require_node(node)?;

            let payload = TaskPayload::from(&task).with_active_flag(task.is_active());
            self.client
                .send_task_definition(&node, &payload, self.client.retry_policy())
                .await?;
            info!("任务 {} 定义已重新下发到节点 {}", task.id, node.name);

            let mut started = false;
            if transition.includes(DispatchAction::Start) {
                let policy = self.client.retry_policy().tolerate_failure();
                match self.client.start(&node, task.id, policy).await {
                    Ok(outcome) if outcome.success => started = true,
                    Ok(outcome) => warn!(
                        "任务 {} 重新下发后启动失败: {}",
                        task.id,
                        outcome.error.unwrap_or_default()
                    ),
                    Err(e) => warn!("任务 {} 重新下发后启动失败: {}", task.id, e),
                }
            }

            Ok(RedeployReport {
                task_id: task.id,
                node: node.summary(),
                started,
            })
        }
        .instrument(span)
        .await
    }

    /// 创建任务
    ///
    /// 先持久化；若带有节点且为 active，探测健康后尽力部署。部署失败不影响创建结果。
    pub async fn create(&self, input: NewTask) -> OrchestratorResult<Task> {
        let span = info_span!(parent: &self.span, "use_case", use_case = "create");
        async {
            input.validate()?;
            let node = match input.node_id {
                Some(node_id) => Some(self.require_existing_node(node_id).await?),
                None => None,
            };

            let task = self.task_repo.create(&input.into_task(Utc::now())).await?;
            info!("创建任务成功: {} (ID: {})", task.name, task.id);

            if let Some(node) = node {
                if task.is_active() {
                    self.deploy_if_healthy(&node, &task).await;
                }
            }

            Ok(task)
        }
        .instrument(span)
        .await
    }

    /// 部分更新任务，并根据前后差异同步到节点
    pub async fn update(&self, task_id: i64, patch: TaskPatch) -> OrchestratorResult<Task> {
        let span = self.use_case_span("update", task_id);
        async {
            patch.validate()?;
            if let UpdateValue::Set(node_id) = &patch.node_id {
                self.require_existing_node(*node_id).await?;
            }

            let _guard = self.locks.acquire(task_id).await;
            let before = self.get_task(task_id).await?;
            let after = patch.apply(&before, Utc::now());
            self.task_repo.update(&after).await?;
            debug!("任务 {} 已更新", after.id);

            let change = TaskChange { before, after };
            self.reconcile(&change).await;
            Ok(change.after)
        }
        .instrument(span)
        .await
    }

    /// 删除任务：尽力停止并删除节点上的任务，然后无条件删除记录
    pub async fn delete(&self, task_id: i64) -> OrchestratorResult<()> {
        let span = self.use_case_span("delete", task_id);
        async {
            let _guard = self.locks.acquire(task_id).await;
            let task = self.get_task(task_id).await?;
            let node = self.assigned_node(&task).await?;
            let transition = TaskStateMachine::check(TaskAction::Delete, &task, node.as_ref())?;

            if let Some(node) = &node {
                if transition.includes(DispatchAction::Stop) {
                    self.stop_best_effort(node, task.id).await;
                }
                if transition.includes(DispatchAction::Delete) {
                    let policy = self.client.retry_policy().tolerate_failure();
                    match self.client.delete(node, task.id, policy).await {
                        Ok(outcome) if outcome.success => {
                            info!("成功删除执行节点上的任务: {}", task.id)
                        }
                        Ok(outcome) => error!(
                            "删除执行节点 {} 上的任务 {} 失败: {}",
                            node.name,
                            task.id,
                            outcome.error.unwrap_or_default()
                        ),
                        Err(e) => error!("删除执行节点上的任务 {} 失败: {}", task.id, e),
                    }
                }
            }

            self.task_repo.delete(task.id).await?;
            info!("任务已删除: {}", task.id);
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// 探测节点健康并据此更新节点状态
    pub async fn check_node_health(&self, node_id: i64) -> OrchestratorResult<NodeHealthReport> {
        let span = info_span!(parent: &self.span, "use_case", use_case = "check_node_health", node_id);
        async {
            let node = self.registry.get(node_id).await?;
            let health = self.client.probe_health(&node).await;
            let healthy = health.is_healthy();

            let node = if healthy {
                self.registry
                    .set_status(node.id, NodeStatus::Active, Some(Utc::now()))
                    .await?
            } else {
                warn!("节点 {} 健康检查失败: {}", node.name, health.describe());
                self.registry
                    .set_status(node.id, NodeStatus::Inactive, None)
                    .await?
            };

            Ok(NodeHealthReport {
                node,
                health,
                healthy,
            })
        }
        .instrument(span)
        .await
    }

    // ---- 内部辅助 ----

    /// 重新读取任务当前分配的节点；引用悬空时视为未分配
    async fn assigned_node(&self, task: &Task) -> OrchestratorResult<Option<Node>> {
        match task.node_id {
            Some(node_id) => self.registry.find(node_id).await,
            None => Ok(None),
        }
    }

    async fn require_existing_node(&self, node_id: i64) -> OrchestratorResult<Node> {
        match self.registry.find(node_id).await? {
            Some(node) => Ok(node),
            None => Err(OrchestratorError::validation(format!(
                "指定的执行节点不存在: {node_id}"
            ))),
        }
    }

    async fn persist_status(
        &self,
        mut task: Task,
        target: Option<TaskStatus>,
    ) -> OrchestratorResult<Task> {
        if let Some(status) = target {
            task.status = status;
            task.updated_at = Utc::now();
            self.task_repo.update(&task).await?;
        }
        Ok(task)
    }

    async fn stop_best_effort(&self, node: &Node, task_id: i64) {
        let policy = self.client.retry_policy().tolerate_failure();
        match self.client.stop(node, task_id, policy).await {
            Ok(outcome) if outcome.success => {
                info!("成功停止节点 {} 上的任务: {}", node.name, task_id)
            }
            Ok(outcome) => error!(
                "停止节点 {} 上的任务 {} 失败: {}",
                node.name,
                task_id,
                outcome.error.unwrap_or_default()
            ),
            Err(e) => error!("停止节点 {} 上的任务 {} 失败: {}", node.name, task_id, e),
        }
    }

    /// 尽力下发定义，成功且任务为 active 时再尽力启动
    async fn deploy_best_effort(&self, node: &Node, task: &Task) -> Deployment {
        let policy = self.client.retry_policy().tolerate_failure();
        let payload = TaskPayload::from(task);

        let sent = self.client.send_task_definition(node, &payload, policy).await;
        let mut deployment = match sent {
            Ok(outcome) if outcome.success => Deployment {
                accepted: true,
                ..Deployment::default()
            },
            Ok(outcome) => Deployment {
                error: outcome.error,
                ..Deployment::default()
            },
            Err(e) => Deployment {
                error: Some(e.to_string()),
                ..Deployment::default()
            },
        };

        if !deployment.accepted {
            error!(
                "发送任务 {} 定义到节点 {} 失败: {}",
                task.id,
                node.name,
                deployment.error.as_deref().unwrap_or_default()
            );
            return deployment;
        }
        info!("成功发送任务 {} 定义到节点 {}", task.id, node.name);

        if !task.is_active() {
            return deployment;
        }

        match self.client.start(node, task.id, policy).await {
            Ok(outcome) if outcome.success => {
                deployment.started = true;
                info!("成功启动节点 {} 上的任务: {}", node.name, task.id);
            }
            Ok(outcome) => deployment.error = outcome.error,
            Err(e) => deployment.error = Some(e.to_string()),
        }
        if !deployment.started {
            error!(
                "启动节点 {} 上的任务 {} 失败: {}",
                node.name,
                task.id,
                deployment.error.as_deref().unwrap_or_default()
            );
        }
        deployment
    }

    async fn deploy_if_healthy(&self, node: &Node, task: &Task) {
        if !node.is_active() {
            warn!("节点 {} 不可用，任务 {} 不会自动部署", node.name, task.id);
            return;
        }
        let health = self.client.probe_health(node).await;
        if !health.is_healthy() {
            warn!(
                "节点 {} 健康检查失败，任务 {} 不会自动部署: {}",
                node.name,
                task.id,
                health.describe()
            );
            return;
        }
        self.deploy_best_effort(node, task).await;
    }

    /// 根据更新前后的差异同步节点，任何失败都只记录日志
    async fn reconcile(&self, change: &TaskChange) {
        if !change.requires_dispatch() {
            return;
        }
        let TaskChange { before, after } = change;

        let new_node = match self.assigned_node(after).await {
            Ok(Some(node)) => node,
            Ok(None) => return,
            Err(e) => {
                error!("读取任务 {} 的执行节点失败: {}", after.id, e);
                return;
            }
        };
        if !new_node.is_active() {
            warn!("节点 {} 不可用，任务 {} 更新后不会自动部署", new_node.name, after.id);
            return;
        }
        let health = self.client.probe_health(&new_node).await;
        if !health.is_healthy() {
            error!(
                "节点健康检查失败，任务 {} 更新后不会自动部署: {}",
                after.id,
                health.describe()
            );
            return;
        }

        if before.is_active() {
            match self.assigned_node(before).await {
                Ok(Some(old_node)) => self.stop_best_effort(&old_node, before.id).await,
                Ok(None) => {}
                Err(e) => error!("读取任务 {} 的原执行节点失败: {}", before.id, e),
            }
        }

        if after.status == TaskStatus::Deleted {
            return;
        }
        self.deploy_best_effort(&new_node, after).await;
    }
}

fn require_node(node: Option<Node>) -> OrchestratorResult<Node> {
    node.ok_or_else(|| OrchestratorError::internal("状态机校验通过但节点缺失"))
}
