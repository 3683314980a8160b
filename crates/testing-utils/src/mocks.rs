//! 内存版仓储实现
//!
//! 三个仓储共享同一份状态，因此删除任务会级联删除执行记录，
//! 删除节点会解除任务分配，行为与 SQLite 实现一致。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orchestrator_core::models::{Job, JobStatus, Node, NodeStatus, Task};
use orchestrator_core::traits::{JobRepository, NodeRepository, TaskRepository};
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct MockState {
    tasks: BTreeMap<i64, Task>,
    jobs: BTreeMap<i64, Job>,
    nodes: BTreeMap<i64, Node>,
    next_id: i64,
}

impl MockState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// 共享同一份内存状态的三个仓储
#[derive(Clone)]
pub struct MockRepositories {
    pub tasks: Arc<MockTaskRepository>,
    pub jobs: Arc<MockJobRepository>,
    pub nodes: Arc<MockNodeRepository>,
}

impl MockRepositories {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(MockState::default()));
        Self {
            tasks: Arc::new(MockTaskRepository {
                state: Arc::clone(&state),
            }),
            jobs: Arc::new(MockJobRepository {
                state: Arc::clone(&state),
            }),
            nodes: Arc::new(MockNodeRepository { state }),
        }
    }
}

impl Default for MockRepositories {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MockTaskRepository {
    state: Arc<Mutex<MockState>>,
}

impl MockTaskRepository {
    pub async fn count(&self) -> usize {
        self.state.lock().await.tasks.len()
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn create(&self, task: &Task) -> OrchestratorResult<Task> {
        let mut state = self.state.lock().await;
        let mut new_task = task.clone();
        new_task.id = state.allocate_id();
        state.tasks.insert(new_task.id, new_task.clone());
        Ok(new_task)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Task>> {
        Ok(self.state.lock().await.tasks.get(&id).cloned())
    }

    async fn list(&self) -> OrchestratorResult<Vec<Task>> {
        let state = self.state.lock().await;
        Ok(state.tasks.values().rev().cloned().collect())
    }

    async fn update(&self, task: &Task) -> OrchestratorResult<()> {
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(OrchestratorError::TaskNotFound { id: task.id }),
        }
    }

    async fn delete(&self, id: i64) -> OrchestratorResult<bool> {
        let mut state = self.state.lock().await;
        state.jobs.retain(|_, job| job.task_id != id);
        Ok(state.tasks.remove(&id).is_some())
    }
}

#[derive(Debug)]
pub struct MockJobRepository {
    state: Arc<Mutex<MockState>>,
}

impl MockJobRepository {
    pub async fn count(&self) -> usize {
        self.state.lock().await.jobs.len()
    }
}

#[async_trait]
impl JobRepository for MockJobRepository {
    async fn create(&self, job: &Job) -> OrchestratorResult<Job> {
        let mut state = self.state.lock().await;
        if !state.tasks.contains_key(&job.task_id) {
            return Err(OrchestratorError::TaskNotFound { id: job.task_id });
        }
        let mut new_job = job.clone();
        new_job.id = state.allocate_id();
        state.jobs.insert(new_job.id, new_job.clone());
        Ok(new_job)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Job>> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn list(&self, task_id: Option<i64>) -> OrchestratorResult<Vec<Job>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .rev()
            .filter(|job| task_id.is_none_or(|id| job.task_id == id))
            .cloned()
            .collect())
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
            return Err(OrchestratorError::validation("执行记录只能关闭为终态"));
        }
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or(OrchestratorError::JobNotFound { id })?;
        if job.is_terminal() {
            return Err(OrchestratorError::JobAlreadyClosed { id });
        }
        job.status = status;
        job.result = result;
        job.error_message = error_message;
        job.end_time = Some(end_time);
        Ok(job.clone())
    }
}

#[derive(Debug)]
pub struct MockNodeRepository {
    state: Arc<Mutex<MockState>>,
}

impl MockNodeRepository {
    pub async fn count(&self) -> usize {
        self.state.lock().await.nodes.len()
    }
}

#[async_trait]
impl NodeRepository for MockNodeRepository {
    async fn create(&self, node: &Node) -> OrchestratorResult<Node> {
        let mut state = self.state.lock().await;
        if state.nodes.values().any(|n| n.name == node.name) {
            return Err(OrchestratorError::validation(format!(
                "节点名称已存在: {}",
                node.name
            )));
        }
        let mut new_node = node.clone();
        new_node.id = state.allocate_id();
        state.nodes.insert(new_node.id, new_node.clone());
        Ok(new_node)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Node>> {
        Ok(self.state.lock().await.nodes.get(&id).cloned())
    }

    async fn list(&self) -> OrchestratorResult<Vec<Node>> {
        let state = self.state.lock().await;
        Ok(state.nodes.values().rev().cloned().collect())
    }

    async fn update(&self, node: &Node) -> OrchestratorResult<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .nodes
            .get_mut(&node.id)
            .ok_or(OrchestratorError::NodeNotFound { id: node.id })?;
        stored.host = node.host.clone();
        stored.port = node.port;
        stored.status = node.status;
        stored.updated_at = node.updated_at;
        Ok(())
    }

    async fn upsert_by_name(
        &self,
        name: &str,
        host: &str,
        port: u16,
        status: NodeStatus,
        heartbeat: DateTime<Utc>,
    ) -> OrchestratorResult<(Node, bool)> {
        let mut state = self.state.lock().await;
        if let Some(node) = state.nodes.values_mut().find(|n| n.name == name) {
            node.host = host.to_string();
            node.port = port;
            node.status = status;
            node.last_heartbeat = Some(heartbeat);
            node.updated_at = heartbeat;
            return Ok((node.clone(), false));
        }

        let node = Node {
            id: state.allocate_id(),
            name: name.to_string(),
            host: host.to_string(),
            port,
            status,
            last_heartbeat: Some(heartbeat),
            created_at: heartbeat,
            updated_at: heartbeat,
        };
        state.nodes.insert(node.id, node.clone());
        Ok((node, true))
    }

    async fn set_status(
        &self,
        id: i64,
        status: NodeStatus,
        heartbeat: Option<DateTime<Utc>>,
    ) -> OrchestratorResult<Node> {
        let mut state = self.state.lock().await;
        let node = state
            .nodes
            .get_mut(&id)
            .ok_or(OrchestratorError::NodeNotFound { id })?;
        node.status = status;
        if heartbeat.is_some() {
            node.last_heartbeat = heartbeat;
        }
        node.updated_at = Utc::now();
        Ok(node.clone())
    }

    async fn delete(&self, id: i64) -> OrchestratorResult<bool> {
        let mut state = self.state.lock().await;
        for task in state.tasks.values_mut() {
            if task.node_id == Some(id) {
                task.node_id = None;
            }
        }
        Ok(state.nodes.remove(&id).is_some())
    }
}
