use std::sync::Arc;

use chrono::{DateTime, Utc};
use orchestrator_core::{
    models::{Node, NodePatch, NodeStatus},
    traits::NodeRepository,
    OrchestratorError, OrchestratorResult,
};
use tracing::{debug, info, Instrument, Span};

/// 执行节点注册表
///
/// 所有对节点记录的修改都经过这里。
pub struct NodeRegistry {
    node_repo: Arc<dyn NodeRepository>,
    span: Span,
}

impl NodeRegistry {
    pub fn new(node_repo: Arc<dyn NodeRepository>, span: Span) -> Self {
        Self { node_repo, span }
    }

    pub async fn get(&self, id: i64) -> OrchestratorResult<Node> {
        self.find(id)
            .await?
            .ok_or(OrchestratorError::NodeNotFound { id })
    }

    pub async fn find(&self, id: i64) -> OrchestratorResult<Option<Node>> {
        self.node_repo.get_by_id(id).await
    }

    pub async fn list(&self) -> OrchestratorResult<Vec<Node>> {
        self.node_repo.list().await
    }

    /// 手动登记节点，初始状态为 inactive，等待心跳或健康检查激活
    pub async fn register(&self, name: &str, host: &str, port: u16) -> OrchestratorResult<Node> {
        validate_address(name, host, port)?;

        let now = Utc::now();
        let node = Node {
            id: 0,
            name: name.trim().to_string(),
            host: host.trim().to_string(),
            port,
            status: NodeStatus::Inactive,
            last_heartbeat: None,
            created_at: now,
            updated_at: now,
        };

        let node = self
            .node_repo
            .create(&node)
            .instrument(self.span.clone())
            .await?;
        info!(parent: &self.span, "手动登记执行节点: {} ({}:{})", node.name, node.host, node.port);
        Ok(node)
    }

    /// 按名称插入或刷新节点，返回最新记录以及是否为新建
    pub async fn upsert_by_name(
        &self,
        name: &str,
        host: &str,
        port: u16,
        status: NodeStatus,
        heartbeat: DateTime<Utc>,
    ) -> OrchestratorResult<(Node, bool)> {
        validate_address(name, host, port)?;
        self.node_repo
            .upsert_by_name(name.trim(), host.trim(), port, status, heartbeat)
            .instrument(self.span.clone())
            .await
    }

    pub async fn set_status(
        &self,
        id: i64,
        status: NodeStatus,
        heartbeat: Option<DateTime<Utc>>,
    ) -> OrchestratorResult<Node> {
        let node = self.node_repo.set_status(id, status, heartbeat).await?;
        debug!(parent: &self.span, "节点 {} 状态更新为 {}", node.name, status);
        Ok(node)
    }

    /// 修改节点地址或状态，名称不可修改
    pub async fn update(&self, id: i64, patch: NodePatch) -> OrchestratorResult<Node> {
        let node = self.get(id).await?;
        let node = patch.apply(&node, Utc::now());
        validate_address(&node.name, &node.host, node.port)?;

        self.node_repo
            .update(&node)
            .instrument(self.span.clone())
            .await?;
        info!(parent: &self.span, "更新执行节点: {} ({}:{}, {})", node.name, node.host, node.port, node.status);
        Ok(node)
    }

    /// 移除节点，引用它的任务会被解除分配
    pub async fn remove(&self, id: i64) -> OrchestratorResult<()> {
        if !self.node_repo.delete(id).await? {
            return Err(OrchestratorError::NodeNotFound { id });
        }
        info!(parent: &self.span, "已移除执行节点 {}", id);
        Ok(())
    }
}

fn validate_address(name: &str, host: &str, port: u16) -> OrchestratorResult<()> {
    if name.trim().is_empty() {
        return Err(OrchestratorError::validation("节点名称不能为空"));
    }
    if host.trim().is_empty() {
        return Err(OrchestratorError::validation("节点地址不能为空"));
    }
    if port == 0 {
        return Err(OrchestratorError::validation("节点端口必须大于0"));
    }
    Ok(())
}
