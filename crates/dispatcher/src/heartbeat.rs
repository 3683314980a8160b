use std::sync::Arc;

use chrono::Utc;
use orchestrator_core::{
    models::{Node, NodeStatus},
    OrchestratorError, OrchestratorResult,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, Instrument, Span};

use crate::node_registry::NodeRegistry;

/// 执行节点上报的心跳
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatAck {
    pub node: Node,
    pub created: bool,
}

/// 心跳处理器
///
/// 按名称 upsert 节点，并强制置为 active、刷新心跳时间。不做鉴权。
pub struct HeartbeatHandler {
    registry: Arc<NodeRegistry>,
    span: Span,
}

impl HeartbeatHandler {
    pub fn new(registry: Arc<NodeRegistry>, span: Span) -> Self {
        Self { registry, span }
    }

    pub async fn register_heartbeat(
        &self,
        request: HeartbeatRequest,
    ) -> OrchestratorResult<HeartbeatAck> {
        let name = request.name.as_deref().map(str::trim).unwrap_or_default();
        let host = request.host.as_deref().map(str::trim).unwrap_or_default();
        let port = request.port.unwrap_or(0);

        let mut missing = Vec::new();
        if name.is_empty() {
            missing.push("name");
        }
        if host.is_empty() {
            missing.push("host");
        }
        if port == 0 {
            missing.push("port");
        }
        if !missing.is_empty() {
            return Err(OrchestratorError::validation(format!(
                "缺少必填字段: {}",
                missing.join(", ")
            )));
        }

        let span = info_span!(parent: &self.span, "heartbeat", node = name);
        let (node, created) = self
            .registry
            .upsert_by_name(name, host, port, NodeStatus::Active, Utc::now())
            .instrument(span.clone())
            .await?;

        metrics::counter!("orchestrator_heartbeats_total").increment(1);
        span.in_scope(|| {
            if created {
                info!("新执行节点注册: {} ({}:{})", node.name, node.host, node.port);
            } else {
                debug!("执行节点心跳: {} ({}:{})", node.name, node.host, node.port);
            }
        });

        Ok(HeartbeatAck { node, created })
    }
}
