use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;

/// 远程执行节点
///
/// `name` 是心跳注册时的唯一键，地址变化的节点按名称原地更新。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub status: NodeStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    /// 节点控制接口的基础地址
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            id: self.id,
            name: self.name.clone(),
            host: self.host.clone(),
        }
    }
}

/// 节点的部分更新，缺失字段保持不变
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodePatch {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub status: Option<NodeStatus>,
}

impl NodePatch {
    pub fn apply(self, node: &Node, now: DateTime<Utc>) -> Node {
        Node {
            host: self.host.map_or_else(|| node.host.clone(), |h| h.trim().to_string()),
            port: self.port.unwrap_or(node.port),
            status: self.status.unwrap_or(node.status),
            updated_at: now,
            ..node.clone()
        }
    }
}

/// 对外返回的节点简要信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSummary {
    pub id: i64,
    pub name: String,
    pub host: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    #[default]
    Inactive,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Active => "active",
            NodeStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(NodeStatus::Active),
            "inactive" => Ok(NodeStatus::Inactive),
            _ => Err(OrchestratorError::validation(format!("无效的节点状态: {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let now = Utc::now();
        let node = Node {
            id: 1,
            name: "n1".to_string(),
            host: "10.0.0.5".to_string(),
            port: 5001,
            status: NodeStatus::default(),
            last_heartbeat: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(node.base_url(), "http://10.0.0.5:5001");
        assert!(!node.is_active());
        assert_eq!(node.summary().host, "10.0.0.5");
    }

    #[test]
    fn test_patch_keeps_missing_fields() {
        let now = Utc::now();
        let node = Node {
            id: 1,
            name: "n1".to_string(),
            host: "10.0.0.5".to_string(),
            port: 5001,
            status: NodeStatus::Active,
            last_heartbeat: Some(now),
            created_at: now,
            updated_at: now,
        };

        let patch: NodePatch = serde_json::from_str(r#"{"port": 6001}"#).unwrap();
        let updated = patch.apply(&node, Utc::now());
        assert_eq!(updated.host, "10.0.0.5");
        assert_eq!(updated.port, 6001);
        assert_eq!(updated.status, NodeStatus::Active);
        assert_eq!(updated.last_heartbeat, node.last_heartbeat);
    }
}
