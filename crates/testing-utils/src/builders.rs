//! 测试数据构建器

use chrono::Utc;
use orchestrator_core::models::{CommandType, Node, NodeStatus, Task, TaskStatus};

/// Builder for creating test Task entities
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            task: Task {
                id: 0,
                name: "test_task".to_string(),
                description: None,
                cron_expression: "*/5 * * * *".to_string(),
                command: "echo hello".to_string(),
                command_type: CommandType::Shell,
                requirements: None,
                status: TaskStatus::Active,
                node_id: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.task.command = command.to_string();
        self
    }

    pub fn with_command_type(mut self, command_type: CommandType) -> Self {
        self.task.command_type = command_type;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_node(mut self, node_id: i64) -> Self {
        self.task.node_id = Some(node_id);
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Node entities
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            node: Node {
                id: 0,
                name: "test-node".to_string(),
                host: "127.0.0.1".to_string(),
                port: 5001,
                status: NodeStatus::Active,
                last_heartbeat: Some(now),
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.node.name = name.to_string();
        self
    }

    pub fn with_address(mut self, host: &str, port: u16) -> Self {
        self.node.host = host.to_string();
        self.node.port = port;
        self
    }

    /// 使用 `http://host:port` 形式的地址（例如 mock 服务器的 uri）
    pub fn with_base_url(self, url: &str) -> Self {
        let authority = url
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_end_matches('/');
        let (host, port) = authority
            .rsplit_once(':')
            .and_then(|(h, p)| p.parse::<u16>().ok().map(|p| (h.to_string(), p)))
            .unwrap_or_else(|| (authority.to_string(), 80));
        self.with_address(&host, port)
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.node.status = status;
        self
    }

    pub fn build(self) -> Node {
        self.node
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_base_url() {
        let node = NodeBuilder::new().with_base_url("http://127.0.0.1:43123").build();
        assert_eq!(node.host, "127.0.0.1");
        assert_eq!(node.port, 43123);
    }
}
