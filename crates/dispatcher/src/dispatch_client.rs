//! 执行节点控制通道
//!
//! 所有对节点 `/tasks*` 接口的调用都经过同一个重试执行器 [`DispatchClient::dispatch`]，
//! 由 [`RetryPolicy`] 决定尝试次数、间隔、404 是否视为成功以及耗尽后是否容忍失败。

use std::time::Duration;

use orchestrator_core::{
    models::{CommandType, Node, Task},
    DispatchConfig, OrchestratorError, OrchestratorResult,
};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument, Span};

/// 节点上的一个控制动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchAction {
    SendDefinition,
    Start,
    Stop,
    TriggerImmediate,
    Delete,
}

impl DispatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchAction::SendDefinition => "send_task_definition",
            DispatchAction::Start => "start",
            DispatchAction::Stop => "stop",
            DispatchAction::TriggerImmediate => "trigger_immediate",
            DispatchAction::Delete => "delete",
        }
    }

    fn method(&self) -> Method {
        match self {
            DispatchAction::Delete => Method::DELETE,
            _ => Method::POST,
        }
    }

    fn path(&self, task_id: i64) -> String {
        match self {
            DispatchAction::SendDefinition => "/tasks".to_string(),
            DispatchAction::Start => format!("/tasks/{task_id}/start"),
            DispatchAction::Stop => format!("/tasks/{task_id}/stop"),
            DispatchAction::TriggerImmediate => format!("/tasks/{task_id}/execute"),
            DispatchAction::Delete => format!("/tasks/{task_id}"),
        }
    }
}

/// 下发给节点的任务定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskPayload {
    pub task_id: i64,
    pub name: String,
    pub cron_expression: String,
    pub command: String,
    pub command_type: CommandType,
    pub requirements: Option<String>,
    /// 仅重新下发时携带
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl TaskPayload {
    pub fn with_active_flag(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }
}

impl From<&Task> for TaskPayload {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id,
            name: task.name.clone(),
            cron_expression: task.cron_expression.clone(),
            command: task.command.clone(),
            command_type: task.command_type,
            requirements: task.requirements.clone(),
            is_active: None,
        }
    }
}

/// 重试策略
///
/// 间隔固定，最后一次尝试之后不再等待。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub treat_not_found_as_success: bool,
    pub tolerate_failure: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: config.retry_delay(),
            treat_not_found_as_success: false,
            tolerate_failure: false,
        }
    }

    /// 只尝试一次
    pub fn single_attempt(mut self) -> Self {
        self.max_attempts = 1;
        self
    }

    /// 耗尽后返回 `Ok(outcome)` 而不是错误，由调用方记录日志后继续
    pub fn tolerate_failure(mut self) -> Self {
        self.tolerate_failure = true;
        self
    }

    pub fn treat_not_found_as_success(mut self) -> Self {
        self.treat_not_found_as_success = true;
        self
    }
}

/// 一次（可能多次尝试的）下发动作的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub action: &'static str,
    pub success: bool,
    pub attempts: u32,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

/// 健康探测结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResult {
    pub reachable: bool,
    pub status_code: Option<u16>,
    pub reported_status: Option<String>,
    pub error: Option<String>,
}

impl HealthResult {
    /// HTTP 200 且节点自报状态为 `active`
    pub fn is_healthy(&self) -> bool {
        self.status_code == Some(200) && self.reported_status.as_deref() == Some("active")
    }

    /// 不健康时的说明
    pub fn describe(&self) -> String {
        if let Some(error) = &self.error {
            return format!("无法连接到执行节点: {error}");
        }
        match (self.status_code, self.reported_status.as_deref()) {
            (Some(200), Some("active")) => "执行节点健康".to_string(),
            (Some(200), Some(status)) => format!("执行节点状态异常: {status}"),
            (Some(200), None) => "执行节点未报告状态".to_string(),
            (Some(code), _) => format!("执行节点健康检查失败，状态码: {code}"),
            (None, _) => "执行节点无响应".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: Option<String>,
}

enum AttemptResult {
    Accepted(u16),
    AlreadyAbsent,
    Rejected { status: u16, body: String },
    Transport(String),
}

/// 节点 HTTP 控制客户端
#[derive(Clone)]
pub struct DispatchClient {
    http_client: reqwest::Client,
    config: DispatchConfig,
    span: Span,
}

impl DispatchClient {
    pub fn new(config: DispatchConfig, span: Span) -> Self {
        Self::with_client(reqwest::Client::new(), config, span)
    }

    pub fn with_client(http_client: reqwest::Client, config: DispatchConfig, span: Span) -> Self {
        Self {
            http_client,
            config,
            span,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// 按配置构造的默认策略：多次尝试，耗尽即失败
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config)
    }

    /// 健康探测，永远不会返回错误，传输失败体现在结果里
    pub async fn probe_health(&self, node: &Node) -> HealthResult {
        let url = format!("{}/health", node.base_url());
        let span = info_span!(parent: &self.span, "probe_health", node = %node.name);

        async {
            let response = self
                .http_client
                .get(&url)
                .timeout(self.config.health_timeout())
                .send()
                .await;

            let result = match response {
                Ok(response) => {
                    let status_code = response.status().as_u16();
                    let reported_status = response
                        .json::<HealthBody>()
                        .await
                        .ok()
                        .and_then(|body| body.status);
                    HealthResult {
                        reachable: true,
                        status_code: Some(status_code),
                        reported_status,
                        error: None,
                    }
                }
                Err(e) => HealthResult {
                    reachable: false,
                    status_code: None,
                    reported_status: None,
                    error: Some(e.to_string()),
                },
            };

            if result.is_healthy() {
                debug!("节点 {} 健康检查通过", node.name);
            } else {
                warn!("节点 {} 健康检查失败: {}", node.name, result.describe());
            }
            result
        }
        .instrument(span)
        .await
    }

    pub async fn send_task_definition(
        &self,
        node: &Node,
        payload: &TaskPayload,
        policy: RetryPolicy,
    ) -> OrchestratorResult<DispatchOutcome> {
        self.dispatch(node, DispatchAction::SendDefinition, payload.task_id, Some(payload), policy)
            .await
    }

    pub async fn start(
        &self,
        node: &Node,
        task_id: i64,
        policy: RetryPolicy,
    ) -> OrchestratorResult<DispatchOutcome> {
        self.dispatch(node, DispatchAction::Start, task_id, None, policy)
            .await
    }

    /// 停止节点上的任务，404 视为已停止
    pub async fn stop(
        &self,
        node: &Node,
        task_id: i64,
        policy: RetryPolicy,
    ) -> OrchestratorResult<DispatchOutcome> {
        self.dispatch(
            node,
            DispatchAction::Stop,
            task_id,
            None,
            policy.treat_not_found_as_success(),
        )
        .await
    }

    /// 立即触发一次执行，只尝试一次
    pub async fn trigger_immediate(
        &self,
        node: &Node,
        task_id: i64,
    ) -> OrchestratorResult<DispatchOutcome> {
        let policy = self.retry_policy().single_attempt().tolerate_failure();
        self.dispatch(node, DispatchAction::TriggerImmediate, task_id, None, policy)
            .await
    }

    /// 删除节点上的任务，404 视为已删除
    pub async fn delete(
        &self,
        node: &Node,
        task_id: i64,
        policy: RetryPolicy,
    ) -> OrchestratorResult<DispatchOutcome> {
        self.dispatch(
            node,
            DispatchAction::Delete,
            task_id,
            None,
            policy.treat_not_found_as_success(),
        )
        .await
    }

    /// 统一的重试执行器
    pub async fn dispatch(
        &self,
        node: &Node,
        action: DispatchAction,
        task_id: i64,
        payload: Option<&TaskPayload>,
        policy: RetryPolicy,
    ) -> OrchestratorResult<DispatchOutcome> {
        let span = info_span!(
            parent: &self.span,
            "dispatch",
            action = action.as_str(),
            node = %node.name,
            task_id
        );

        async {
            let max_attempts = policy.max_attempts.max(1);
            let mut last_status = None;
            let mut last_error = String::new();

            for attempt in 1..=max_attempts {
                match self.attempt(node, action, task_id, payload).await {
                    AttemptResult::Accepted(status) => {
                        record_attempt(action, "success");
                        debug!("{} 成功 (尝试 {}/{})", action.as_str(), attempt, max_attempts);
                        return Ok(DispatchOutcome {
                            action: action.as_str(),
                            success: true,
                            attempts: attempt,
                            status_code: Some(status),
                            error: None,
                        });
                    }
                    AttemptResult::AlreadyAbsent if policy.treat_not_found_as_success => {
                        record_attempt(action, "not_found");
                        debug!("执行节点上不存在任务 {}，视为成功", task_id);
                        return Ok(DispatchOutcome {
                            action: action.as_str(),
                            success: true,
                            attempts: attempt,
                            status_code: Some(404),
                            error: None,
                        });
                    }
                    AttemptResult::AlreadyAbsent => {
                        last_status = Some(404);
                        last_error = "HTTP 404: 执行节点上不存在该任务".to_string();
                    }
                    AttemptResult::Rejected { status, body } => {
                        last_status = Some(status);
                        last_error = format!("HTTP {status}: {body}");
                    }
                    AttemptResult::Transport(error) => {
                        last_status = None;
                        last_error = error;
                    }
                }

                record_attempt(action, "failure");
                warn!(
                    "{} 失败 (尝试 {}/{}): {}",
                    action.as_str(),
                    attempt,
                    max_attempts,
                    last_error
                );

                if attempt < max_attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }

            if policy.tolerate_failure {
                warn!(
                    "{} 在 {} 次尝试后仍失败，忽略错误继续",
                    action.as_str(),
                    max_attempts
                );
                return Ok(DispatchOutcome {
                    action: action.as_str(),
                    success: false,
                    attempts: max_attempts,
                    status_code: last_status,
                    error: Some(last_error),
                });
            }

            Err(OrchestratorError::Dispatch {
                action: action.as_str().to_string(),
                node: node.name.clone(),
                attempts: max_attempts,
                message: last_error,
            })
        }
        .instrument(span)
        .await
    }

    async fn attempt(
        &self,
        node: &Node,
        action: DispatchAction,
        task_id: i64,
        payload: Option<&TaskPayload>,
    ) -> AttemptResult {
        let url = format!("{}{}", node.base_url(), action.path(task_id));
        let mut request = self
            .http_client
            .request(action.method(), &url)
            .timeout(self.config.request_timeout());
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        match request.send().await {
            Ok(response) => match response.status() {
                StatusCode::OK => AttemptResult::Accepted(200),
                StatusCode::NOT_FOUND => AttemptResult::AlreadyAbsent,
                status => AttemptResult::Rejected {
                    status: status.as_u16(),
                    body: response.text().await.unwrap_or_default(),
                },
            },
            Err(e) => AttemptResult::Transport(e.to_string()),
        }
    }
}

fn record_attempt(action: DispatchAction, outcome: &'static str) {
    metrics::counter!(
        "orchestrator_dispatch_attempts_total",
        "action" => action.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orchestrator_core::models::{NodeStatus, TaskStatus};

    fn sample_task() -> Task {
        let now = Utc::now();
        Task {
            id: 9,
            name: "sync".to_string(),
            description: Some("ignored".to_string()),
            cron_expression: "0 * * * *".to_string(),
            command: "sync.sh".to_string(),
            command_type: CommandType::Shell,
            requirements: None,
            status: TaskStatus::Paused,
            node_id: Some(1),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_action_routes() {
        assert_eq!(DispatchAction::SendDefinition.path(3), "/tasks");
        assert_eq!(DispatchAction::Stop.path(3), "/tasks/3/stop");
        assert_eq!(DispatchAction::TriggerImmediate.path(3), "/tasks/3/execute");
        assert_eq!(DispatchAction::Delete.method(), Method::DELETE);
        assert_eq!(DispatchAction::Start.method(), Method::POST);
    }

    #[test]
    fn test_payload_from_task() {
        let payload = TaskPayload::from(&sample_task());
        assert_eq!(payload.task_id, 9);
        assert_eq!(payload.is_active, None);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["command_type"], "shell");
        assert!(json.get("description").is_none());
        assert!(json.get("is_active").is_none());

        let json = serde_json::to_value(payload.with_active_flag(false)).unwrap();
        assert_eq!(json["is_active"], false);
    }

    #[test]
    fn test_policy_builders() {
        let config = DispatchConfig::default();
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 3);
        assert!(!policy.tolerate_failure);

        let once = policy.single_attempt().tolerate_failure();
        assert_eq!(once.max_attempts, 1);
        assert!(once.tolerate_failure);
        assert!(!once.treat_not_found_as_success);
    }

    #[test]
    fn test_health_result_classification() {
        let healthy = HealthResult {
            reachable: true,
            status_code: Some(200),
            reported_status: Some("active".to_string()),
            error: None,
        };
        assert!(healthy.is_healthy());

        let busy = HealthResult {
            reported_status: Some("busy".to_string()),
            ..healthy.clone()
        };
        assert!(!busy.is_healthy());
        assert!(busy.describe().contains("busy"));

        let down = HealthResult {
            reachable: false,
            status_code: None,
            reported_status: None,
            error: Some("connection refused".to_string()),
        };
        assert!(!down.is_healthy());
        assert!(down.describe().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_unreachable_node_exhausts_attempts() {
        let now = Utc::now();
        let node = Node {
            id: 1,
            name: "unreachable".to_string(),
            host: "127.0.0.1".to_string(),
            port: 1,
            status: NodeStatus::Active,
            last_heartbeat: None,
            created_at: now,
            updated_at: now,
        };
        let config = DispatchConfig {
            max_attempts: 2,
            retry_delay_ms: 5,
            ..DispatchConfig::default()
        };
        let client = DispatchClient::new(config, Span::none());

        let err = client
            .start(&node, 1, client.retry_policy())
            .await
            .unwrap_err();
        match err {
            OrchestratorError::Dispatch { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("unexpected error: {other:?}"),
        }

        let outcome = client
            .start(&node, 1, client.retry_policy().tolerate_failure())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.status_code, None);
        assert!(outcome.error.is_some());
    }
}
