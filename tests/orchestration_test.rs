//! 端到端：SQLite 存储 + HTTP 路由 + 模拟执行节点

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use orchestrator_api::{create_routes, AppState};
use orchestrator_core::{DatabaseConfig, DispatchConfig};
use orchestrator_dispatcher::{DispatchClient, HeartbeatHandler, NodeRegistry, OrchestrationController};
use orchestrator_infrastructure::{
    DatabaseManager, SqliteJobRepository, SqliteNodeRepository, SqliteTaskRepository,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing::Span;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn router(dir: &tempfile::TempDir) -> Router {
    let database = DatabaseManager::new(&DatabaseConfig {
        url: format!("sqlite:{}?mode=rwc", dir.path().join("e2e.db").display()),
        ..DatabaseConfig::default()
    })
    .await
    .unwrap();
    database.migrate().await.unwrap();

    let pool = database.pool().clone();
    let registry = Arc::new(NodeRegistry::new(
        Arc::new(SqliteNodeRepository::new(pool.clone())),
        Span::none(),
    ));
    let client = Arc::new(DispatchClient::new(
        DispatchConfig {
            max_attempts: 2,
            retry_delay_ms: 10,
            health_timeout_seconds: 1,
            request_timeout_seconds: 2,
        },
        Span::none(),
    ));
    let controller = Arc::new(OrchestrationController::new(
        Arc::new(SqliteTaskRepository::new(pool.clone())),
        Arc::new(SqliteJobRepository::new(pool)),
        Arc::clone(&registry),
        client,
        Span::none(),
    ));
    let heartbeat = Arc::new(HeartbeatHandler::new(registry, Span::none()));

    create_routes(AppState {
        controller,
        heartbeat,
        metrics: None,
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn mount(server: &MockServer, verb: &str, route: &str, template: ResponseTemplate, times: u64) {
    Mock::given(method(verb))
        .and(path(route))
        .respond_with(template)
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_task_lifecycle_against_executor_node() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(&dir).await;
    let node_server = MockServer::start().await;

    // 节点通过心跳注册
    let (status, body) = send(
        &app,
        "POST",
        "/api/nodes/heartbeat",
        Some(json!({
            "name": "exec-e2e",
            "host": "127.0.0.1",
            "port": node_server.address().port(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let node_id = body["data"]["node"]["id"].as_i64().unwrap();

    // 创建任务时部署到节点
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "active"})))
        .mount(&node_server)
        .await;
    mount(&node_server, "POST", "/tasks", ResponseTemplate::new(200), 1).await;
    mount(&node_server, "POST", "/tasks/1/start", ResponseTemplate::new(200), 1).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/tasks",
        Some(json!({
            "name": "cleanup",
            "cron_expression": "*/10 * * * *",
            "command": "cleanup.sh",
            "node_id": node_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let task_id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(task_id, 1);

    // 立即执行
    mount(&node_server, "POST", "/tasks/1/execute", ResponseTemplate::new(200), 1).await;
    let (status, body) = send(&app, "POST", "/api/tasks/1/execute", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "success");
    assert_eq!(body["data"]["result"], "任务执行已启动");

    // 删除：节点上的任务已不存在也算成功
    mount(&node_server, "POST", "/tasks/1/stop", ResponseTemplate::new(404), 1).await;
    mount(&node_server, "DELETE", "/tasks/1", ResponseTemplate::new(404), 1).await;
    let (status, _) = send(&app, "DELETE", "/api/tasks/1", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", "/api/tasks/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = send(&app, "GET", "/api/jobs?task_id=1", None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}
