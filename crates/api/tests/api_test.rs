use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use orchestrator_api::{create_routes, AppState};
use orchestrator_core::traits::{NodeRepository, TaskRepository};
use orchestrator_core::{DispatchConfig, TaskStatus};
use orchestrator_dispatcher::{DispatchClient, HeartbeatHandler, NodeRegistry, OrchestrationController};
use orchestrator_testing_utils::{MockRepositories, NodeBuilder, TaskBuilder};
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing::Span;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn app() -> (Router, MockRepositories) {
    let repos = MockRepositories::new();
    let config = DispatchConfig {
        max_attempts: 2,
        retry_delay_ms: 10,
        health_timeout_seconds: 1,
        request_timeout_seconds: 2,
    };
    let registry = Arc::new(NodeRegistry::new(repos.nodes.clone(), Span::none()));
    let client = Arc::new(DispatchClient::new(config, Span::none()));
    let controller = Arc::new(OrchestrationController::new(
        repos.tasks.clone(),
        repos.jobs.clone(),
        Arc::clone(&registry),
        client,
        Span::none(),
    ));
    let heartbeat = Arc::new(HeartbeatHandler::new(registry, Span::none()));
    let state = AppState {
        controller,
        heartbeat,
        metrics: None,
    };
    (create_routes(state), repos)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
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
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = app();
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_disabled_returns_not_found() {
    let (app, _) = app();
    let (status, _) = call(&app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_and_fetch_task() {
    let (app, _) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/tasks",
        Some(json!({
            "name": "backup",
            "cron_expression": "0 3 * * *",
            "command": "backup.sh",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["command_type"], "shell");

    let id = body["data"]["id"].as_i64().unwrap();
    let (status, body) = call(&app, "GET", &format!("/api/tasks/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "backup");

    let (_, body) = call(&app, "GET", "/api/tasks", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_task_validation_error() {
    let (app, _) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/tasks",
        Some(json!({"name": " ", "cron_expression": "* * * * *", "command": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["code"], 400);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let (app, _) = app();
    let (status, body) = call(&app, "POST", "/api/tasks/77/pause", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "TASK_NOT_FOUND");
}

#[tokio::test]
async fn test_update_distinguishes_null_from_missing() {
    let (app, repos) = app();
    let mut task = TaskBuilder::new().build();
    task.description = Some("keep".to_string());
    task.requirements = Some("requests".to_string());
    let task = repos.tasks.create(&task).await.unwrap();

    let (status, body) = call(
        &app,
        "PUT",
        &format!("/api/tasks/{}", task.id),
        Some(json!({"requirements": null, "status": "draft"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["description"], "keep");
    assert!(body["data"]["requirements"].is_null());
    assert_eq!(body["data"]["status"], "draft");
}

#[tokio::test]
async fn test_execute_failure_returns_job_with_500() {
    let (app, repos) = app();
    let server = MockServer::start().await;
    let node = repos
        .nodes
        .create(&NodeBuilder::new().with_base_url(&server.uri()).build())
        .await
        .unwrap();
    let task = repos
        .tasks
        .create(&TaskBuilder::new().with_node(node.id).build())
        .await
        .unwrap();
    Mock::given(method("POST"))
        .and(path(format!("/tasks/{}/execute", task.id)))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let (status, body) = call(&app, "POST", &format!("/api/tasks/{}/execute", task.id), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["status"], "failed");
    assert!(!body["data"]["end_time"].is_null());

    let (_, jobs) = call(&app, "GET", &format!("/api/jobs?task_id={}", task.id), None).await;
    assert_eq!(jobs["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_execute_paused_task_is_bad_request() {
    let (app, repos) = app();
    let task = repos
        .tasks
        .create(&TaskBuilder::new().with_status(TaskStatus::Paused).build())
        .await
        .unwrap();
    let (status, _) = call(&app, "POST", &format!("/api/tasks/{}/execute", task.id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_assign_node_requires_node_id() {
    let (app, repos) = app();
    let task = repos.tasks.create(&TaskBuilder::new().build()).await.unwrap();
    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/tasks/{}/assign_node", task.id),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_assign_node_unhealthy_is_service_unavailable() {
    let (app, repos) = app();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "busy"})))
        .mount(&server)
        .await;
    let node = repos
        .nodes
        .create(&NodeBuilder::new().with_base_url(&server.uri()).build())
        .await
        .unwrap();
    let task = repos.tasks.create(&TaskBuilder::new().build()).await.unwrap();

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/tasks/{}/assign_node", task.id),
        Some(json!({"node_id": node.id})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["type"], "NODE_UNHEALTHY");
}

#[tokio::test]
async fn test_heartbeat_registers_then_refreshes() {
    let (app, repos) = app();
    let beat = json!({"name": "exec-1", "host": "10.0.0.5", "port": 5001});

    let (status, body) = call(&app, "POST", "/api/nodes/heartbeat", Some(beat.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["created"], true);
    assert_eq!(body["data"]["node"]["status"], "active");

    let (_, body) = call(&app, "POST", "/api/nodes/heartbeat", Some(beat)).await;
    assert_eq!(body["data"]["created"], false);
    assert_eq!(repos.nodes.count().await, 1);

    let (status, _) = call(
        &app,
        "POST",
        "/api/nodes/heartbeat",
        Some(json!({"name": "exec-2"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_node_lifecycle() {
    let (app, _) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/nodes",
        Some(json!({"name": "manual", "host": "127.0.0.1", "port": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "inactive");
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = call(
        &app,
        "PUT",
        &format!("/api/nodes/{id}"),
        Some(json!({"host": "localhost", "status": "active"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["host"], "localhost");
    assert_eq!(body["data"]["port"], 1);
    assert_eq!(body["data"]["status"], "active");

    let (status, _) = call(
        &app,
        "PUT",
        &format!("/api/nodes/{id}"),
        Some(json!({"host": " "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, "GET", &format!("/api/nodes/{id}/check_health"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["healthy"], false);

    let (status, _) = call(&app, "DELETE", &format!("/api/nodes/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "GET", &format!("/api/nodes/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
