use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use orchestrator_dispatcher::{HeartbeatHandler, OrchestrationController};

use crate::handlers::{
    health::{health_check, render_metrics},
    jobs::{get_job, list_jobs},
    nodes::{
        check_node_health, create_node, delete_node, get_node, heartbeat, list_nodes, update_node,
    },
    tasks::{
        assign_node, create_task, delete_task, execute_task, get_task, list_tasks, pause_task,
        redeploy_task, resume_task, update_task,
    },
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<OrchestrationController>,
    pub heartbeat: Arc<HeartbeatHandler>,
    pub metrics: Option<PrometheusHandle>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查与指标
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        // 任务管理API
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/{id}/execute", post(execute_task))
        .route("/api/tasks/{id}/pause", post(pause_task))
        .route("/api/tasks/{id}/resume", post(resume_task))
        .route("/api/tasks/{id}/redeploy", post(redeploy_task))
        .route("/api/tasks/{id}/assign_node", post(assign_node))
        // 执行记录API
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/{id}", get(get_job))
        // 执行节点API
        .route("/api/nodes", get(list_nodes).post(create_node))
        .route("/api/nodes/heartbeat", post(heartbeat))
        .route(
            "/api/nodes/{id}",
            get(get_node).put(update_node).delete(delete_node),
        )
        .route("/api/nodes/{id}/check_health", get(check_node_health))
        .with_state(state)
}
