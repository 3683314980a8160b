use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use orchestrator_core::NodePatch;
use orchestrator_dispatcher::HeartbeatRequest;
use serde::Deserialize;

use crate::{
    error::ApiResult,
    response::{created, success, success_with_message, ApiResponse},
    routes::AppState,
};

/// 手动登记节点请求
#[derive(Debug, Deserialize)]
pub struct CreateNodeRequest {
    pub name: String,
    pub host: String,
    pub port: u16,
}

pub async fn list_nodes(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let nodes = state.controller.registry().list().await?;
    Ok(success(nodes))
}

pub async fn create_node(
    State(state): State<AppState>,
    Json(request): Json<CreateNodeRequest>,
) -> ApiResult<impl IntoResponse> {
    let node = state
        .controller
        .registry()
        .register(&request.name, &request.host, request.port)
        .await?;
    Ok(created(node))
}

pub async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let node = state.controller.registry().get(id).await?;
    Ok(success(node))
}

/// 修改节点地址或状态
pub async fn update_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<NodePatch>,
) -> ApiResult<impl IntoResponse> {
    let node = state.controller.registry().update(id, patch).await?;
    Ok(success_with_message(node, "节点已更新"))
}

/// 移除节点，引用它的任务会被解除分配
pub async fn delete_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.controller.registry().remove(id).await?;
    Ok(ApiResponse::success_empty_with_message("节点已删除"))
}

/// 主动探测节点健康并更新状态
pub async fn check_node_health(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let report = state.controller.check_node_health(id).await?;
    Ok(success(report))
}

/// 执行节点心跳
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> ApiResult<impl IntoResponse> {
    let ack = state.heartbeat.register_heartbeat(request).await?;
    let message = if ack.created {
        "节点注册成功"
    } else {
        "心跳已更新"
    };
    Ok(success_with_message(ack, message))
}
