use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use orchestrator_core::{JobStatus, NewTask, TaskPatch};
use serde::Deserialize;

use crate::{
    error::ApiResult,
    response::{created, success, success_with_message, ApiResponse},
    routes::AppState,
};

/// 分配节点请求
#[derive(Debug, Default, Deserialize)]
pub struct AssignNodeRequest {
    #[serde(default)]
    pub node_id: Option<i64>,
}

/// 获取任务列表
pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let tasks = state.controller.list_tasks().await?;
    Ok(success(tasks))
}

/// 创建任务
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<NewTask>,
) -> ApiResult<impl IntoResponse> {
    let task = state.controller.create(request).await?;
    Ok(created(task))
}

/// 获取单个任务
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let task = state.controller.get_task(id).await?;
    Ok(success(task))
}

/// 部分更新任务
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<TaskPatch>,
) -> ApiResult<impl IntoResponse> {
    let task = state.controller.update(id, patch).await?;
    Ok(success_with_message(task, "任务更新成功"))
}

/// 删除任务
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.controller.delete(id).await?;
    Ok(ApiResponse::success_empty_with_message("任务删除成功"))
}

/// 立即执行一次
///
/// 节点拒绝时返回 500，响应体中带有失败的执行记录。
pub async fn execute_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let job = state.controller.execute(id).await?;
    let response = match job.status {
        JobStatus::Success => (
            StatusCode::OK,
            ApiResponse::success_with_message(job, "任务执行已启动"),
        ),
        _ => {
            let message = format!(
                "任务执行失败: {}",
                job.error_message.as_deref().unwrap_or_default()
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiResponse::failure_with_data(job, message),
            )
        }
    };
    Ok(response)
}

pub async fn pause_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let task = state.controller.pause(id).await?;
    Ok(success_with_message(task, "任务已暂停"))
}

pub async fn resume_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let task = state.controller.resume(id).await?;
    Ok(success_with_message(task, "任务已恢复"))
}

/// 重新下发任务定义
pub async fn redeploy_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let report = state.controller.redeploy(id).await?;
    Ok(success_with_message(report, "任务已重新下发"))
}

/// 分配执行节点
pub async fn assign_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<AssignNodeRequest>,
) -> ApiResult<impl IntoResponse> {
    let report = state.controller.assign_node(id, request.node_id).await?;
    let message = report.message.clone();
    Ok(success_with_message(report, message))
}
