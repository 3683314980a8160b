use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{error::ApiResult, response::success, routes::AppState};

/// 执行记录查询参数
#[derive(Debug, Default, Deserialize)]
pub struct JobQueryParams {
    pub task_id: Option<i64>,
}

/// 获取执行记录列表，可按任务过滤
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let jobs = state.controller.list_jobs(params.task_id).await?;
    Ok(success(jobs))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let job = state.controller.get_job(id).await?;
    Ok(success(job))
}
