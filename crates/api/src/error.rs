use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use orchestrator_core::OrchestratorError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("编排错误: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("未找到资源")]
    NotFound,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, String, &'static str) {
        match self {
            ApiError::Orchestrator(err) => match err {
                OrchestratorError::TaskNotFound { .. } => {
                    (StatusCode::NOT_FOUND, err.to_string(), "TASK_NOT_FOUND")
                }
                OrchestratorError::JobNotFound { .. } => {
                    (StatusCode::NOT_FOUND, err.to_string(), "JOB_NOT_FOUND")
                }
                OrchestratorError::NodeNotFound { .. } => {
                    (StatusCode::NOT_FOUND, err.to_string(), "NODE_NOT_FOUND")
                }
                OrchestratorError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, msg.clone(), "VALIDATION_ERROR")
                }
                OrchestratorError::JobAlreadyClosed { .. } => {
                    (StatusCode::BAD_REQUEST, err.to_string(), "VALIDATION_ERROR")
                }
                OrchestratorError::NodeUnhealthy(msg) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    msg.clone(),
                    "NODE_UNHEALTHY",
                ),
                OrchestratorError::Dispatch { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    err.to_string(),
                    "DISPATCH_FAILED",
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "系统内部错误".to_string(),
                    "INTERNAL_ERROR",
                ),
            },
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "请求的资源不存在".to_string(),
                "NOT_FOUND",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, error_type) = self.parts();
        if status.is_server_error() {
            tracing::error!("请求处理失败: {}", self);
        }

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
