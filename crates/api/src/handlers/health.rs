use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::{error::ApiError, routes::AppState};

/// 控制平面存活检查
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "orchestrator",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Prometheus 文本格式指标，未启用时返回 404
pub async fn render_metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let handle = state.metrics.as_ref().ok_or(ApiError::NotFound)?;
    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        handle.render(),
    ))
}
