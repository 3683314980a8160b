use thiserror::Error;

/// 编排控制平面错误类型定义
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("任务未找到: {id}")]
    TaskNotFound { id: i64 },

    #[error("执行记录未找到: {id}")]
    JobNotFound { id: i64 },

    #[error("执行节点未找到: {id}")]
    NodeNotFound { id: i64 },

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("执行节点健康检查失败: {0}")]
    NodeUnhealthy(String),

    #[error("下发到节点 {node} 的 {action} 操作在 {attempts} 次尝试后失败: {message}")]
    Dispatch {
        action: String,
        node: String,
        attempts: u32,
        message: String,
    },

    #[error("执行记录 {id} 已结束，无法再次关闭")]
    JobAlreadyClosed { id: i64 },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
