//! 编排控制平面的核心类型：领域模型、错误、仓储接口、配置与日志初始化。

pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod sqlx_impls;
pub mod traits;

pub use config::{ApiConfig, AppConfig, DatabaseConfig, DispatchConfig, ObservabilityConfig};
pub use errors::{OrchestratorError, OrchestratorResult};
pub use logging::init_logging;
pub use models::{
    CommandType, Job, JobStatus, NewTask, Node, NodePatch, NodeStatus, NodeSummary, Task,
    TaskPatch, TaskStatus, UpdateValue,
};
pub use traits::{JobRepository, NodeRepository, TaskRepository};
