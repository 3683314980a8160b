//! 编排控制平面的 REST 接口

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use middleware::apply_layers;
pub use response::ApiResponse;
pub use routes::{create_routes, AppState};
