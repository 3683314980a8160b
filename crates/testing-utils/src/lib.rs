//! # Orchestrator Testing Utils
//!
//! 工作区共享的测试工具：内存版仓储实现和测试数据构建器。
//!
//! ```toml
//! [dev-dependencies]
//! orchestrator-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
