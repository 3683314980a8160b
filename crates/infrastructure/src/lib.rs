//! 存储层实现：SQLite 连接池管理与三类仓储。

pub mod database;

pub use database::*;
