pub mod repository;

pub use repository::{JobRepository, NodeRepository, TaskRepository};
