pub mod job;
pub mod node;
pub mod task;
pub mod update_value;

pub use job::{Job, JobStatus};
pub use node::{Node, NodePatch, NodeStatus, NodeSummary};
pub use task::{CommandType, NewTask, Task, TaskPatch, TaskStatus};
pub use update_value::UpdateValue;
