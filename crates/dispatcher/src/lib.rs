//! 编排调度层
//!
//! 节点注册表、节点控制客户端、任务状态机、心跳处理和编排控制器。

pub mod controller;
pub mod dispatch_client;
pub mod heartbeat;
pub mod node_registry;
pub mod state_machine;

pub use controller::{
    AssignmentReport, AssignmentStatus, NodeHealthReport, OrchestrationController,
    RedeployReport, TaskChange, TaskLockGuard, TaskLocks, EXECUTE_ACCEPTED_MESSAGE,
};
pub use dispatch_client::{
    DispatchAction, DispatchClient, DispatchOutcome, HealthResult, RetryPolicy, TaskPayload,
};
pub use heartbeat::{HeartbeatAck, HeartbeatHandler, HeartbeatRequest};
pub use node_registry::NodeRegistry;
pub use state_machine::{TaskAction, TaskStateMachine, Transition};
