//! 任务生命周期状态机
//!
//! 纯函数：给定动作、任务和（重新读取的）节点，判断是否合法，
//! 并给出需要执行的下发步骤以及成功后的目标状态。不合法时不做任何下发和修改。

use orchestrator_core::{
    models::{Node, Task, TaskStatus},
    OrchestratorError, OrchestratorResult,
};

use crate::dispatch_client::DispatchAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Execute,
    Pause,
    Resume,
    AssignNode,
    Redeploy,
    Delete,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::Execute => "execute",
            TaskAction::Pause => "pause",
            TaskAction::Resume => "resume",
            TaskAction::AssignNode => "assign_node",
            TaskAction::Redeploy => "redeploy",
            TaskAction::Delete => "delete",
        }
    }
}

/// 合法转换的描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub action: TaskAction,
    /// 按顺序执行的下发步骤
    pub steps: Vec<DispatchAction>,
    /// 成功后的任务状态，`None` 表示不变（删除时表示记录被移除）
    pub target_status: Option<TaskStatus>,
}

impl Transition {
    pub fn includes(&self, step: DispatchAction) -> bool {
        self.steps.contains(&step)
    }
}

pub struct TaskStateMachine;

impl TaskStateMachine {
    /// `node` 对 assign-node 是目标节点，其余动作是任务当前分配的节点
    pub fn check(
        action: TaskAction,
        task: &Task,
        node: Option<&Node>,
    ) -> OrchestratorResult<Transition> {
        let transition = |steps: Vec<DispatchAction>, target_status: Option<TaskStatus>| {
            Ok(Transition {
                action,
                steps,
                target_status,
            })
        };

        match action {
            TaskAction::Execute => {
                require_status(task, action, &[TaskStatus::Active])?;
                require_active_node(node)?;
                transition(vec![DispatchAction::TriggerImmediate], None)
            }
            TaskAction::Pause => {
                require_status(task, action, &[TaskStatus::Active])?;
                require_active_node(node)?;
                transition(vec![DispatchAction::Stop], Some(TaskStatus::Paused))
            }
            TaskAction::Resume => {
                require_status(task, action, &[TaskStatus::Paused, TaskStatus::Active])?;
                require_active_node(node)?;
                transition(vec![DispatchAction::Start], Some(TaskStatus::Active))
            }
            TaskAction::AssignNode => {
                reject_deleted(task, action)?;
                require_active_node(node)?;
                let steps = if task.is_active() {
                    vec![
                        DispatchAction::Stop,
                        DispatchAction::SendDefinition,
                        DispatchAction::Start,
                    ]
                } else {
                    Vec::new()
                };
                transition(steps, None)
            }
            TaskAction::Redeploy => {
                reject_deleted(task, action)?;
                require_active_node(node)?;
                let mut steps = vec![DispatchAction::SendDefinition];
                if task.is_active() {
                    steps.push(DispatchAction::Start);
                }
                transition(steps, None)
            }
            TaskAction::Delete => {
                let mut steps = Vec::new();
                if node.is_some() {
                    if task.is_active() {
                        steps.push(DispatchAction::Stop);
                    }
                    steps.push(DispatchAction::Delete);
                }
                transition(steps, None)
            }
        }
    }
}

fn require_status(task: &Task, action: TaskAction, allowed: &[TaskStatus]) -> OrchestratorResult<()> {
    if allowed.contains(&task.status) {
        return Ok(());
    }
    Err(OrchestratorError::validation(format!(
        "任务 {} 当前状态为 {}，不允许 {} 操作",
        task.id,
        task.status,
        action.as_str()
    )))
}

fn reject_deleted(task: &Task, action: TaskAction) -> OrchestratorResult<()> {
    if task.status == TaskStatus::Deleted {
        return Err(OrchestratorError::validation(format!(
            "任务 {} 已删除，不允许 {} 操作",
            task.id,
            action.as_str()
        )));
    }
    Ok(())
}

fn require_active_node(node: Option<&Node>) -> OrchestratorResult<()> {
    match node {
        None => Err(OrchestratorError::validation("任务未分配执行节点")),
        Some(node) if !node.is_active() => Err(OrchestratorError::validation(format!(
            "执行节点 {} 不可用",
            node.name
        ))),
        Some(_) => Ok(()),
    }
}
