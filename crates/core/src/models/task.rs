use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::update_value::UpdateValue;
use crate::errors::OrchestratorError;

/// 任务定义
///
/// 控制平面管理的可调度工作单元。调度表达式只做存储和下发，
/// 真正按时触发由执行节点负责。
///
/// # 字段说明
///
/// - `cron_expression`: 类 cron 的调度描述，对控制平面是不透明的
/// - `command_type`: 命令类型（http/shell/python）
/// - `requirements`: 可选的依赖清单文本
/// - `node_id`: 当前分配的执行节点，可为空
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub cron_expression: String,
    pub command: String,
    pub command_type: CommandType,
    pub requirements: Option<String>,
    pub status: TaskStatus,
    pub node_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// 是否可以向节点下发（仅 active 状态）
    pub fn is_active(&self) -> bool {
        self.status == TaskStatus::Active
    }

    /// 与另一版本相比，下发给节点的定义字段是否发生了变化
    pub fn definition_differs(&self, other: &Task) -> bool {
        self.name != other.name
            || self.cron_expression != other.cron_expression
            || self.command != other.command
            || self.command_type != other.command_type
            || self.requirements != other.requirements
    }
}

/// 任务状态
///
/// - `Draft`: 草稿，不会被下发
/// - `Active`: 活跃，可以下发和触发
/// - `Paused`: 已暂停
/// - `Deleted`: 已标记删除，除删除时的清理外不再做任何下发动作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Draft,
    #[default]
    Active,
    Paused,
    Deleted,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Draft => "draft",
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
            TaskStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(TaskStatus::Draft),
            "active" => Ok(TaskStatus::Active),
            "paused" => Ok(TaskStatus::Paused),
            "deleted" => Ok(TaskStatus::Deleted),
            _ => Err(OrchestratorError::validation(format!("无效的任务状态: {s}"))),
        }
    }
}

/// 命令类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Http,
    #[default]
    Shell,
    Python,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Http => "http",
            CommandType::Shell => "shell",
            CommandType::Python => "python",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(CommandType::Http),
            "shell" => Ok(CommandType::Shell),
            "python" => Ok(CommandType::Python),
            _ => Err(OrchestratorError::validation(format!("无效的命令类型: {s}"))),
        }
    }
}

/// 创建任务的输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub cron_expression: String,
    pub command: String,
    #[serde(default)]
    pub command_type: CommandType,
    #[serde(default)]
    pub requirements: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub node_id: Option<i64>,
}

impl NewTask {
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.name.trim().is_empty() {
            return Err(OrchestratorError::validation("任务名称不能为空"));
        }
        if self.cron_expression.trim().is_empty() {
            return Err(OrchestratorError::validation("调度表达式不能为空"));
        }
        if self.command.trim().is_empty() {
            return Err(OrchestratorError::validation("命令内容不能为空"));
        }
        if self.status == TaskStatus::Deleted {
            return Err(OrchestratorError::validation("不能以 deleted 状态创建任务"));
        }
        Ok(())
    }

    /// 物化为尚未持久化的任务记录（id 为 0，由存储层分配）
    pub fn into_task(self, now: DateTime<Utc>) -> Task {
        Task {
            id: 0,
            name: self.name,
            description: self.description,
            cron_expression: self.cron_expression,
            command: self.command,
            command_type: self.command_type,
            requirements: self.requirements,
            status: self.status,
            node_id: self.node_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 任务的部分更新
///
/// 可空字段用 [`UpdateValue`] 区分"置空"和"不修改"。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: UpdateValue<String>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub command_type: Option<CommandType>,
    #[serde(default)]
    pub requirements: UpdateValue<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub node_id: UpdateValue<i64>,
}

impl TaskPatch {
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let blank = |v: &Option<String>| v.as_deref().is_some_and(|s| s.trim().is_empty());
        if blank(&self.name) {
            return Err(OrchestratorError::validation("任务名称不能为空"));
        }
        if blank(&self.cron_expression) {
            return Err(OrchestratorError::validation("调度表达式不能为空"));
        }
        if blank(&self.command) {
            return Err(OrchestratorError::validation("命令内容不能为空"));
        }
        Ok(())
    }

    /// 在已有记录上应用修改，返回新版本
    pub fn apply(self, before: &Task, now: DateTime<Utc>) -> Task {
        let mut after = before.clone();
        if let Some(name) = self.name {
            after.name = name;
        }
        after.description = self.description.apply_to(after.description);
        if let Some(expr) = self.cron_expression {
            after.cron_expression = expr;
        }
        if let Some(command) = self.command {
            after.command = command;
        }
        if let Some(command_type) = self.command_type {
            after.command_type = command_type;
        }
        after.requirements = self.requirements.apply_to(after.requirements);
        if let Some(status) = self.status {
            after.status = status;
        }
        after.node_id = self.node_id.apply_to(after.node_id);
        after.updated_at = now;
        after
    }
}
