//! 部分更新（PATCH）使用的字段值类型
//!
//! 区分"设置为某值"、"置空"和"不修改"三种情况。

use serde::{Deserialize, Serialize};

/// 可空字段的更新操作
///
/// 配合 `#[serde(default)]` 使用：字段缺失时为 `NoChange`，
/// 显式 `null` 为 `Unset`，其他值为 `Set`。
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum UpdateValue<T> {
    Set(T),
    Unset,
    #[default]
    NoChange,
}

impl<T> UpdateValue<T> {
    /// 应用到已有值上
    pub fn apply_to(self, existing: Option<T>) -> Option<T> {
        match self {
            UpdateValue::Set(value) => Some(value),
            UpdateValue::Unset => None,
            UpdateValue::NoChange => existing,
        }
    }
}

impl<'de, T> Deserialize<'de> for UpdateValue<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // 字段缺失由 serde(default) 处理，这里只会看到值或 null
        match Option::<T>::deserialize(deserializer)? {
            Some(value) => Ok(UpdateValue::Set(value)),
            None => Ok(UpdateValue::Unset),
        }
    }
}
