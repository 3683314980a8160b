use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 节点控制通道配置
///
/// 每个需要重试的下发动作最坏耗时约为
/// `max_attempts × (request_timeout + retry_delay)`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub health_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            health_timeout_seconds: 5,
            request_timeout_seconds: 10,
            max_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.health_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("健康检查超时时间必须大于0"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }
        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("最大尝试次数必须大于0"));
        }
        Ok(())
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
