//! 退避策略
//!
//! 三处使用：启动时连接存储、事务冲突重跑、Kafka 消息失败后的重新投递。
//! 等待时间从 `initial_delay` 起逐次翻倍，不超过 `max_delay`。

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 首次执行之外最多再试几次
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// 启动阶段连接 PostgreSQL / MongoDB：重试 5 次，1s 起，封顶 16s
    pub fn startup() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
        }
    }

    /// 事务冲突重跑，`max_attempts` 为含首次在内的总次数
    pub fn for_transaction(max_attempts: u32) -> Self {
        Self {
            max_retries: max_attempts.saturating_sub(1),
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
        }
    }

    /// 消息重新投递：不限次数，直到处理成功或服务停止
    pub fn redelivery(max_delay: Duration) -> Self {
        Self {
            max_retries: u32::MAX,
            initial_delay: Duration::from_millis(500),
            max_delay,
        }
    }

    /// 第 `attempt` 次重试前的等待（从 0 计）
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// `failures` 为已失败的重试次数
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_retries
    }
}

/// 按策略重试 `operation`，`is_retryable` 为 false 的错误立即返回
pub async fn retry_with_policy<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&LedgerError) -> bool,
    mut operation: F,
) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut failures = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if failures > 0 {
                    info!(operation = operation_name, failures, "重试后成功");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) || !policy.should_retry(failures) {
            warn!(operation = operation_name, failures, error = %err, "放弃重试");
            return Err(err);
        }

        let delay = policy.delay_for_attempt(failures);
        warn!(
            operation = operation_name,
            failures,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "操作失败，退避后重试"
        );
        tokio::time::sleep(delay).await;
        failures += 1;
    }
}
