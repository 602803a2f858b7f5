//! 退避重试
//!
//! 两处使用同一套指数退避公式：
//! - 网关 HTTP 调用的同步重试（[`retry_with_policy`]）
//! - 订单事件 Outbox 的下次投递时间（[`RetryPolicy::delay_for_attempt`]）

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

/// 退避策略
///
/// 第 n 次重试前等待 `initial_delay * multiplier^n`，不超过 `max_delay`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大重试次数（不含首次执行）
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_gateway_call()
    }
}

impl RetryPolicy {
    /// 网关调用：最多重试 2 次，200ms 起步，最长 2 秒
    ///
    /// 调用方在请求线程内等待，退避总时长必须远小于网关超时
    pub fn for_gateway_call() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }

    /// 订单事件投递：30 秒起步，最长 1 小时
    pub fn for_event_delivery(max_attempts: u32) -> Self {
        Self {
            max_retries: max_attempts,
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
            multiplier: 2.0,
        }
    }

    /// 第 `attempt` 次重试前的等待时间（从 0 开始）
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exp);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// 已失败 `failures` 次后是否还能重试
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_retries
    }
}

/// 按策略执行异步操作
///
/// `is_retryable` 返回 false 的错误立即返回，不消耗重试次数
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut failures: u32 = 0;

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
            warn!(
                operation = operation_name,
                failures,
                error = %err,
                "操作失败，不再重试"
            );
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
