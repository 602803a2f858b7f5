//! 订单事件 Outbox Worker
//!
//! 定期投递到期的 PENDING 订单事件：
//! 1. 即时投递失败或进程在投递前退出的事件
//! 2. 处理器失败后按退避策略安排重试的事件
//!
//! 单个事件在投递事务内以 `FOR UPDATE SKIP LOCKED` 锁定，多实例不会重复投递

use std::sync::Arc;
use std::time::Duration;

use commerce_shared::observability::metrics;
use tracing::{debug, error, info};

use crate::hooks::HookDispatcher;

/// 订单事件 Outbox Worker
pub struct HookOutboxWorker {
    dispatcher: Arc<HookDispatcher>,
    poll_interval: Duration,
    batch_size: i64,
}

impl HookOutboxWorker {
    pub fn new(dispatcher: Arc<HookDispatcher>, poll_interval_secs: u64, batch_size: i64) -> Self {
        Self {
            dispatcher,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
            batch_size: batch_size.max(1),
        }
    }

    pub async fn run(&self) {
        info!(
            poll_interval = ?self.poll_interval,
            batch_size = self.batch_size,
            handlers = ?self.dispatcher.handler_names(),
            "HookOutboxWorker 已启动"
        );

        loop {
            match self.dispatcher.deliver_due(self.batch_size).await {
                Ok(0) => debug!("没有待投递的订单事件"),
                Ok(delivered) => info!(delivered, "订单事件投递完成"),
                Err(e) => error!(error = %e, "扫描待投递订单事件出错"),
            }

            metrics::set_worker_last_run("hook_outbox_worker");

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
