//! 支付单过期关闭 Worker
//!
//! 定期把超过 `expire_at` 仍未支付的支付单置为 CLOSED。
//! 只关闭支付单，不取消订单；用户可以对同一订单重新发起支付。
//!
//! 使用 `FOR UPDATE SKIP LOCKED` 保证多实例部署时不会重复处理，
//! 也不会与正在处理回调的事务互相阻塞

use std::sync::Arc;
use std::time::Duration;

use commerce_shared::observability::metrics;
use tracing::{debug, error, info};

use crate::service::PaymentService;

/// 支付单过期关闭 Worker
pub struct PaymentExpireWorker {
    payment_service: Arc<PaymentService>,
    poll_interval: Duration,
    batch_size: i64,
}

impl PaymentExpireWorker {
    /// # 参数
    /// - `poll_interval_secs`: 轮询间隔（秒）
    /// - `batch_size`: 每批关闭的最大支付单数
    pub fn new(payment_service: Arc<PaymentService>, poll_interval_secs: u64, batch_size: i64) -> Self {
        Self {
            payment_service,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
            batch_size: batch_size.max(1),
        }
    }

    /// 主循环：持续扫描直到进程退出
    pub async fn run(&self) {
        info!(
            poll_interval = ?self.poll_interval,
            batch_size = self.batch_size,
            "PaymentExpireWorker 已启动"
        );

        loop {
            self.run_once().await;

            metrics::set_worker_last_run("payment_expire_worker");

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// 关闭到期支付单，一批满额时继续处理下一批
    pub async fn run_once(&self) -> usize {
        let mut total = 0;

        loop {
            match self.payment_service.close_expired_payments(self.batch_size).await {
                Ok(closed) => {
                    total += closed;
                    if (closed as i64) < self.batch_size {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "关闭过期支付单出错");
                    break;
                }
            }
        }

        if total > 0 {
            info!(closed = total, "本轮过期支付单关闭完成");
        } else {
            debug!("没有过期支付单");
        }

        total
    }
}
