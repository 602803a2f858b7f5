//! 订单事件分发器
//!
//! 从 Outbox 取出事件，依次交给已注册的处理器。
//!
//! ## 隔离
//!
//! 每个处理器在同一事务内的独立 savepoint 中运行：
//! 失败时只回滚该 savepoint 并记录告警，其余处理器照常执行。
//! 任一处理器失败的事件会按退避策略安排重试，超过最大次数后标记为 FAILED。

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use sqlx::{Connection, PgConnection, PgPool};
use tracing::{debug, info, instrument, warn};

use commerce_shared::observability::metrics;
use commerce_shared::retry::RetryPolicy;

use super::handler::OrderEventHandler;
use super::loyalty::LoyaltyLedger;
use super::points::PointsHook;
use crate::error::Result;
use crate::models::OrderEvent;
use crate::repository::EventRepository;

/// 单次投递结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 全部处理器成功
    Delivered,
    /// 豁免（会员套餐或金额为 0），直接标记为已投递
    Exempt,
    /// 事件已被其他实例锁定或已不是待投递状态
    Skipped,
    /// 有处理器失败，已安排重试
    Retrying { attempts: i32, error: String },
    /// 超过最大投递次数
    Failed { attempts: i32, error: String },
}

/// 订单事件分发器
pub struct HookDispatcher {
    pool: PgPool,
    handlers: Vec<Arc<dyn OrderEventHandler>>,
    retry_policy: RetryPolicy,
    max_attempts: i32,
}

impl HookDispatcher {
    /// 创建空的分发器
    pub fn new(pool: PgPool, max_attempts: i32) -> Self {
        let max_attempts = max_attempts.max(1);
        Self {
            pool,
            handlers: Vec::new(),
            retry_policy: RetryPolicy::for_event_delivery(max_attempts as u32),
            max_attempts,
        }
    }

    /// 注册处理器，按注册顺序执行
    pub fn register(&mut self, handler: Arc<dyn OrderEventHandler>) -> &mut Self {
        debug!(handler = handler.name(), "注册订单事件处理器");
        self.handlers.push(handler);
        self
    }

    /// 创建包含默认处理器（积分）的分发器
    pub fn with_defaults(pool: PgPool, loyalty: Arc<dyn LoyaltyLedger>, max_attempts: i32) -> Self {
        let mut dispatcher = Self::new(pool, max_attempts);
        dispatcher.register(Arc::new(PointsHook::new(loyalty)));

        info!(handlers = ?dispatcher.handler_names(), "订单事件处理器初始化完成");

        dispatcher
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// 是否需要执行副作用
    ///
    /// 会员套餐交易豁免；金额不大于 0 时无事可做
    pub fn should_dispatch(event: &OrderEvent) -> bool {
        !event.transaction_type.is_hook_exempt() && event.amount.is_positive()
    }

    /// 投递单个事件
    #[instrument(skip(self))]
    pub async fn deliver(&self, event_id: i64) -> Result<DeliveryOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(event) = EventRepository::lock_pending(&mut tx, event_id).await? else {
            tx.rollback().await?;
            return Ok(DeliveryOutcome::Skipped);
        };

        let attempts = event.attempts + 1;

        if !Self::should_dispatch(&event) {
            EventRepository::mark_delivered_in_tx(&mut tx, event.id, attempts).await?;
            tx.commit().await?;
            debug!(order_no = %event.order_no, kind = ?event.kind, "事件豁免，跳过处理器");
            return Ok(DeliveryOutcome::Exempt);
        }

        let failures = self.run_handlers(&mut tx, &event).await;

        let outcome = if failures.is_empty() {
            EventRepository::mark_delivered_in_tx(&mut tx, event.id, attempts).await?;
            DeliveryOutcome::Delivered
        } else {
            let error = failures.join("; ");
            if attempts >= self.max_attempts {
                EventRepository::mark_failed_in_tx(&mut tx, event.id, attempts, &error).await?;
                warn!(
                    order_no = %event.order_no,
                    attempts,
                    error = %error,
                    "订单事件投递次数耗尽，标记为失败"
                );
                DeliveryOutcome::Failed { attempts, error }
            } else {
                let delay = self.retry_policy.delay_for_attempt((attempts - 1) as u32);
                let next_attempt_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::seconds(30));
                EventRepository::schedule_retry_in_tx(
                    &mut tx,
                    event.id,
                    attempts,
                    &error,
                    next_attempt_at,
                )
                .await?;
                DeliveryOutcome::Retrying { attempts, error }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// 投递一批到期事件，返回成功投递（含豁免）的数量
    pub async fn deliver_due(&self, batch_size: i64) -> Result<usize> {
        let repo = EventRepository::new(self.pool.clone());
        let ids = repo.list_due_ids(batch_size).await?;

        // 各事件使用独立事务，可以并行投递
        let results = join_all(ids.iter().map(|&id| self.deliver(id))).await;

        let mut delivered = 0;
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(DeliveryOutcome::Delivered | DeliveryOutcome::Exempt) => delivered += 1,
                Ok(_) => {}
                Err(e) => warn!(event_id = id, error = %e, "订单事件投递出错"),
            }
        }

        Ok(delivered)
    }

    /// 在独立 savepoint 中依次执行处理器，返回失败描述
    async fn run_handlers(&self, conn: &mut PgConnection, event: &OrderEvent) -> Vec<String> {
        let mut failures = Vec::new();

        for handler in self.handlers.iter().filter(|h| h.handles(event.kind)) {
            let result = match conn.begin().await {
                Ok(mut savepoint) => match handler.handle(&mut savepoint, event).await {
                    Ok(()) => savepoint.commit().await.map_err(Into::into),
                    Err(e) => {
                        if let Err(rollback_err) = savepoint.rollback().await {
                            warn!(error = %rollback_err, "回滚 savepoint 失败");
                        }
                        Err(e)
                    }
                },
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(()) => {
                    metrics::record_hook_delivery(handler.name(), "ok");
                }
                Err(e) => {
                    metrics::record_hook_delivery(handler.name(), "failed");
                    warn!(
                        handler = handler.name(),
                        order_no = %event.order_no,
                        kind = ?event.kind,
                        error = %e,
                        "订单事件处理器执行失败"
                    );
                    failures.push(format!("{}: {}", handler.name(), e));
                }
            }
        }

        failures
    }
}
