//! 订单事件（Outbox）实体
//!
//! 订单完成、退款成功时与状态变更同事务写入，由 Hook 分发器异步投递

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{EventStatus, OrderEventKind, TransactionType};
use super::money::Money;
use super::order::Order;

/// 订单事件
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub id: i64,
    pub event_no: String,
    pub order_id: i64,
    pub order_no: String,
    pub user_id: String,
    pub transaction_type: TransactionType,
    pub kind: OrderEventKind,
    /// 事件金额：完成事件为实付金额，退款事件为退款金额
    pub amount: Money,
    pub status: EventStatus,
    pub attempts: i32,
    #[sqlx(default)]
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    #[sqlx(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 待写入的订单事件
#[derive(Debug, Clone)]
pub struct NewOrderEvent {
    pub event_no: String,
    pub order_id: i64,
    pub order_no: String,
    pub user_id: String,
    pub transaction_type: TransactionType,
    pub kind: OrderEventKind,
    pub amount: Money,
}

impl NewOrderEvent {
    pub fn for_order(order: &Order, kind: OrderEventKind, amount: Money) -> Self {
        let suffix = match kind {
            OrderEventKind::OrderCompleted => "C",
            OrderEventKind::OrderRefunded => "R",
        };
        Self {
            event_no: format!("EV{}{}{}", order.order_no, suffix, Utc::now().timestamp_millis()),
            order_id: order.id,
            order_no: order.order_no.clone(),
            user_id: order.user_id.clone(),
            transaction_type: order.transaction_type,
            kind,
            amount,
        }
    }
}
