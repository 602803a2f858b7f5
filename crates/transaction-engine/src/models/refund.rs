//! 退款单实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{OperatorType, OrderStatus, RefundStatus};
use super::money::Money;

/// 退款单
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    pub id: i64,
    pub refund_no: String,
    pub order_id: i64,
    pub order_no: String,
    pub payment_id: i64,
    pub payment_no: String,
    pub user_id: String,
    pub amount: Money,
    #[sqlx(default)]
    pub reason: Option<String>,
    pub status: RefundStatus,
    /// 进入退款前的订单状态，用于拒绝/失败时恢复
    #[sqlx(default)]
    pub prior_order_status: Option<OrderStatus>,
    #[sqlx(default)]
    pub operator_id: Option<String>,
    #[sqlx(default)]
    pub operator_type: Option<OperatorType>,
    #[sqlx(default)]
    pub external_refund_id: Option<String>,
    #[sqlx(default)]
    pub reject_reason: Option<String>,
    #[sqlx(default)]
    pub failure_reason: Option<String>,
    #[sqlx(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub rejected_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 待写入的退款单
#[derive(Debug, Clone)]
pub struct NewRefund {
    pub refund_no: String,
    pub order_id: i64,
    pub order_no: String,
    pub payment_id: i64,
    pub payment_no: String,
    pub user_id: String,
    pub amount: Money,
    pub reason: Option<String>,
    pub prior_order_status: OrderStatus,
}

/// 计算退款终止后订单应恢复的状态
///
/// 优先使用退款单记录的原状态；旧数据没有记录时，已发货回到 SHIPPED，否则回到 PAID
pub fn restoration_status(
    prior: Option<OrderStatus>,
    shipped_at: Option<DateTime<Utc>>,
) -> OrderStatus {
    match prior {
        Some(status) if status.is_refundable() => status,
        _ if shipped_at.is_some() => OrderStatus::Shipped,
        _ => OrderStatus::Paid,
    }
}
