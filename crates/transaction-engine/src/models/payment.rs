//! 支付单实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{PaymentChannel, PaymentMethod, PaymentStatus, PaymentTargetType};
use super::money::Money;

/// 支付单
///
/// 一个支付对象（订单/租赁/预订）可能有多笔支付单，但只会有一笔进入 SUCCESS
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub payment_no: String,
    pub target_type: PaymentTargetType,
    pub target_id: i64,
    pub target_no: String,
    pub user_id: String,
    pub amount: Money,
    /// 已成功退款的累计金额
    pub refunded_amount: Money,
    pub method: PaymentMethod,
    #[sqlx(default)]
    pub channel: Option<PaymentChannel>,
    pub status: PaymentStatus,
    /// 网关交易号
    #[sqlx(default)]
    pub transaction_id: Option<String>,
    #[sqlx(default)]
    pub error_message: Option<String>,
    pub expire_at: DateTime<Utc>,
    #[sqlx(default)]
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending && self.expire_at <= now
    }
}

/// 待写入的支付单
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payment_no: String,
    pub target_type: PaymentTargetType,
    pub target_id: i64,
    pub target_no: String,
    pub user_id: String,
    pub amount: Money,
    pub method: PaymentMethod,
    pub channel: Option<PaymentChannel>,
    pub expire_at: DateTime<Utc>,
}

/// 支付对象摘要
///
/// 订单、租赁单、预订单统一投影为该结构，status 保留原表字符串
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentTarget {
    pub id: i64,
    pub target_no: String,
    pub user_id: String,
    pub amount: Money,
    pub status: String,
}

impl PaymentTarget {
    /// 是否处于可支付状态（三类对象的待支付状态均为 PENDING）
    pub fn is_payable(&self) -> bool {
        self.status == "PENDING"
    }
}
