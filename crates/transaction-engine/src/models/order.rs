//! 订单实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::{OrderStatus, TransactionType};
use super::money::Money;

/// 商城订单
///
/// 金额关系恒成立：actual_amount = original_amount - discount_amount >= 0
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    /// 订单号（MO + 时间戳 + 6 位随机数）
    pub order_no: String,
    pub user_id: String,
    pub transaction_type: TransactionType,
    pub original_amount: Money,
    pub discount_amount: Money,
    pub actual_amount: Money,
    pub status: OrderStatus,
    #[sqlx(default)]
    pub user_coupon_id: Option<i64>,
    #[sqlx(default)]
    pub campaign_id: Option<i64>,
    /// 收货地址快照
    #[sqlx(default)]
    pub address_snapshot: Option<Value>,
    #[sqlx(default)]
    pub remark: Option<String>,
    #[sqlx(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub shipped_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// 校验订单金额关系
    pub fn amounts_consistent(&self) -> bool {
        self.discount_amount <= self.original_amount
            && self.actual_amount == self.original_amount - self.discount_amount
            && self.actual_amount >= Money::ZERO
    }
}

/// 订单明细（创建后不可变）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    #[sqlx(default)]
    pub sku_id: Option<i64>,
    pub product_name: String,
    #[sqlx(default)]
    pub product_image: Option<String>,
    #[sqlx(default)]
    pub sku_desc: Option<String>,
    pub price: Money,
    pub quantity: i32,
    pub subtotal: Money,
    pub created_at: DateTime<Utc>,
}

/// 待写入的订单明细
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub sku_id: Option<i64>,
    pub product_name: String,
    pub product_image: Option<String>,
    pub sku_desc: Option<String>,
    pub price: Money,
    pub quantity: i32,
    pub subtotal: Money,
}

/// 待写入的订单
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_no: String,
    pub user_id: String,
    pub transaction_type: TransactionType,
    pub original_amount: Money,
    pub discount_amount: Money,
    pub actual_amount: Money,
    pub user_coupon_id: Option<i64>,
    pub campaign_id: Option<i64>,
    pub address_snapshot: Option<Value>,
    pub remark: Option<String>,
}
