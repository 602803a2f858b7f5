//! 服务层数据传输对象
//!
//! 请求 DTO 中金额以分（[`Money`]）表示；响应 DTO 中金额统一转换为两位小数的
//! [`Decimal`]，并附带状态展示名称

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CommerceError, Result};
use crate::gateway::IntentParams;
use crate::models::{
    DiscountResult, Money, Order, OrderItem, OrderStatus, Payment, PaymentChannel, PaymentMethod,
    PaymentStatus, PaymentTargetType, Refund, RefundStatus, TransactionType,
};

// ==================== 订单 ====================

/// 下单商品行
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: i64,
    #[serde(default)]
    pub sku_id: Option<i64>,
    pub quantity: i32,
}

/// 直接下单请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub items: Vec<OrderItemRequest>,
    #[serde(default)]
    pub address_id: Option<i64>,
    #[serde(default)]
    pub user_coupon_id: Option<i64>,
    #[serde(default)]
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub remark: Option<String>,
}

impl CreateOrderRequest {
    /// 入库前的请求校验
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(CommerceError::Validation("user_id 不能为空".to_string()));
        }
        if self.items.is_empty() {
            return Err(CommerceError::Validation("订单商品不能为空".to_string()));
        }
        if let Some(item) = self.items.iter().find(|i| i.quantity <= 0) {
            return Err(CommerceError::Validation(format!(
                "购买数量必须为正数: product_id={}, quantity={}",
                item.product_id, item.quantity
            )));
        }
        Ok(())
    }
}

/// 购物车结算请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderFromCartRequest {
    pub user_id: String,
    #[serde(default)]
    pub address_id: Option<i64>,
    #[serde(default)]
    pub user_coupon_id: Option<i64>,
    #[serde(default)]
    pub remark: Option<String>,
}

/// 订单商品 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemDto {
    pub product_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku_id: Option<i64>,
    pub product_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku_desc: Option<String>,
    pub price: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
}

impl From<&OrderItem> for OrderItemDto {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            sku_id: item.sku_id,
            product_name: item.product_name.clone(),
            product_image: item.product_image.clone(),
            sku_desc: item.sku_desc.clone(),
            price: item.price.to_decimal(),
            quantity: item.quantity,
            subtotal: item.subtotal.to_decimal(),
        }
    }
}

/// 订单 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub order_no: String,
    pub transaction_type: TransactionType,
    pub status: OrderStatus,
    pub status_name: String,
    pub original_amount: Decimal,
    pub discount_amount: Decimal,
    pub actual_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    pub items: Vec<OrderItemDto>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl OrderDto {
    pub fn from_order(order: &Order, items: &[OrderItem]) -> Self {
        Self {
            order_no: order.order_no.clone(),
            transaction_type: order.transaction_type,
            status: order.status,
            status_name: order.status.display_name().to_string(),
            original_amount: order.original_amount.to_decimal(),
            discount_amount: order.discount_amount.to_decimal(),
            actual_amount: order.actual_amount.to_decimal(),
            address: order.address_snapshot.clone(),
            remark: order.remark.clone(),
            items: items.iter().map(OrderItemDto::from).collect(),
            created_at: order.created_at,
            paid_at: order.paid_at,
            shipped_at: order.shipped_at,
            completed_at: order.completed_at,
            cancelled_at: order.cancelled_at,
        }
    }
}

/// 优惠预览 DTO，未指定优惠券时券优惠为 0
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountPreviewDto {
    pub original_amount: Decimal,
    pub campaign_discount: Decimal,
    pub coupon_discount: Decimal,
    pub final_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_name: Option<String>,
    pub breakdown: Vec<String>,
}

impl From<&DiscountResult> for DiscountPreviewDto {
    fn from(result: &DiscountResult) -> Self {
        Self {
            original_amount: result.original_amount.to_decimal(),
            campaign_discount: result.campaign_discount.to_decimal(),
            coupon_discount: result.coupon_discount.to_decimal(),
            final_amount: result.final_amount.to_decimal(),
            campaign_name: result.campaign_ref.as_ref().map(|r| r.name.clone()),
            coupon_name: result.coupon_ref.as_ref().map(|r| r.name.clone()),
            breakdown: result.breakdown.clone(),
        }
    }
}

// ==================== 支付 ====================

/// 创建支付请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub user_id: String,
    pub target_type: PaymentTargetType,
    pub target_no: String,
    #[serde(default)]
    pub method: PaymentMethod,
    #[serde(default)]
    pub channel: Option<PaymentChannel>,
}

/// 创建支付响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub payment_no: String,
    pub amount: Decimal,
    pub expire_at: DateTime<Utc>,
    /// 网关支付参数（现金支付为空）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentParams>,
}

/// 支付单 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDto {
    pub payment_no: String,
    pub target_type: PaymentTargetType,
    pub target_no: String,
    pub amount: Decimal,
    pub refunded_amount: Decimal,
    pub method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<PaymentChannel>,
    pub status: PaymentStatus,
    pub status_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub expire_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentDto {
    fn from(payment: &Payment) -> Self {
        Self {
            payment_no: payment.payment_no.clone(),
            target_type: payment.target_type,
            target_no: payment.target_no.clone(),
            amount: payment.amount.to_decimal(),
            refunded_amount: payment.refunded_amount.to_decimal(),
            method: payment.method,
            channel: payment.channel,
            status: payment.status,
            status_name: payment.status.display_name().to_string(),
            transaction_id: payment.transaction_id.clone(),
            error_message: payment.error_message.clone(),
            expire_at: payment.expire_at,
            paid_at: payment.paid_at,
            created_at: payment.created_at,
        }
    }
}

/// 回调处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// 本次回调完成了状态变更
    Applied {
        payment_no: String,
        status: PaymentStatus,
    },
    /// 支付单已是终态，本次回调未做任何修改
    AlreadyProcessed {
        payment_no: String,
        status: PaymentStatus,
    },
}

/// 网关回调应答
///
/// - `Ack`: 已处理（含重复通知），网关停止重试
/// - `Reject`: 报文无法处理（验签失败、金额不符、单号不存在），支付单未被修改，网关重试也是安全的
/// - `Retry`: 其他错误（基础设施不可用、内部异常），要求网关稍后重试
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookAck {
    Ack,
    Reject,
    Retry,
}

impl WebhookAck {
    pub fn from_result(result: &Result<CallbackOutcome>) -> Self {
        match result {
            Ok(_) => Self::Ack,
            Err(e) if e.is_callback_integrity() => Self::Reject,
            Err(CommerceError::PaymentNotFound(_)) => Self::Reject,
            // 其余错误（数据库、内部状态异常等）都未落库，交给网关重试
            Err(_) => Self::Retry,
        }
    }

    /// 对应的 HTTP 状态码
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Ack => 200,
            Self::Reject => 400,
            Self::Retry => 503,
        }
    }
}

// ==================== 退款 ====================

/// 退款申请
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRefundRequest {
    pub user_id: String,
    pub order_no: String,
    /// 退款金额（分）
    pub amount: Money,
    #[serde(default)]
    pub reason: Option<String>,
}

/// 退款单 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundDto {
    pub refund_no: String,
    pub order_no: String,
    pub payment_no: String,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub status_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_refund_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Refund> for RefundDto {
    fn from(refund: &Refund) -> Self {
        Self {
            refund_no: refund.refund_no.clone(),
            order_no: refund.order_no.clone(),
            payment_no: refund.payment_no.clone(),
            amount: refund.amount.to_decimal(),
            reason: refund.reason.clone(),
            status: refund.status,
            status_name: refund.status.display_name().to_string(),
            reject_reason: refund.reject_reason.clone(),
            failure_reason: refund.failure_reason.clone(),
            external_refund_id: refund.external_refund_id.clone(),
            created_at: refund.created_at,
            completed_at: refund.completed_at,
        }
    }
}
