//! 交易引擎错误类型
//!
//! 定义订单、支付、退款流程的业务错误和系统错误

use thiserror::Error;

/// 交易引擎错误类型
#[derive(Debug, Error)]
pub enum CommerceError {
    // === 参数校验 ===
    #[error("参数校验失败: {0}")]
    Validation(String),

    // === 商品与库存 ===
    #[error("商品不存在: {0}")]
    ProductNotFound(i64),

    #[error("商品规格不存在: sku_id={sku_id}, product_id={product_id}")]
    SkuNotFound { product_id: i64, sku_id: i64 },

    #[error("商品已下架: {0}")]
    ProductOffShelf(i64),

    #[error("库存不足: product_id={product_id}, requested={requested}")]
    InsufficientStock { product_id: i64, requested: i32 },

    #[error("购物车中没有选中的商品")]
    CartEmpty,

    // === 订单 ===
    #[error("订单不存在: {0}")]
    OrderNotFound(String),

    #[error("订单状态不允许此操作: order_no={order_no}, current_status={current_status}")]
    InvalidOrderStatus {
        order_no: String,
        current_status: String,
    },

    #[error("优惠券不可用: user_coupon_id={0}")]
    CouponUnavailable(i64),

    // === 支付 ===
    #[error("支付单不存在: {0}")]
    PaymentNotFound(String),

    #[error("支付单状态不允许此操作: payment_no={payment_no}, current_status={current_status}")]
    InvalidPaymentStatus {
        payment_no: String,
        current_status: String,
    },

    #[error("支付对象不存在或不可支付: {target_type} {target_no}")]
    PaymentTargetNotFound {
        target_type: String,
        target_no: String,
    },

    // === 退款 ===
    #[error("退款单不存在: {0}")]
    RefundNotFound(String),

    #[error("退款单状态不允许此操作: refund_no={refund_no}, current_status={current_status}")]
    InvalidRefundStatus {
        refund_no: String,
        current_status: String,
    },

    #[error("退款金额超出可退金额: 申请 {requested} 分, 可退 {refundable} 分")]
    RefundAmountExceeded { requested: i64, refundable: i64 },

    #[error("订单已有处理中的退款: {0}")]
    DuplicateRefund(String),

    // === 回调完整性 ===
    #[error("回调验签失败: {0}")]
    CallbackIntegrity(String),

    #[error("回调金额不一致: 期望 {expected} 分, 实际 {actual} 分")]
    CallbackAmountMismatch { expected: i64, actual: i64 },

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("支付网关错误: {0}")]
    Gateway(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 交易引擎 Result 类型别名
pub type Result<T> = std::result::Result<T, CommerceError>;

impl CommerceError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Gateway(_))
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_)
                | Self::Serialization(_)
                | Self::Gateway(_)
                | Self::Internal(_)
                | Self::CallbackIntegrity(_)
                | Self::CallbackAmountMismatch { .. }
        )
    }

    /// 是否为回调完整性错误（验签失败或金额不符）
    pub fn is_callback_integrity(&self) -> bool {
        matches!(
            self,
            Self::CallbackIntegrity(_) | Self::CallbackAmountMismatch { .. }
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            Self::SkuNotFound { .. } => "SKU_NOT_FOUND",
            Self::ProductOffShelf(_) => "PRODUCT_OFF_SHELF",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::CartEmpty => "CART_EMPTY",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::InvalidOrderStatus { .. } => "INVALID_ORDER_STATUS",
            Self::CouponUnavailable(_) => "COUPON_UNAVAILABLE",
            Self::PaymentNotFound(_) => "PAYMENT_NOT_FOUND",
            Self::InvalidPaymentStatus { .. } => "INVALID_PAYMENT_STATUS",
            Self::PaymentTargetNotFound { .. } => "PAYMENT_TARGET_NOT_FOUND",
            Self::RefundNotFound(_) => "REFUND_NOT_FOUND",
            Self::InvalidRefundStatus { .. } => "INVALID_REFUND_STATUS",
            Self::RefundAmountExceeded { .. } => "REFUND_AMOUNT_EXCEEDED",
            Self::DuplicateRefund(_) => "DUPLICATE_REFUND",
            Self::CallbackIntegrity(_) => "CALLBACK_INTEGRITY",
            Self::CallbackAmountMismatch { .. } => "CALLBACK_AMOUNT_MISMATCH",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Gateway(_) => "GATEWAY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
