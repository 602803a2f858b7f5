//! 业务单号生成
//!
//! 格式: 前缀 + yyyyMMddHHmmss + 6 位随机数

use chrono::Utc;
use uuid::Uuid;

/// 商城订单号前缀
pub const ORDER_PREFIX: &str = "MO";
/// 支付单号前缀
pub const PAYMENT_PREFIX: &str = "PAY";
/// 退款单号前缀
pub const REFUND_PREFIX: &str = "RF";

pub fn generate_serial_no(prefix: &str) -> String {
    let now = Utc::now();
    let random = Uuid::new_v4().as_u128() % 1_000_000;
    format!("{}{}{:06}", prefix, now.format("%Y%m%d%H%M%S"), random)
}

pub fn generate_order_no() -> String {
    generate_serial_no(ORDER_PREFIX)
}

pub fn generate_payment_no() -> String {
    generate_serial_no(PAYMENT_PREFIX)
}

pub fn generate_refund_no() -> String {
    generate_serial_no(REFUND_PREFIX)
}
