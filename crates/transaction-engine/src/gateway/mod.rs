//! 支付网关桥接
//!
//! 网关本身是外部黑盒：创建支付意图、接收带签名的异步通知、发起退款。
//! 交易引擎只通过 [`PaymentGateway`] trait 与其交互，调用方保证不在数据库事务内调用。

pub mod http_bridge;
pub mod signature;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::models::PaymentChannel;

pub use http_bridge::HttpGatewayBridge;

/// 网关交易状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeState {
    /// 支付成功
    Success,
    /// 未支付
    NotPay,
    /// 已关闭
    Closed,
    /// 已撤销
    Revoked,
    /// 支付失败
    PayError,
}

/// 创建支付意图请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRequest {
    /// 商户侧单号（支付单号）
    pub reference: String,
    pub description: String,
    pub amount_minor: i64,
    pub channel: PaymentChannel,
}

/// 支付意图参数，原样交给客户端拉起支付
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentParams {
    pub channel: PaymentChannel,
    /// 网关预支付标识
    pub prepay_id: String,
    /// 渠道相关参数（APP 签名串、扫码链接、H5 跳转地址等）
    #[serde(default)]
    pub params: Value,
}

/// 验签通过后的网关通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayNotification {
    /// 商户侧单号（支付单号）
    #[serde(rename = "outTradeNo")]
    pub external_order_ref: String,
    /// 网关交易号
    #[serde(rename = "transactionId")]
    pub external_txn_id: String,
    pub trade_state: TradeState,
    /// 实付金额（分）
    #[serde(rename = "amount")]
    pub amount_minor: i64,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// 退款请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRequest {
    /// 原支付单号
    pub original_ref: String,
    /// 退款单号（网关侧幂等键）
    pub refund_ref: String,
    pub amount_minor: i64,
    /// 原支付总额
    pub total_minor: i64,
    pub reason: Option<String>,
}

/// 支付网关接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// 创建支付意图
    async fn create_intent(&self, request: IntentRequest) -> Result<IntentParams>;

    /// 验签并解析异步通知
    ///
    /// 失败返回 `CallbackIntegrity`，调用方不得修改任何状态
    fn verify_and_parse(&self, raw: &[u8], signature: &str) -> Result<GatewayNotification>;

    /// 发起退款，返回网关退款单号
    async fn request_refund(&self, request: RefundRequest) -> Result<String>;
}
