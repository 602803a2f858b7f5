//! HTTP 网关桥接实现
//!
//! 以 JSON 调用网关 REST 接口，请求体与回调均使用 HMAC-SHA256 签名

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use commerce_shared::config::PaymentConfig;
use commerce_shared::retry::{RetryPolicy, retry_with_policy};

use super::signature;
use super::{
    GatewayNotification, IntentParams, IntentRequest, PaymentGateway, RefundRequest,
};
use crate::error::{CommerceError, Result};

const SIGNATURE_HEADER: &str = "X-Signature";
const MERCHANT_HEADER: &str = "X-Merchant-Id";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IntentBody<'a> {
    app_id: &'a str,
    out_trade_no: &'a str,
    description: &'a str,
    amount: i64,
    channel: &'a str,
    notify_url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentResponse {
    prepay_id: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefundBody<'a> {
    out_trade_no: &'a str,
    out_refund_no: &'a str,
    refund: i64,
    total: i64,
    reason: Option<&'a str>,
    notify_url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefundResponse {
    refund_id: String,
}

/// 基于 reqwest 的网关桥接
pub struct HttpGatewayBridge {
    client: reqwest::Client,
    base_url: String,
    merchant_id: String,
    app_id: String,
    api_secret: String,
    notify_url: String,
    refund_notify_url: String,
    retry_policy: RetryPolicy,
}

impl HttpGatewayBridge {
    pub fn new(config: &PaymentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| CommerceError::Internal(format!("创建 HTTP 客户端失败: {e}")))?;

        Ok(Self {
            client,
            base_url: config.gateway_base_url.trim_end_matches('/').to_string(),
            merchant_id: config.merchant_id.clone(),
            app_id: config.app_id.clone(),
            api_secret: config.api_secret.clone(),
            notify_url: config.notify_url.clone(),
            refund_notify_url: config.refund_notify_url.clone(),
            retry_policy: RetryPolicy::for_gateway_call(),
        })
    }

    /// 签名并发送 POST 请求
    ///
    /// 网关按商户单号/退款单号幂等，连接失败和 5xx 按退避策略重试，4xx 直接返回
    async fn post_signed<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let payload = serde_json::to_vec(body)?;
        let url = format!("{}{}", self.base_url, path);

        retry_with_policy(
            &self.retry_policy,
            path,
            |e: &CallError| matches!(e, CallError::Transient(_)),
            || self.send_once::<R>(&url, &payload),
        )
        .await
        .map_err(|e| CommerceError::Gateway(e.to_string()))
    }

    async fn send_once<R>(&self, url: &str, payload: &[u8]) -> std::result::Result<R, CallError>
    where
        R: for<'de> Deserialize<'de>,
    {
        // 每次重试重新签名，避免时间戳过期
        let header = signature::sign(&self.api_secret, Utc::now().timestamp(), payload)
            .map_err(|e| CallError::Rejected(e.to_string()))?;

        let resp = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(MERCHANT_HEADER, &self.merchant_id)
            .header(SIGNATURE_HEADER, header)
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| CallError::Transient(format!("请求网关失败: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(url = %url, status = %status, body = %text, "网关返回错误");
            let message = format!("网关返回 HTTP {status}: {text}");
            return Err(if status.is_server_error() {
                CallError::Transient(message)
            } else {
                CallError::Rejected(message)
            });
        }

        resp.json::<R>()
            .await
            .map_err(|e| CallError::Rejected(format!("解析网关响应失败: {e}")))
    }
}

/// 单次网关调用失败的分类
#[derive(Debug)]
enum CallError {
    /// 连接失败或 5xx，可以重试
    Transient(String),
    /// 网关明确拒绝或响应无法解析
    Rejected(String),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(m) | Self::Rejected(m) => f.write_str(m),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpGatewayBridge {
    #[instrument(skip(self), fields(reference = %request.reference, channel = ?request.channel))]
    async fn create_intent(&self, request: IntentRequest) -> Result<IntentParams> {
        let body = IntentBody {
            app_id: &self.app_id,
            out_trade_no: &request.reference,
            description: &request.description,
            amount: request.amount_minor,
            channel: request.channel.as_str(),
            notify_url: &self.notify_url,
        };

        let resp: IntentResponse = self.post_signed("/v1/intents", &body).await?;

        info!(prepay_id = %resp.prepay_id, "网关支付意图已创建");

        Ok(IntentParams {
            channel: request.channel,
            prepay_id: resp.prepay_id,
            params: resp.params,
        })
    }

    fn verify_and_parse(&self, raw: &[u8], signature_header: &str) -> Result<GatewayNotification> {
        signature::verify(
            &self.api_secret,
            signature_header,
            raw,
            Utc::now().timestamp(),
        )
        .map_err(|e| CommerceError::CallbackIntegrity(e.to_string()))?;

        serde_json::from_slice::<GatewayNotification>(raw)
            .map_err(|e| CommerceError::CallbackIntegrity(format!("通知报文无法解析: {e}")))
    }

    #[instrument(skip(self), fields(original_ref = %request.original_ref, refund_ref = %request.refund_ref))]
    async fn request_refund(&self, request: RefundRequest) -> Result<String> {
        let body = RefundBody {
            out_trade_no: &request.original_ref,
            out_refund_no: &request.refund_ref,
            refund: request.amount_minor,
            total: request.total_minor,
            reason: request.reason.as_deref(),
            notify_url: &self.refund_notify_url,
        };

        let resp: RefundResponse = self.post_signed("/v1/refunds", &body).await?;

        info!(refund_id = %resp.refund_id, "网关退款已受理");

        Ok(resp.refund_id)
    }
}
