//! 支付服务
//!
//! 负责为订单/租赁单/预订单发起支付，并幂等地处理网关异步通知。
//!
//! ## 回调幂等
//!
//! 支付单在事务内 `FOR UPDATE` 锁定后才做重复检查、金额核对和状态写入，
//! 同一通知并发投递时只有先拿到锁的一次会生效，其余看到的都是终态并直接应答成功。
//!
//! ## 网关调用
//!
//! 网关下单发生在支付单事务提交之后，不在事务内等待外部网络

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument, warn};

use commerce_shared::config::PaymentConfig;
use commerce_shared::observability::metrics;

use super::dto::{CallbackOutcome, CreatePaymentRequest, CreatePaymentResponse, PaymentDto};
use super::inventory_ledger::InventoryLedger;
use super::serial::generate_payment_no;
use crate::error::{CommerceError, Result};
use crate::gateway::{GatewayNotification, IntentRequest, PaymentGateway, TradeState};
use crate::models::{
    NewPayment, OrderStatus, Payment, PaymentMethod, PaymentStatus, PaymentTargetType,
};
use crate::repository::{OrderRepository, PaymentRepository};

/// 支付服务
pub struct PaymentService {
    pool: PgPool,
    payment_repo: PaymentRepository,
    gateway: Arc<dyn PaymentGateway>,
    expire_minutes: i64,
}

impl PaymentService {
    pub fn new(pool: PgPool, gateway: Arc<dyn PaymentGateway>, config: &PaymentConfig) -> Self {
        Self {
            payment_repo: PaymentRepository::new(pool.clone()),
            pool,
            gateway,
            expire_minutes: config.expire_minutes,
        }
    }

    /// 创建支付单
    ///
    /// 网关支付在支付单落库后请求支付参数；网关失败时支付单保持 PENDING，由过期任务关闭
    #[instrument(skip(self, request), fields(user_id = %request.user_id, target_no = %request.target_no))]
    pub async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<CreatePaymentResponse> {
        let channel = match (request.method, request.channel) {
            (PaymentMethod::Gateway, None) => {
                return Err(CommerceError::Validation(
                    "网关支付必须指定支付渠道".to_string(),
                ));
            }
            (_, channel) => channel,
        };

        let mut tx = self.pool.begin().await?;

        let target = PaymentRepository::find_target_in_tx(&mut tx, request.target_type, &request.target_no)
            .await?
            .filter(|t| t.user_id == request.user_id)
            .ok_or_else(|| CommerceError::PaymentTargetNotFound {
                target_type: request.target_type.as_str().to_string(),
                target_no: request.target_no.clone(),
            })?;

        if !target.is_payable() {
            return Err(match request.target_type {
                PaymentTargetType::Order => CommerceError::InvalidOrderStatus {
                    order_no: target.target_no.clone(),
                    current_status: target.status.clone(),
                },
                _ => CommerceError::PaymentTargetNotFound {
                    target_type: request.target_type.as_str().to_string(),
                    target_no: target.target_no.clone(),
                },
            });
        }

        if !target.amount.is_positive() {
            return Err(CommerceError::Validation(format!(
                "支付金额必须大于 0: {}",
                target.amount
            )));
        }

        let new_payment = NewPayment {
            payment_no: generate_payment_no(),
            target_type: request.target_type,
            target_id: target.id,
            target_no: target.target_no.clone(),
            user_id: request.user_id.clone(),
            amount: target.amount,
            method: request.method,
            channel,
            expire_at: Utc::now() + Duration::minutes(self.expire_minutes),
        };
        let payment = PaymentRepository::create_in_tx(&mut tx, &new_payment).await?;

        tx.commit().await?;

        info!(
            payment_no = %payment.payment_no,
            amount = %payment.amount,
            method = ?payment.method,
            "支付单已创建"
        );

        let intent = match (payment.method, payment.channel) {
            (PaymentMethod::Gateway, Some(channel)) => {
                let intent = self
                    .gateway
                    .create_intent(IntentRequest {
                        reference: payment.payment_no.clone(),
                        description: format!(
                            "{} {}",
                            payment.target_type.as_str(),
                            payment.target_no
                        ),
                        amount_minor: payment.amount.cents(),
                        channel,
                    })
                    .await
                    .inspect_err(|e| {
                        warn!(payment_no = %payment.payment_no, error = %e, "网关下单失败");
                    })?;
                Some(intent)
            }
            _ => None,
        };

        Ok(CreatePaymentResponse {
            payment_no: payment.payment_no,
            amount: payment.amount.to_decimal(),
            expire_at: payment.expire_at,
            intent,
        })
    }

    /// 处理网关支付通知
    ///
    /// 返回值交给 [`super::dto::WebhookAck::from_result`] 决定应答方式
    #[instrument(skip(self, raw_payload, signature))]
    pub async fn handle_callback(
        &self,
        raw_payload: &[u8],
        signature: &str,
    ) -> Result<CallbackOutcome> {
        let started = Instant::now();
        let result = self.reconcile(raw_payload, signature).await;
        metrics::record_payment_callback(callback_label(&result), started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            warn!(error = %e, code = e.error_code(), "支付回调处理失败");
        }

        result
    }

    /// 查询支付单
    pub async fn query_payment(&self, user_id: &str, payment_no: &str) -> Result<PaymentDto> {
        let payment = self
            .payment_repo
            .get_by_no(payment_no)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| CommerceError::PaymentNotFound(payment_no.to_string()))?;

        Ok(PaymentDto::from(&payment))
    }

    /// 关闭已过期的待支付单，不影响订单状态
    #[instrument(skip(self))]
    pub async fn close_expired_payments(&self, batch_size: i64) -> Result<usize> {
        let closed = self.payment_repo.close_expired_batch(batch_size).await?;

        if !closed.is_empty() {
            metrics::record_payments_closed(closed.len() as u64);
            info!(count = closed.len(), payment_nos = ?closed, "过期支付单已关闭");
        }

        Ok(closed.len())
    }

    // ==================== 私有方法 ====================

    async fn reconcile(&self, raw_payload: &[u8], signature: &str) -> Result<CallbackOutcome> {
        let notification = self.gateway.verify_and_parse(raw_payload, signature)?;

        let mut tx = self.pool.begin().await?;

        let payment = PaymentRepository::get_by_no_for_update(&mut tx, &notification.external_order_ref)
            .await?
            .ok_or_else(|| CommerceError::PaymentNotFound(notification.external_order_ref.clone()))?;

        if payment.status.is_terminal() {
            tx.commit().await?;
            info!(
                payment_no = %payment.payment_no,
                status = ?payment.status,
                "支付单已处理，忽略重复通知"
            );
            return Ok(CallbackOutcome::AlreadyProcessed {
                payment_no: payment.payment_no,
                status: payment.status,
            });
        }

        if notification.amount_minor != payment.amount.cents() {
            return Err(CommerceError::CallbackAmountMismatch {
                expected: payment.amount.cents(),
                actual: notification.amount_minor,
            });
        }

        let status = if notification.trade_state == TradeState::Success {
            let paid_at = Utc::now();
            if !PaymentRepository::mark_success_in_tx(
                &mut tx,
                payment.id,
                &notification.external_txn_id,
                paid_at,
            )
            .await?
            {
                return Err(invalid_status(&reload(&mut tx, &payment.payment_no).await?));
            }
            cascade_paid(&mut tx, &payment, paid_at).await?;
            PaymentStatus::Success
        } else {
            let txn_id = Some(notification.external_txn_id.as_str()).filter(|s| !s.is_empty());
            if !PaymentRepository::mark_failed_in_tx(
                &mut tx,
                payment.id,
                txn_id,
                &failure_message(&notification),
            )
            .await?
            {
                return Err(invalid_status(&reload(&mut tx, &payment.payment_no).await?));
            }
            PaymentStatus::Failed
        };

        tx.commit().await?;

        info!(
            payment_no = %payment.payment_no,
            target_no = %payment.target_no,
            status = ?status,
            "支付回调处理完成"
        );

        Ok(CallbackOutcome::Applied {
            payment_no: payment.payment_no,
            status,
        })
    }
}

/// 支付成功后将支付对象置为已支付
///
/// 订单同时累加销量；支付对象已不是待支付状态时只记录告警，支付结果照常落库
async fn cascade_paid(
    tx: &mut PgConnection,
    payment: &Payment,
    paid_at: chrono::DateTime<Utc>,
) -> Result<()> {
    let cascaded = match payment.target_type {
        PaymentTargetType::Order => {
            let paid = OrderRepository::mark_paid_in_tx(&mut *tx, payment.target_id, paid_at).await?;
            if paid {
                let items = OrderRepository::list_items_in_tx(&mut *tx, payment.target_id).await?;
                for item in &items {
                    InventoryLedger::increase_sales_counter_in_tx(
                        &mut *tx,
                        item.product_id,
                        item.quantity,
                    )
                    .await?;
                }
                metrics::record_order_transition(OrderStatus::Paid.as_str());
            }
            paid
        }
        PaymentTargetType::Rental | PaymentTargetType::Booking => {
            PaymentRepository::mark_external_target_paid_in_tx(
                &mut *tx,
                payment.target_type,
                payment.target_id,
                paid_at,
            )
            .await?
        }
    };

    if !cascaded {
        warn!(
            payment_no = %payment.payment_no,
            target_type = ?payment.target_type,
            target_no = %payment.target_no,
            "支付成功但支付对象已不是待支付状态，未级联"
        );
    }

    Ok(())
}

async fn reload(tx: &mut PgConnection, payment_no: &str) -> Result<Payment> {
    PaymentRepository::get_by_no_for_update(tx, payment_no)
        .await?
        .ok_or_else(|| CommerceError::PaymentNotFound(payment_no.to_string()))
}

fn invalid_status(payment: &Payment) -> CommerceError {
    CommerceError::InvalidPaymentStatus {
        payment_no: payment.payment_no.clone(),
        current_status: payment.status.as_str().to_string(),
    }
}

fn failure_message(notification: &GatewayNotification) -> String {
    notification
        .error_message
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("网关交易状态: {:?}", notification.trade_state))
}

fn callback_label(result: &Result<CallbackOutcome>) -> &'static str {
    match result {
        Ok(CallbackOutcome::Applied { .. }) => "applied",
        Ok(CallbackOutcome::AlreadyProcessed { .. }) => "duplicate",
        Err(e) if e.is_callback_integrity() => "rejected",
        Err(e) if e.is_retryable() => "retry",
        Err(_) => "error",
    }
}
