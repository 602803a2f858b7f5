//! 退款服务
//!
//! 处理用户退款申请、撤销，运营审核、拒绝，以及通过网关执行退款。
//!
//! ## 金额守恒
//!
//! 申请时持有支付单行锁统计已占用金额（不含已拒绝、已失败），
//! 保证同一支付单的有效退款总额不超过支付金额。
//!
//! ## 订单状态恢复
//!
//! 撤销、拒绝或网关退款失败时，订单从 REFUNDING 恢复到申请前记录的状态

use std::sync::Arc;

use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument, warn};

use commerce_shared::observability::metrics;

use super::dto::{CreateRefundRequest, RefundDto};
use super::serial::generate_refund_no;
use crate::error::{CommerceError, Result};
use crate::gateway::{PaymentGateway, RefundRequest};
use crate::hooks::HookDispatcher;
use crate::models::{
    NewOrderEvent, NewRefund, OperatorType, Order, OrderEventKind, OrderStatus, PaymentTargetType,
    Refund, RefundStatus, restoration_status,
};
use crate::repository::{EventRepository, OrderRepository, PaymentRepository, RefundRepository};

/// 退款服务
pub struct RefundService {
    pool: PgPool,
    refund_repo: RefundRepository,
    gateway: Arc<dyn PaymentGateway>,
    dispatcher: Arc<HookDispatcher>,
}

impl RefundService {
    pub fn new(
        pool: PgPool,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: Arc<HookDispatcher>,
    ) -> Self {
        Self {
            refund_repo: RefundRepository::new(pool.clone()),
            pool,
            gateway,
            dispatcher,
        }
    }

    /// 用户申请退款
    ///
    /// 校验顺序：订单归属与状态 -> 无处理中退款 -> 不超过订单实付 -> 支付单存在 -> 不超过支付单可退余额
    #[instrument(skip(self, request), fields(user_id = %request.user_id, order_no = %request.order_no, amount = %request.amount))]
    pub async fn create_refund(&self, request: CreateRefundRequest) -> Result<RefundDto> {
        if !request.amount.is_positive() {
            return Err(CommerceError::Validation("退款金额必须大于 0".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let order = OrderRepository::get_by_no_for_update(&mut tx, &request.order_no)
            .await?
            .filter(|o| o.is_owned_by(&request.user_id))
            .ok_or_else(|| CommerceError::OrderNotFound(request.order_no.clone()))?;

        if !order.status.is_refundable() {
            return Err(CommerceError::InvalidOrderStatus {
                order_no: order.order_no.clone(),
                current_status: order.status.as_str().to_string(),
            });
        }

        if RefundRepository::exists_open_for_order_in_tx(&mut tx, order.id).await? {
            return Err(CommerceError::DuplicateRefund(order.order_no.clone()));
        }

        if request.amount > order.actual_amount {
            return Err(CommerceError::RefundAmountExceeded {
                requested: request.amount.cents(),
                refundable: order.actual_amount.cents(),
            });
        }

        let payment = PaymentRepository::get_successful_for_target_for_update(
            &mut tx,
            PaymentTargetType::Order,
            order.id,
        )
        .await?
        .ok_or_else(|| CommerceError::PaymentNotFound(order.order_no.clone()))?;

        let held = RefundRepository::sum_held_for_payment_in_tx(&mut tx, payment.id).await?;
        let refundable = payment.amount.saturating_sub(held);
        if request.amount > refundable {
            return Err(CommerceError::RefundAmountExceeded {
                requested: request.amount.cents(),
                refundable: refundable.cents(),
            });
        }

        let new_refund = NewRefund {
            refund_no: generate_refund_no(),
            order_id: order.id,
            order_no: order.order_no.clone(),
            payment_id: payment.id,
            payment_no: payment.payment_no.clone(),
            user_id: request.user_id.clone(),
            amount: request.amount,
            reason: request.reason.clone(),
            prior_order_status: order.status,
        };
        let refund = RefundRepository::create_in_tx(&mut tx, &new_refund).await?;

        if !OrderRepository::transition_in_tx(&mut tx, order.id, order.status, OrderStatus::Refunding)
            .await?
        {
            return Err(CommerceError::InvalidOrderStatus {
                order_no: order.order_no.clone(),
                current_status: order.status.as_str().to_string(),
            });
        }

        tx.commit().await?;

        metrics::record_refund(RefundStatus::Pending.as_str());
        metrics::record_order_transition(OrderStatus::Refunding.as_str());
        info!(
            refund_no = %refund.refund_no,
            prior_status = %order.status.as_str(),
            "退款申请已创建"
        );

        Ok(RefundDto::from(&refund))
    }

    /// 用户撤销退款申请（仅待审核）
    #[instrument(skip(self))]
    pub async fn cancel_refund(&self, user_id: &str, refund_no: &str) -> Result<RefundDto> {
        let mut tx = self.pool.begin().await?;

        let refund = lock_refund(&mut tx, refund_no)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| CommerceError::RefundNotFound(refund_no.to_string()))?;
        ensure_status(&refund, RefundStatus::Pending)?;

        if !RefundRepository::mark_rejected_in_tx(
            &mut tx,
            refund.id,
            user_id,
            OperatorType::User,
            "用户撤销退款申请",
        )
        .await?
        {
            return Err(invalid_status(&refund));
        }
        restore_order(&mut tx, &refund).await?;

        let refund = reload(&mut tx, refund_no).await?;
        tx.commit().await?;

        metrics::record_refund(RefundStatus::Rejected.as_str());
        info!(refund_no = %refund_no, "用户已撤销退款申请");

        Ok(RefundDto::from(&refund))
    }

    /// 运营审核通过
    ///
    /// 重复审核已通过（或已在处理、已成功）的退款单直接返回当前状态
    #[instrument(skip(self))]
    pub async fn approve_refund(&self, refund_no: &str, operator_id: &str) -> Result<RefundDto> {
        let mut tx = self.pool.begin().await?;

        let refund = lock_refund(&mut tx, refund_no)
            .await?
            .ok_or_else(|| CommerceError::RefundNotFound(refund_no.to_string()))?;

        match refund.status {
            RefundStatus::Pending => {}
            RefundStatus::Approved | RefundStatus::Processing | RefundStatus::Success => {
                tx.commit().await?;
                info!(refund_no = %refund_no, status = ?refund.status, "退款单已审核，忽略重复审核");
                return Ok(RefundDto::from(&refund));
            }
            _ => return Err(invalid_status(&refund)),
        }

        if !RefundRepository::mark_approved_in_tx(&mut tx, refund.id, operator_id).await? {
            return Err(invalid_status(&refund));
        }

        let refund = reload(&mut tx, refund_no).await?;
        tx.commit().await?;

        metrics::record_refund(RefundStatus::Approved.as_str());
        info!(refund_no = %refund_no, operator_id = %operator_id, "退款审核通过");

        Ok(RefundDto::from(&refund))
    }

    /// 运营拒绝退款
    #[instrument(skip(self))]
    pub async fn reject_refund(
        &self,
        refund_no: &str,
        operator_id: &str,
        reason: &str,
    ) -> Result<RefundDto> {
        let mut tx = self.pool.begin().await?;

        let refund = lock_refund(&mut tx, refund_no)
            .await?
            .ok_or_else(|| CommerceError::RefundNotFound(refund_no.to_string()))?;
        ensure_status(&refund, RefundStatus::Pending)?;

        if !RefundRepository::mark_rejected_in_tx(
            &mut tx,
            refund.id,
            operator_id,
            OperatorType::Staff,
            reason,
        )
        .await?
        {
            return Err(invalid_status(&refund));
        }
        restore_order(&mut tx, &refund).await?;

        let refund = reload(&mut tx, refund_no).await?;
        tx.commit().await?;

        metrics::record_refund(RefundStatus::Rejected.as_str());
        info!(refund_no = %refund_no, operator_id = %operator_id, "退款已拒绝");

        Ok(RefundDto::from(&refund))
    }

    /// 通过网关执行已审核的退款
    ///
    /// 1. 事务一：APPROVED → PROCESSING
    /// 2. 事务外调用网关退款
    /// 3. 事务二：成功则累加支付单已退金额、订单置为已退款并写入退款事件；
    ///    失败则退款单置为 FAILED，订单恢复原状态
    #[instrument(skip(self))]
    pub async fn execute_refund(&self, refund_no: &str) -> Result<RefundDto> {
        let mut tx = self.pool.begin().await?;

        let refund = lock_refund(&mut tx, refund_no)
            .await?
            .ok_or_else(|| CommerceError::RefundNotFound(refund_no.to_string()))?;

        if refund.status == RefundStatus::Success {
            tx.commit().await?;
            return Ok(RefundDto::from(&refund));
        }
        ensure_status(&refund, RefundStatus::Approved)?;

        if !RefundRepository::mark_processing_in_tx(&mut tx, refund.id).await? {
            return Err(invalid_status(&refund));
        }

        let payment = PaymentRepository::get_by_no_for_update(&mut tx, &refund.payment_no)
            .await?
            .ok_or_else(|| CommerceError::PaymentNotFound(refund.payment_no.clone()))?;

        tx.commit().await?;

        let gateway_result = self
            .gateway
            .request_refund(RefundRequest {
                original_ref: payment.payment_no.clone(),
                refund_ref: refund.refund_no.clone(),
                amount_minor: refund.amount.cents(),
                total_minor: payment.amount.cents(),
                reason: refund.reason.clone(),
            })
            .await;

        let mut tx = self.pool.begin().await?;

        match gateway_result {
            Ok(external_refund_id) => {
                if !RefundRepository::mark_success_in_tx(&mut tx, refund.id, &external_refund_id)
                    .await?
                {
                    return Err(invalid_status(&reload(&mut tx, refund_no).await?));
                }
                PaymentRepository::add_refunded_amount_in_tx(&mut tx, payment.id, refund.amount)
                    .await?;

                let order = lock_order_by_id(&mut tx, refund.order_id).await?;
                let event_id = if OrderRepository::transition_in_tx(
                    &mut tx,
                    order.id,
                    OrderStatus::Refunding,
                    OrderStatus::Refunded,
                )
                .await?
                {
                    let event =
                        NewOrderEvent::for_order(&order, OrderEventKind::OrderRefunded, refund.amount);
                    Some(EventRepository::create_in_tx(&mut tx, &event).await?)
                } else {
                    warn!(
                        order_no = %order.order_no,
                        status = ?order.status,
                        "订单不在退款中状态，未置为已退款"
                    );
                    None
                };

                let refund = reload(&mut tx, refund_no).await?;
                tx.commit().await?;

                metrics::record_refund(RefundStatus::Success.as_str());
                metrics::record_order_transition(OrderStatus::Refunded.as_str());
                info!(
                    refund_no = %refund_no,
                    external_refund_id = %external_refund_id,
                    amount = %refund.amount,
                    "退款成功"
                );

                if let Some(event_id) = event_id {
                    self.dispatch(event_id).await;
                }

                Ok(RefundDto::from(&refund))
            }
            Err(e) => {
                let reason = e.to_string();
                if !RefundRepository::mark_failed_in_tx(&mut tx, refund.id, &reason).await? {
                    return Err(invalid_status(&reload(&mut tx, refund_no).await?));
                }
                restore_order(&mut tx, &refund).await?;

                let refund = reload(&mut tx, refund_no).await?;
                tx.commit().await?;

                metrics::record_refund(RefundStatus::Failed.as_str());
                warn!(refund_no = %refund_no, error = %reason, "网关退款失败，订单已恢复");

                Ok(RefundDto::from(&refund))
            }
        }
    }

    /// 查询退款单
    pub async fn get_refund(&self, user_id: &str, refund_no: &str) -> Result<RefundDto> {
        let refund = self
            .refund_repo
            .get_by_no(refund_no)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| CommerceError::RefundNotFound(refund_no.to_string()))?;

        Ok(RefundDto::from(&refund))
    }

    /// 查询用户退款列表
    pub async fn list_refunds(&self, user_id: &str, limit: i64) -> Result<Vec<RefundDto>> {
        let refunds = self.refund_repo.list_by_user(user_id, limit).await?;
        Ok(refunds.iter().map(RefundDto::from).collect())
    }

    async fn dispatch(&self, event_id: i64) {
        if let Err(e) = self.dispatcher.deliver(event_id).await {
            warn!(event_id, error = %e, "退款事件即时投递失败，等待后台重试");
        }
    }
}

async fn lock_refund(tx: &mut PgConnection, refund_no: &str) -> Result<Option<Refund>> {
    RefundRepository::get_by_no_for_update(tx, refund_no).await
}

async fn reload(tx: &mut PgConnection, refund_no: &str) -> Result<Refund> {
    lock_refund(tx, refund_no)
        .await?
        .ok_or_else(|| CommerceError::RefundNotFound(refund_no.to_string()))
}

async fn lock_order_by_id(tx: &mut PgConnection, order_id: i64) -> Result<Order> {
    OrderRepository::get_by_id_for_update(tx, order_id)
        .await?
        .ok_or_else(|| CommerceError::Internal(format!("退款关联的订单不存在: {order_id}")))
}

/// 订单从退款中恢复到申请前的状态
async fn restore_order(tx: &mut PgConnection, refund: &Refund) -> Result<()> {
    let order = lock_order_by_id(&mut *tx, refund.order_id).await?;

    if order.status != OrderStatus::Refunding {
        warn!(
            order_no = %order.order_no,
            status = ?order.status,
            "订单不在退款中状态，跳过恢复"
        );
        return Ok(());
    }

    let target = restoration_status(refund.prior_order_status, order.shipped_at);
    OrderRepository::transition_in_tx(&mut *tx, order.id, OrderStatus::Refunding, target).await?;
    metrics::record_order_transition(target.as_str());

    info!(order_no = %order.order_no, restored = target.as_str(), "订单状态已恢复");
    Ok(())
}

fn ensure_status(refund: &Refund, expected: RefundStatus) -> Result<()> {
    if refund.status == expected {
        Ok(())
    } else {
        Err(invalid_status(refund))
    }
}

fn invalid_status(refund: &Refund) -> CommerceError {
    CommerceError::InvalidRefundStatus {
        refund_no: refund.refund_no.clone(),
        current_status: refund.status.as_str().to_string(),
    }
}
