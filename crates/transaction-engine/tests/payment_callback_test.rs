//! 支付回调集成测试
//!
//! 重点验证回调幂等：重复通知、并发通知、金额不符、验签失败都不会破坏支付单与订单状态。
//!
//! ## 运行方式
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo test --test payment_callback_test -- --ignored
//! ```

mod common;

use std::sync::Arc;

use commerce_shared::test_utils::{TestAssertions, test_business_no};
use rust_decimal::Decimal;
use transaction_engine::error::CommerceError;
use transaction_engine::models::{
    OrderStatus, PaymentChannel, PaymentMethod, PaymentStatus, PaymentTargetType,
};
use transaction_engine::service::dto::{
    CallbackOutcome, CreateOrderRequest, CreatePaymentRequest, CreatePaymentResponse,
    OrderItemRequest, WebhookAck,
};
use transaction_engine::worker::PaymentExpireWorker;

use common::*;

// ==================== 辅助函数 ====================

/// 下单并创建网关支付单
async fn order_with_payment(
    engine: &Engine,
    user_id: &str,
    product_id: i64,
) -> (String, CreatePaymentResponse) {
    let order = engine
        .orders
        .create_order(CreateOrderRequest {
            user_id: user_id.to_string(),
            items: vec![OrderItemRequest {
                product_id,
                sku_id: None,
                quantity: 1,
            }],
            address_id: None,
            user_coupon_id: None,
            transaction_type: Default::default(),
            remark: None,
        })
        .await
        .expect("下单失败");

    let payment = engine
        .payments
        .create_payment(payment_request(user_id, PaymentTargetType::Order, &order.order_no))
        .await
        .expect("创建支付单失败");

    (order.order_no, payment)
}

fn payment_request(user_id: &str, target_type: PaymentTargetType, target_no: &str) -> CreatePaymentRequest {
    CreatePaymentRequest {
        user_id: user_id.to_string(),
        target_type,
        target_no: target_no.to_string(),
        method: PaymentMethod::Gateway,
        channel: Some(PaymentChannel::App),
    }
}

fn cents(amount: Decimal) -> i64 {
    (amount * Decimal::from(100)).try_into().expect("金额转换失败")
}

// ==================== 测试用例 ====================

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_create_payment_returns_intent() {
    let engine = setup_engine().await;
    seed_product(&engine.pool, 930_001, 9900, 5).await;
    let user = unique_user("pay-intent");

    let (_, payment) = order_with_payment(&engine, &user, 930_001).await;

    assert!(payment.payment_no.starts_with("PAY"));
    assert_eq!(payment.payment_no.len(), 23);
    let intent = payment.intent.expect("网关支付应返回支付参数");
    assert_eq!(intent.prepay_id, format!("prepay-{}", payment.payment_no));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_gateway_payment_requires_channel() {
    let engine = setup_engine().await;
    let user = unique_user("pay-channel");

    let mut request = payment_request(&user, PaymentTargetType::Order, "MO-NOT-USED");
    request.channel = None;
    let err = engine.payments.create_payment(request).await.unwrap_err();

    assert!(matches!(err, CommerceError::Validation(_)));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_duplicate_success_callback_is_noop() {
    let engine = setup_engine().await;
    seed_product(&engine.pool, 930_011, 20000, 5).await;
    let user = unique_user("pay-dup");

    let (order_no, payment) = order_with_payment(&engine, &user, 930_011).await;
    let (body, header) = signed_notification(&payment.payment_no, "txn-dup-1", "SUCCESS", cents(payment.amount));

    let first = engine.payments.handle_callback(&body, &header).await.unwrap();
    assert_eq!(
        first,
        CallbackOutcome::Applied {
            payment_no: payment.payment_no.clone(),
            status: PaymentStatus::Success,
        }
    );
    assert_eq!(order_status(&engine.pool, &order_no).await, "PAID");
    let (_, sales_after_first) = product_stock(&engine.pool, 930_011).await;

    let second = engine.payments.handle_callback(&body, &header).await;
    assert_eq!(WebhookAck::from_result(&second), WebhookAck::Ack);
    assert!(matches!(second.unwrap(), CallbackOutcome::AlreadyProcessed { .. }));

    // 状态与销量与第一次处理后完全一致
    assert_eq!(order_status(&engine.pool, &order_no).await, "PAID");
    assert_eq!(product_stock(&engine.pool, 930_011).await.1, sales_after_first);

    let queried = engine.payments.query_payment(&user, &payment.payment_no).await.unwrap();
    assert_eq!(queried.status, PaymentStatus::Success);
    assert_eq!(queried.transaction_id.as_deref(), Some("txn-dup-1"));
    TestAssertions::assert_recent(
        queried.paid_at.expect("支付成功应有支付时间"),
        chrono::Duration::seconds(30),
    );
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_concurrent_callbacks_apply_once() {
    let engine = Arc::new(setup_engine().await);
    seed_product(&engine.pool, 930_021, 5000, 5).await;
    let user = unique_user("pay-race");

    let (order_no, payment) = order_with_payment(&engine, &user, 930_021).await;
    let (body, header) = signed_notification(&payment.payment_no, "txn-race", "SUCCESS", cents(payment.amount));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let engine = engine.clone();
        let body = body.clone();
        let header = header.clone();
        handles.push(tokio::spawn(async move {
            engine.payments.handle_callback(&body, &header).await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if let CallbackOutcome::Applied { .. } = handle.await.unwrap().unwrap() {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(order_status(&engine.pool, &order_no).await, "PAID");
    assert_eq!(product_stock(&engine.pool, 930_021).await.1, 1);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_amount_mismatch_leaves_payment_pending() {
    let engine = setup_engine().await;
    seed_product(&engine.pool, 930_031, 20000, 5).await;
    let user = unique_user("pay-mismatch");

    let (order_no, payment) = order_with_payment(&engine, &user, 930_031).await;
    let (body, header) = signed_notification(&payment.payment_no, "txn-short", "SUCCESS", 1);

    let result = engine.payments.handle_callback(&body, &header).await;
    assert_eq!(WebhookAck::from_result(&result), WebhookAck::Reject);
    assert!(matches!(
        result.unwrap_err(),
        CommerceError::CallbackAmountMismatch { actual: 1, .. }
    ));

    let queried = engine.payments.query_payment(&user, &payment.payment_no).await.unwrap();
    assert_eq!(queried.status, PaymentStatus::Pending);
    assert_eq!(order_status(&engine.pool, &order_no).await, "PENDING");
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_bad_signature_rejected_without_changes() {
    let engine = setup_engine().await;
    seed_product(&engine.pool, 930_041, 3000, 5).await;
    let user = unique_user("pay-sig");

    let (order_no, payment) = order_with_payment(&engine, &user, 930_041).await;
    let (body, _) = signed_notification(&payment.payment_no, "txn-sig", "SUCCESS", cents(payment.amount));
    let forged = transaction_engine::gateway::signature::sign(
        "attacker-secret",
        chrono::Utc::now().timestamp(),
        &body,
    )
    .unwrap();

    let result = engine.payments.handle_callback(&body, &forged).await;
    assert_eq!(WebhookAck::from_result(&result), WebhookAck::Reject);
    assert!(result.unwrap_err().is_callback_integrity());
    assert_eq!(order_status(&engine.pool, &order_no).await, "PENDING");
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_failed_trade_marks_payment_failed_and_order_stays_payable() {
    let engine = setup_engine().await;
    seed_product(&engine.pool, 930_051, 3000, 5).await;
    let user = unique_user("pay-failed");

    let (order_no, payment) = order_with_payment(&engine, &user, 930_051).await;
    let (body, header) = signed_notification(&payment.payment_no, "", "PAY_ERROR", cents(payment.amount));

    let outcome = engine.payments.handle_callback(&body, &header).await.unwrap();
    assert_eq!(
        outcome,
        CallbackOutcome::Applied {
            payment_no: payment.payment_no.clone(),
            status: PaymentStatus::Failed,
        }
    );

    let queried = engine.payments.query_payment(&user, &payment.payment_no).await.unwrap();
    assert_eq!(queried.status, PaymentStatus::Failed);
    assert!(queried.error_message.is_some());

    // 订单仍可重新发起支付
    assert_eq!(order_status(&engine.pool, &order_no).await, "PENDING");
    let retry = engine
        .payments
        .create_payment(payment_request(&user, PaymentTargetType::Order, &order_no))
        .await
        .unwrap();
    assert_ne!(retry.payment_no, payment.payment_no);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_paid_order_cannot_be_paid_again() {
    let engine = setup_engine().await;
    seed_product(&engine.pool, 930_061, 3000, 5).await;
    let user = unique_user("pay-twice");

    let (order_no, payment) = order_with_payment(&engine, &user, 930_061).await;
    let (body, header) = signed_notification(&payment.payment_no, "txn-twice", "SUCCESS", cents(payment.amount));
    engine.payments.handle_callback(&body, &header).await.unwrap();

    let err = engine
        .payments
        .create_payment(payment_request(&user, PaymentTargetType::Order, &order_no))
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::InvalidOrderStatus { .. }));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_rental_payment_cascades_to_rental() {
    let engine = setup_engine().await;
    let user = unique_user("pay-rental");
    let rental_no = test_business_no("RT");

    sqlx::query("INSERT INTO rentals (rental_no, user_id, actual_amount) VALUES ($1, $2, 15000)")
        .bind(&rental_no)
        .bind(&user)
        .execute(&engine.pool)
        .await
        .unwrap();

    let payment = engine
        .payments
        .create_payment(payment_request(&user, PaymentTargetType::Rental, &rental_no))
        .await
        .unwrap();
    assert_eq!(payment.amount, Decimal::from(150));

    let (body, header) = signed_notification(&payment.payment_no, "txn-rental", "SUCCESS", 15000);
    engine.payments.handle_callback(&body, &header).await.unwrap();

    let status: String = sqlx::query_scalar("SELECT status FROM rentals WHERE rental_no = $1")
        .bind(&rental_no)
        .fetch_one(&engine.pool)
        .await
        .unwrap();
    assert_eq!(status, "PAID");
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_expire_worker_closes_payment_but_not_order() {
    let engine = Arc::new(setup_engine().await);
    seed_product(&engine.pool, 930_071, 3000, 5).await;
    let user = unique_user("pay-expire");

    let (order_no, payment) = order_with_payment(&engine, &user, 930_071).await;
    sqlx::query("UPDATE payments SET expire_at = NOW() - INTERVAL '1 minute' WHERE payment_no = $1")
        .bind(&payment.payment_no)
        .execute(&engine.pool)
        .await
        .unwrap();

    let payments = Arc::new(transaction_engine::service::PaymentService::new(
        engine.pool.clone(),
        engine.gateway.clone(),
        &commerce_shared::config::PaymentConfig::default(),
    ));
    let worker = PaymentExpireWorker::new(payments, 1, 50);
    worker.run_once().await;

    let queried = engine.payments.query_payment(&user, &payment.payment_no).await.unwrap();
    assert_eq!(queried.status, PaymentStatus::Closed);
    assert_eq!(order_status(&engine.pool, &order_no).await, OrderStatus::Pending.as_str());

    // 关闭后到达的成功通知按已处理应答，不再级联
    let (body, header) = signed_notification(&payment.payment_no, "txn-late", "SUCCESS", cents(payment.amount));
    let late = engine.payments.handle_callback(&body, &header).await.unwrap();
    assert!(matches!(
        late,
        CallbackOutcome::AlreadyProcessed { status: PaymentStatus::Closed, .. }
    ));
    assert_eq!(order_status(&engine.pool, &order_no).await, "PENDING");
}
