//! 订单生命周期集成测试
//!
//! 覆盖下单扣库存、取消归还库存与优惠券、状态机约束、确认收货后的积分入账。
//!
//! ## 运行方式
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo test --test order_flow_test -- --ignored
//! ```

mod common;

use rust_decimal::Decimal;
use transaction_engine::error::CommerceError;
use transaction_engine::models::{OrderStatus, PaymentChannel, PaymentMethod, PaymentTargetType};
use transaction_engine::service::dto::{
    CreateOrderFromCartRequest, CreateOrderRequest, CreatePaymentRequest, OrderItemRequest,
};

use common::*;

// ==================== 辅助函数 ====================

fn order_request(user_id: &str, items: &[(i64, Option<i64>, i32)]) -> CreateOrderRequest {
    CreateOrderRequest {
        user_id: user_id.to_string(),
        items: items
            .iter()
            .map(|&(product_id, sku_id, quantity)| OrderItemRequest {
                product_id,
                sku_id,
                quantity,
            })
            .collect(),
        address_id: None,
        user_coupon_id: None,
        transaction_type: Default::default(),
        remark: None,
    }
}

/// 下单并通过网关回调支付成功
async fn create_paid_order(engine: &Engine, user_id: &str, product_id: i64) -> String {
    let order = engine
        .orders
        .create_order(order_request(user_id, &[(product_id, None, 1)]))
        .await
        .expect("下单失败");

    let payment = engine
        .payments
        .create_payment(CreatePaymentRequest {
            user_id: user_id.to_string(),
            target_type: PaymentTargetType::Order,
            target_no: order.order_no.clone(),
            method: PaymentMethod::Gateway,
            channel: Some(PaymentChannel::App),
        })
        .await
        .expect("创建支付单失败");

    let cents = (payment.amount * Decimal::from(100))
        .try_into()
        .expect("金额转换失败");
    let (body, header) = signed_notification(&payment.payment_no, "txn-order-flow", "SUCCESS", cents);
    engine
        .payments
        .handle_callback(&body, &header)
        .await
        .expect("支付回调失败");

    order.order_no
}

// ==================== 测试用例 ====================

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_create_order_sums_lines_and_reserves_stock() {
    let engine = setup_engine().await;
    seed_product(&engine.pool, 910_001, 8000, 10).await;
    seed_product(&engine.pool, 910_002, 10000, 5).await;
    let user = unique_user("order");

    let order = engine
        .orders
        .create_order(order_request(&user, &[(910_001, None, 2), (910_002, None, 1)]))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.original_amount, Decimal::from(260));
    assert_eq!(order.actual_amount, order.original_amount - order.discount_amount);
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.order_no.len(), 22);
    assert!(order.order_no.starts_with("MO"));

    assert_eq!(product_stock(&engine.pool, 910_001).await.0, 8);
    assert_eq!(product_stock(&engine.pool, 910_002).await.0, 4);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_sku_line_uses_sku_price_and_stock() {
    let engine = setup_engine().await;
    seed_product(&engine.pool, 910_011, 5000, 10).await;
    seed_sku(&engine.pool, 920_011, 910_011, 6500, 3).await;
    let user = unique_user("order-sku");

    let order = engine
        .orders
        .create_order(order_request(&user, &[(910_011, Some(920_011), 2)]))
        .await
        .unwrap();

    assert_eq!(order.original_amount, Decimal::from(130));
    assert_eq!(sku_stock(&engine.pool, 920_011).await, 1);
    assert_eq!(product_stock(&engine.pool, 910_011).await.0, 8);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_insufficient_stock_rolls_back_all_lines() {
    let engine = setup_engine().await;
    seed_product(&engine.pool, 910_021, 1000, 10).await;
    seed_product(&engine.pool, 910_022, 1000, 1).await;
    let user = unique_user("order-stock");

    let err = engine
        .orders
        .create_order(order_request(&user, &[(910_021, None, 3), (910_022, None, 2)]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CommerceError::InsufficientStock { product_id: 910_022, requested: 2 }
    ));
    // 第一行的扣减随事务回滚
    assert_eq!(product_stock(&engine.pool, 910_021).await.0, 10);
    assert_eq!(product_stock(&engine.pool, 910_022).await.0, 1);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_concurrent_orders_never_oversell() {
    let engine = std::sync::Arc::new(setup_engine().await);
    seed_product(&engine.pool, 910_031, 1000, 3).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let user = unique_user(&format!("race-{i}"));
            engine
                .orders
                .create_order(order_request(&user, &[(910_031, None, 1)]))
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert!(matches!(e, CommerceError::InsufficientStock { .. })),
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(product_stock(&engine.pool, 910_031).await.0, 0);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_concurrent_buyers_beyond_pool_size_all_succeed() {
    // 测试连接池上限为 5，买家数是其两倍以上；库存充足时每一单都必须成功
    let engine = std::sync::Arc::new(setup_engine().await);
    seed_product(&engine.pool, 910_035, 20000, 100).await;
    let buyers = 12;

    let mut handles = Vec::new();
    for i in 0..buyers {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let user = unique_user(&format!("crowd-{i}"));
            let coupon = grant_fixed_coupon(&engine.pool, &user, 1000, 0).await;

            if i % 2 == 0 {
                let mut request = order_request(&user, &[(910_035, None, 1)]);
                request.user_coupon_id = Some(coupon);
                engine.orders.create_order(request).await
            } else {
                sqlx::query(
                    "INSERT INTO cart_items (user_id, product_id, quantity, selected) VALUES ($1, 910035, 1, true)",
                )
                .bind(&user)
                .execute(&engine.pool)
                .await
                .unwrap();
                engine
                    .orders
                    .create_order_from_cart(CreateOrderFromCartRequest {
                        user_id: user.clone(),
                        address_id: None,
                        user_coupon_id: Some(coupon),
                        remark: None,
                    })
                    .await
            }
        }));
    }

    let results = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        futures::future::join_all(handles),
    )
    .await
    .expect("并发下单超时");

    for result in results {
        let order = result.unwrap().unwrap();
        assert_eq!(order.discount_amount, Decimal::from(10));
    }
    assert_eq!(product_stock(&engine.pool, 910_035).await.0, 100 - buyers);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_cancel_pending_order_restores_stock_and_coupon() {
    let engine = setup_engine().await;
    seed_product(&engine.pool, 910_041, 20000, 5).await;
    let user = unique_user("order-cancel");
    let coupon = grant_fixed_coupon(&engine.pool, &user, 1000, 0).await;

    let mut request = order_request(&user, &[(910_041, None, 2)]);
    request.user_coupon_id = Some(coupon);
    let order = engine.orders.create_order(request).await.unwrap();

    assert_eq!(product_stock(&engine.pool, 910_041).await.0, 3);

    let cancelled = engine
        .orders
        .cancel_order(&user, &order.order_no, Some("不想要了"))
        .await
        .unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(product_stock(&engine.pool, 910_041).await.0, 5);
    assert_eq!(coupon_status(&engine.pool, coupon).await, "UNUSED");

    // 已取消订单不能再次取消，库存不会重复归还
    let err = engine
        .orders
        .cancel_order(&user, &order.order_no, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::InvalidOrderStatus { .. }));
    assert_eq!(product_stock(&engine.pool, 910_041).await.0, 5);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_cancel_shipped_order_rejected() {
    let engine = setup_engine().await;
    seed_product(&engine.pool, 910_051, 5000, 5).await;
    let user = unique_user("order-shipped");

    let order_no = create_paid_order(&engine, &user, 910_051).await;
    engine.orders.ship_order(&order_no).await.unwrap();

    let err = engine
        .orders
        .cancel_order(&user, &order_no, None)
        .await
        .unwrap_err();

    assert!(matches!(err, CommerceError::InvalidOrderStatus { .. }));
    assert_eq!(order_status(&engine.pool, &order_no).await, "SHIPPED");
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_confirm_receive_credits_points_once() {
    let engine = setup_engine().await;
    seed_product(&engine.pool, 910_061, 12345, 5).await;
    let user = unique_user("order-points");

    let order_no = create_paid_order(&engine, &user, 910_061).await;
    let (_, sales) = product_stock(&engine.pool, 910_061).await;
    assert_eq!(sales, 1);

    // 未发货不能确认收货
    let err = engine
        .orders
        .confirm_receive(&user, &order_no)
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::InvalidOrderStatus { .. }));

    engine.orders.start_fulfillment(&order_no).await.unwrap();
    engine.orders.ship_order(&order_no).await.unwrap();
    let completed = engine.orders.confirm_receive(&user, &order_no).await.unwrap();

    assert_eq!(completed.status, OrderStatus::Completed);
    let expected = point_balance(&engine.pool, &user).await;
    assert!(expected > 0);

    // Worker 重复扫描不会重复入账
    engine.dispatcher.deliver_due(100).await.unwrap();
    assert_eq!(point_balance(&engine.pool, &user).await, expected);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_create_order_from_cart_consumes_selected_lines() {
    let engine = setup_engine().await;
    seed_product(&engine.pool, 910_071, 3000, 10).await;
    seed_product(&engine.pool, 910_072, 4000, 10).await;
    let user = unique_user("order-cart");

    sqlx::query(
        r#"
        INSERT INTO cart_items (user_id, product_id, quantity, selected)
        VALUES ($1, 910071, 2, true), ($1, 910072, 1, false)
        "#,
    )
    .bind(&user)
    .execute(&engine.pool)
    .await
    .unwrap();

    let order = engine
        .orders
        .create_order_from_cart(CreateOrderFromCartRequest {
            user_id: user.clone(),
            address_id: None,
            user_coupon_id: None,
            remark: None,
        })
        .await
        .unwrap();

    assert_eq!(order.items.len(), 1);
    assert_eq!(order.original_amount, Decimal::from(60));

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
        .bind(&user)
        .fetch_one(&engine.pool)
        .await
        .unwrap();
    assert_eq!(remaining, 1);

    // 没有选中的商品
    let err = engine
        .orders
        .create_order_from_cart(CreateOrderFromCartRequest {
            user_id: user.clone(),
            address_id: None,
            user_coupon_id: None,
            remark: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::CartEmpty));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_foreign_order_is_not_found() {
    let engine = setup_engine().await;
    seed_product(&engine.pool, 910_081, 1000, 5).await;
    let owner = unique_user("owner");
    let other = unique_user("other");

    let order = engine
        .orders
        .create_order(order_request(&owner, &[(910_081, None, 1)]))
        .await
        .unwrap();

    let err = engine.orders.get_order(&other, &order.order_no).await.unwrap_err();
    assert!(matches!(err, CommerceError::OrderNotFound(_)));

    let listed = engine.orders.list_orders(&owner, None, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].order_no, order.order_no);
}
