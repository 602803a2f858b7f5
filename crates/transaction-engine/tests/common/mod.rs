//! 集成测试公共辅助
//!
//! 数据库需提前执行 `migrations/` 下的迁移；测试数据使用随机用户 ID 与固定 ID 段，
//! 可重复执行。

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;

use commerce_shared::config::PaymentConfig;
use commerce_shared::database::Database;
use commerce_shared::observability::tracing::init_for_test;
use commerce_shared::test_utils::{test_database_config, test_user_id};
use transaction_engine::error::{CommerceError, Result};
use transaction_engine::gateway::{
    GatewayNotification, IntentParams, IntentRequest, PaymentGateway, RefundRequest, signature,
};
use transaction_engine::hooks::{HookDispatcher, PgLoyaltyLedger};
use transaction_engine::repository::DiscountRepository;
use transaction_engine::service::{DiscountComposer, OrderService, PaymentService, RefundService};

pub const TEST_SECRET: &str = "integration-test-secret";

// ==================== 辅助函数 ====================

pub fn database_url() -> String {
    std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests")
}

pub async fn connect() -> PgPool {
    init_for_test();
    let mut config = test_database_config();
    config.url = database_url();
    let db = Database::connect(&config).await.expect("数据库连接失败");
    db.pool().clone()
}

/// 每个测试使用独立用户，避免互相干扰
pub fn unique_user(prefix: &str) -> String {
    test_user_id(prefix)
}

/// 测试网关：按 HMAC 验签，退款结果可切换
pub struct StubGateway {
    pub refund_fails: AtomicBool,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            refund_fails: AtomicBool::new(false),
        }
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.refund_fails.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_intent(&self, request: IntentRequest) -> Result<IntentParams> {
        Ok(IntentParams {
            channel: request.channel,
            prepay_id: format!("prepay-{}", request.reference),
            params: json!({ "amount": request.amount_minor }),
        })
    }

    fn verify_and_parse(&self, raw: &[u8], header: &str) -> Result<GatewayNotification> {
        signature::verify(TEST_SECRET, header, raw, Utc::now().timestamp())
            .map_err(|e| CommerceError::CallbackIntegrity(e.to_string()))?;
        serde_json::from_slice(raw).map_err(|e| CommerceError::CallbackIntegrity(e.to_string()))
    }

    async fn request_refund(&self, request: RefundRequest) -> Result<String> {
        if self.refund_fails.load(Ordering::SeqCst) {
            return Err(CommerceError::Gateway("余额不足，退款失败".to_string()));
        }
        Ok(format!("gw-{}", request.refund_ref))
    }
}

/// 测试用服务组合
pub struct Engine {
    pub pool: PgPool,
    pub gateway: Arc<StubGateway>,
    pub dispatcher: Arc<HookDispatcher>,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub refunds: RefundService,
}

pub async fn setup_engine() -> Engine {
    let pool = connect().await;
    let gateway = Arc::new(StubGateway::new());
    let dispatcher = Arc::new(HookDispatcher::with_defaults(
        pool.clone(),
        Arc::new(PgLoyaltyLedger::new()),
        3,
    ));
    let composer = Arc::new(DiscountComposer::new(Arc::new(DiscountRepository::new(
        pool.clone(),
    ))));
    let config = PaymentConfig::default();

    Engine {
        orders: OrderService::new(pool.clone(), composer, dispatcher.clone()),
        payments: PaymentService::new(pool.clone(), gateway.clone(), &config),
        refunds: RefundService::new(pool.clone(), gateway.clone(), dispatcher.clone()),
        pool,
        gateway,
        dispatcher,
    }
}

/// 插入测试商品（幂等，每次重置库存与销量）
pub async fn seed_product(pool: &PgPool, id: i64, price: i64, stock: i32) {
    sqlx::query(
        r#"
        INSERT INTO products (id, name, price, stock, sales_count, on_sale)
        VALUES ($1, $2, $3, $4, 0, true)
        ON CONFLICT (id) DO UPDATE
        SET price = EXCLUDED.price, stock = EXCLUDED.stock, sales_count = 0, on_sale = true
        "#,
    )
    .bind(id)
    .bind(format!("测试商品 {id}"))
    .bind(price)
    .bind(stock)
    .execute(pool)
    .await
    .expect("插入测试商品失败");
}

/// 插入测试规格（幂等）
pub async fn seed_sku(pool: &PgPool, id: i64, product_id: i64, price: i64, stock: i32) {
    sqlx::query(
        r#"
        INSERT INTO skus (id, product_id, spec_desc, price, stock, active)
        VALUES ($1, $2, $3, $4, $5, true)
        ON CONFLICT (id) DO UPDATE
        SET product_id = EXCLUDED.product_id, price = EXCLUDED.price,
            stock = EXCLUDED.stock, active = true
        "#,
    )
    .bind(id)
    .bind(product_id)
    .bind(format!("规格 {id}"))
    .bind(price)
    .bind(stock)
    .execute(pool)
    .await
    .expect("插入测试规格失败");
}

pub async fn product_stock(pool: &PgPool, id: i64) -> (i32, i32) {
    sqlx::query_as("SELECT stock, sales_count FROM products WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("查询商品库存失败")
}

pub async fn sku_stock(pool: &PgPool, id: i64) -> i32 {
    sqlx::query_scalar("SELECT stock FROM skus WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("查询规格库存失败")
}

/// 给用户发一张固定金额优惠券，返回 user_coupon_id
pub async fn grant_fixed_coupon(pool: &PgPool, user_id: &str, value: i64, min_amount: i64) -> i64 {
    let coupon_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO coupons (name, discount_type, discount_value, min_amount)
        VALUES ('测试满减券', 'FIXED', $1, $2)
        RETURNING id
        "#,
    )
    .bind(value)
    .bind(min_amount)
    .fetch_one(pool)
    .await
    .expect("插入优惠券失败");

    sqlx::query_scalar(
        r#"
        INSERT INTO user_coupons (user_id, coupon_id, status, expire_at)
        VALUES ($1, $2, 'UNUSED', NOW() + INTERVAL '7 days')
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(coupon_id)
    .fetch_one(pool)
    .await
    .expect("发放优惠券失败")
}

pub async fn coupon_status(pool: &PgPool, user_coupon_id: i64) -> String {
    sqlx::query_scalar("SELECT status FROM user_coupons WHERE id = $1")
        .bind(user_coupon_id)
        .fetch_one(pool)
        .await
        .expect("查询优惠券失败")
}

pub async fn order_status(pool: &PgPool, order_no: &str) -> String {
    sqlx::query_scalar("SELECT status FROM orders WHERE order_no = $1")
        .bind(order_no)
        .fetch_one(pool)
        .await
        .expect("查询订单状态失败")
}

pub async fn point_balance(pool: &PgPool, user_id: &str) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT balance FROM point_accounts WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .expect("查询积分失败")
        .unwrap_or(0)
}

/// 构造已签名的网关通知
pub fn signed_notification(
    payment_no: &str,
    txn_id: &str,
    trade_state: &str,
    amount: i64,
) -> (Vec<u8>, String) {
    let body = json!({
        "outTradeNo": payment_no,
        "transactionId": txn_id,
        "tradeState": trade_state,
        "amount": amount,
    })
    .to_string()
    .into_bytes();
    let header = signature::sign(TEST_SECRET, Utc::now().timestamp(), &body).expect("签名失败");
    (body, header)
}
