//! 交易引擎进程入口
//!
//! 组装仓储、网关桥接、服务与后台任务，所有依赖通过构造函数注入。
//! HTTP 路由由外层网关服务承载，本进程负责后台任务与指标端点。

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::info;

use commerce_shared::{config::AppConfig, database::Database, observability};

use transaction_engine::{
    gateway::{HttpGatewayBridge, PaymentGateway},
    hooks::{HookDispatcher, LoyaltyLedger, PgLoyaltyLedger},
    repository::{DiscountRepository, DiscountRepositoryTrait},
    service::{DiscountComposer, OrderService, PaymentService, RefundService},
    worker::{HookOutboxWorker, PaymentExpireWorker},
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置
    let config = AppConfig::load("transaction-engine")?;
    config.validate()?;

    // 2. 初始化可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        environment = %config.environment,
        expire_minutes = config.payment.expire_minutes,
        "交易引擎启动中"
    );

    // 3. 连接池（run_migrations 打开时同时执行迁移）
    let db = Database::connect(&config.database).await?;
    let pool = db.pool().clone();

    // 4. 支付网关与积分账本
    let gateway: Arc<dyn PaymentGateway> = Arc::new(HttpGatewayBridge::new(&config.payment)?);
    let loyalty: Arc<dyn LoyaltyLedger> = Arc::new(PgLoyaltyLedger::new());

    // 5. 订单事件分发器
    let dispatcher = Arc::new(HookDispatcher::with_defaults(
        pool.clone(),
        loyalty,
        config.worker.hook_max_attempts,
    ));

    // 6. 创建服务
    let discount_repo: Arc<dyn DiscountRepositoryTrait> =
        Arc::new(DiscountRepository::new(pool.clone()));
    let composer = Arc::new(DiscountComposer::new(discount_repo));

    let _order_service = Arc::new(OrderService::new(
        pool.clone(),
        composer.clone(),
        dispatcher.clone(),
    ));
    let payment_service = Arc::new(PaymentService::new(
        pool.clone(),
        gateway.clone(),
        &config.payment,
    ));
    let _refund_service = Arc::new(RefundService::new(
        pool.clone(),
        gateway.clone(),
        dispatcher.clone(),
    ));

    // 7. 启动后台任务
    let expire_worker = PaymentExpireWorker::new(
        payment_service.clone(),
        config.worker.payment_sweep_interval_seconds,
        config.worker.batch_size,
    );
    tokio::spawn(async move {
        expire_worker.run().await;
    });

    let outbox_worker = HookOutboxWorker::new(
        dispatcher.clone(),
        config.worker.hook_poll_interval_seconds,
        config.worker.batch_size,
    );
    tokio::spawn(async move {
        outbox_worker.run().await;
    });
    info!("后台任务已启动");

    // 8. 等待退出信号
    signal::ctrl_c().await?;
    info!("收到退出信号，关闭连接池");
    db.close().await;

    Ok(())
}
