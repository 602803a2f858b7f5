//! 订单与支付交易引擎
//!
//! 负责商城订单、租赁单、预订单共用的下单、支付、退款链路。
//!
//! ## 核心功能
//!
//! - **库存账本**：条件更新扣减库存，并发下不超卖
//! - **优惠组合**：满减活动 + 至多一张用户指定的优惠券
//! - **订单生命周期**：创建、取消、发货、确认收货
//! - **支付处理**：创建支付单、网关回调幂等对账、过期关闭
//! - **退款流程**：申请、撤销、审核、网关执行、订单状态恢复
//! - **订单事件**：完成/退款后的积分副作用，经 Outbox 至少一次投递
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `repository`: 数据库仓储层
//! - `service`: 业务服务层
//! - `gateway`: 支付网关桥接
//! - `hooks`: 订单事件处理器与分发器
//! - `worker`: 后台任务

pub mod error;
pub mod gateway;
pub mod hooks;
pub mod models;
pub mod repository;
pub mod service;
pub mod worker;

pub use error::{CommerceError, Result};
pub use gateway::{HttpGatewayBridge, PaymentGateway};
pub use hooks::{HookDispatcher, LoyaltyLedger, OrderEventHandler, PgLoyaltyLedger};
pub use models::*;
pub use service::{
    DiscountComposer, InventoryLedger, OrderService, PaymentService, RefundService, dto,
};
pub use worker::{HookOutboxWorker, PaymentExpireWorker};
