//! 服务层
//!
//! 实现交易业务逻辑，协调仓储、支付网关与事件分发。
//!
//! ## 模块结构
//!
//! - `dto`: 数据传输对象定义
//! - `inventory_ledger`: 库存预占/归还/销量
//! - `discount_composer`: 满减活动与优惠券组合
//! - `order_service`: 订单生命周期
//! - `payment_service`: 支付单与网关回调
//! - `refund_service`: 退款申请、审核与执行
//! - `serial`: 业务单号生成

pub mod discount_composer;
pub mod dto;
pub mod inventory_ledger;
pub mod order_service;
pub mod payment_service;
pub mod refund_service;
pub mod serial;

pub use discount_composer::DiscountComposer;
pub use dto::*;
pub use inventory_ledger::InventoryLedger;
pub use order_service::OrderService;
pub use payment_service::PaymentService;
pub use refund_service::RefundService;
