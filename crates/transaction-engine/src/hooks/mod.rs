//! 订单事件 Hook
//!
//! 订单完成、退款成功后的附带副作用（目前为积分）。
//!
//! ## 模块结构
//!
//! - `handler`: 处理器 trait
//! - `dispatcher`: Outbox 事件分发器
//! - `loyalty`: 积分账本
//! - `points`: 积分处理器

pub mod dispatcher;
pub mod handler;
pub mod loyalty;
pub mod points;

pub use dispatcher::{DeliveryOutcome, HookDispatcher};
pub use handler::OrderEventHandler;
pub use loyalty::{LoyaltyLedger, PgLoyaltyLedger, points_for};
pub use points::PointsHook;
