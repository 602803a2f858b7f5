//! 订单事件处理器 Trait 定义

use async_trait::async_trait;
use sqlx::PgConnection;

use crate::error::Result;
use crate::models::{OrderEvent, OrderEventKind};

/// 订单事件处理器
///
/// 每个处理器在分发器开启的独立 savepoint 中执行，
/// 失败只回滚自身写入，不影响其他处理器和触发事件的主流程。
///
/// # 幂等性
/// 事件可能被重复投递（即时投递失败后由 Worker 重试），实现必须保证重复处理无副作用。
#[async_trait]
pub trait OrderEventHandler: Send + Sync {
    /// 处理器名称（用于日志和指标标签）
    fn name(&self) -> &'static str;

    /// 是否处理该类事件
    fn handles(&self, kind: OrderEventKind) -> bool;

    /// 处理事件
    async fn handle(&self, conn: &mut PgConnection, event: &OrderEvent) -> Result<()>;
}
