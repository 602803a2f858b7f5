//! 仓储 Trait 定义
//!
//! 优惠计算只依赖读接口，便于在单元测试中用 mock 替换数据库

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Campaign, UserCoupon};

/// 优惠仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiscountRepositoryTrait: Send + Sync {
    /// 启用且处于有效期内的满减活动
    async fn list_active_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>>;

    /// 用户未使用且未过期的优惠券
    async fn list_usable_coupons(&self, user_id: &str, now: DateTime<Utc>)
    -> Result<Vec<UserCoupon>>;
}
