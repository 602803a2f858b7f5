//! 优惠活动与优惠券实体
//!
//! 满减活动自动生效，优惠券由用户持有且一次性使用

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{DiscountType, TransactionType, UserCouponStatus};
use super::money::Money;

/// 按规则计算优惠金额
///
/// - FIXED: min(value, base)
/// - PERCENTAGE: floor(base × value / 100)，再受 max_discount 封顶
pub fn discount_amount(
    discount_type: DiscountType,
    discount_value: i64,
    max_discount: Option<Money>,
    base: Money,
) -> Money {
    if !base.is_positive() || discount_value <= 0 {
        return Money::ZERO;
    }

    let raw = match discount_type {
        DiscountType::Fixed => Money::from_cents(discount_value),
        DiscountType::Percentage => base.percent(discount_value.min(100)),
    };

    let capped = match max_discount {
        Some(max) => raw.min(max),
        None => raw,
    };

    capped.min(base)
}

/// 适用范围检查：未设置范围的规则适用于全部交易类型
fn scope_matches(scope: Option<TransactionType>, transaction_type: TransactionType) -> bool {
    scope.is_none_or(|s| s == transaction_type)
}

/// 满减活动
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    /// 门槛金额（按原价判断）
    pub threshold_amount: Money,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    #[sqlx(default)]
    pub max_discount: Option<Money>,
    #[sqlx(default)]
    pub transaction_type: Option<TransactionType>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub enabled: bool,
}

impl Campaign {
    /// 活动是否对该笔交易生效
    pub fn is_applicable(
        &self,
        transaction_type: TransactionType,
        original_amount: Money,
        now: DateTime<Utc>,
    ) -> bool {
        self.enabled
            && self.start_time <= now
            && now < self.end_time
            && scope_matches(self.transaction_type, transaction_type)
            && original_amount >= self.threshold_amount
    }

    pub fn discount_for(&self, base: Money) -> Money {
        discount_amount(self.discount_type, self.discount_value, self.max_discount, base)
    }
}

/// 用户持有的优惠券（关联券模板规则）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserCoupon {
    pub id: i64,
    pub user_id: String,
    pub coupon_id: i64,
    pub coupon_name: String,
    pub status: UserCouponStatus,
    pub expire_at: DateTime<Utc>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    /// 使用门槛（按扣除活动优惠后的金额判断）
    pub min_amount: Money,
    #[sqlx(default)]
    pub max_discount: Option<Money>,
    #[sqlx(default)]
    pub transaction_type: Option<TransactionType>,
}

impl UserCoupon {
    /// 优惠券是否可用于该笔交易
    pub fn is_usable(
        &self,
        user_id: &str,
        transaction_type: TransactionType,
        base: Money,
        now: DateTime<Utc>,
    ) -> bool {
        self.user_id == user_id
            && self.status == UserCouponStatus::Unused
            && self.expire_at > now
            && scope_matches(self.transaction_type, transaction_type)
            && base >= self.min_amount
    }

    pub fn discount_for(&self, base: Money) -> Money {
        discount_amount(self.discount_type, self.discount_value, self.max_discount, base)
    }
}

/// 已应用的优惠来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountRef {
    pub id: i64,
    pub name: String,
    pub amount: Money,
}

/// 优惠计算结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountResult {
    pub original_amount: Money,
    pub campaign_discount: Money,
    pub coupon_discount: Money,
    pub total_discount: Money,
    pub final_amount: Money,
    #[serde(default)]
    pub campaign_ref: Option<DiscountRef>,
    /// 应用的用户优惠券（id 为 user_coupon_id）
    #[serde(default)]
    pub coupon_ref: Option<DiscountRef>,
    /// 计算过程说明
    #[serde(default)]
    pub breakdown: Vec<String>,
}

impl DiscountResult {
    /// 无任何优惠
    pub fn none(original_amount: Money) -> Self {
        Self {
            original_amount,
            campaign_discount: Money::ZERO,
            coupon_discount: Money::ZERO,
            total_discount: Money::ZERO,
            final_amount: original_amount,
            campaign_ref: None,
            coupon_ref: None,
            breakdown: Vec::new(),
        }
    }

    pub fn user_coupon_id(&self) -> Option<i64> {
        self.coupon_ref.as_ref().map(|r| r.id)
    }

    pub fn campaign_id(&self) -> Option<i64> {
        self.campaign_ref.as_ref().map(|r| r.id)
    }
}
