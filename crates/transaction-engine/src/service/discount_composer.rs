//! 优惠组合器
//!
//! ## 计算顺序（顺序不可交换）
//!
//! 1. 按原价选出优惠最大的满减活动
//! 2. 以「原价 - 活动优惠」为基数评估优惠券，
//!    用户指定的券必须恰好是该基数下的最优券才会被使用，否则不使用任何券
//! 3. 实付 = 原价 - 活动优惠 - 券优惠，不低于 0
//!
//! 只有用户主动选择的券才会被核销，未指定券时不自动套用

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::{debug, instrument, warn};

use crate::error::{CommerceError, Result};
use crate::models::{Campaign, DiscountRef, DiscountResult, Money, TransactionType, UserCoupon};
use crate::repository::{DiscountRepository, DiscountRepositoryTrait};

/// 优惠组合器
pub struct DiscountComposer {
    repo: Arc<dyn DiscountRepositoryTrait>,
}

impl DiscountComposer {
    pub fn new(repo: Arc<dyn DiscountRepositoryTrait>) -> Self {
        Self { repo }
    }

    /// 计算活动 + 优惠券的组合优惠（独立读取，用于结算页报价）
    #[instrument(skip(self))]
    pub async fn compose(
        &self,
        user_id: &str,
        transaction_type: TransactionType,
        original_amount: Money,
        user_coupon_id: Option<i64>,
    ) -> Result<DiscountResult> {
        let now = Utc::now();
        let campaigns = self.repo.list_active_campaigns(now).await?;
        let coupons = match user_coupon_id {
            Some(_) => self.repo.list_usable_coupons(user_id, now).await?,
            None => Vec::new(),
        };

        Ok(compose_from(
            &campaigns,
            &coupons,
            user_id,
            transaction_type,
            original_amount,
            user_coupon_id,
            now,
        ))
    }

    /// 在下单事务内计算组合优惠
    ///
    /// 读取走调用方持有的连接：事务已持有库存行锁时再向连接池申请连接，
    /// 并发下单占满连接池后会互相等待直到获取超时
    pub async fn compose_in_tx(
        tx: &mut PgConnection,
        user_id: &str,
        transaction_type: TransactionType,
        original_amount: Money,
        user_coupon_id: Option<i64>,
    ) -> Result<DiscountResult> {
        let now = Utc::now();
        let campaigns = DiscountRepository::list_active_campaigns_in_tx(&mut *tx, now).await?;
        let coupons = match user_coupon_id {
            Some(_) => DiscountRepository::list_usable_coupons_in_tx(&mut *tx, user_id, now).await?,
            None => Vec::new(),
        };

        Ok(compose_from(
            &campaigns,
            &coupons,
            user_id,
            transaction_type,
            original_amount,
            user_coupon_id,
            now,
        ))
    }

    /// 下单前的价格预览，只计算满减活动
    #[instrument(skip(self))]
    pub async fn preview(
        &self,
        transaction_type: TransactionType,
        original_amount: Money,
    ) -> Result<DiscountResult> {
        let now = Utc::now();
        let campaigns = self.repo.list_active_campaigns(now).await?;
        Ok(compose_from(&campaigns, &[], "", transaction_type, original_amount, None, now))
    }

    // ==================== 优惠券核销 ====================

    /// 核销订单使用的优惠券
    ///
    /// 并发下其他订单抢先核销时返回 `CouponUnavailable`，调用方回滚事务
    pub async fn redeem_coupon_in_tx(
        tx: &mut PgConnection,
        user_coupon_id: i64,
        user_id: &str,
        order_id: i64,
    ) -> Result<()> {
        let redeemed =
            DiscountRepository::redeem_in_tx(tx, user_coupon_id, user_id, order_id).await?;
        if !redeemed {
            return Err(CommerceError::CouponUnavailable(user_coupon_id));
        }
        Ok(())
    }

    /// 订单取消时退回优惠券
    pub async fn restore_coupon_in_tx(
        tx: &mut PgConnection,
        user_coupon_id: i64,
        order_id: i64,
    ) -> Result<()> {
        if !DiscountRepository::restore_in_tx(tx, user_coupon_id, order_id).await? {
            warn!(user_coupon_id, order_id, "优惠券未处于该订单的已使用状态，跳过退回");
        }
        Ok(())
    }
}

/// 按「活动 → 优惠券」顺序组合，只在候选集合上计算
fn compose_from(
    campaigns: &[Campaign],
    coupons: &[UserCoupon],
    user_id: &str,
    transaction_type: TransactionType,
    original_amount: Money,
    user_coupon_id: Option<i64>,
    now: DateTime<Utc>,
) -> DiscountResult {
    let mut result = DiscountResult::none(original_amount);
    if !original_amount.is_positive() {
        return result;
    }

    if let Some((campaign, amount)) = best_campaign(campaigns, transaction_type, original_amount, now)
    {
        result.campaign_discount = amount;
        result.campaign_ref = Some(DiscountRef {
            id: campaign.id,
            name: campaign.name.clone(),
            amount,
        });
        result
            .breakdown
            .push(format!("活动「{}」减 {}", campaign.name, amount));
    }

    if let Some(requested) = user_coupon_id {
        let base = original_amount - result.campaign_discount;
        match best_coupon(coupons, user_id, transaction_type, base, now) {
            Some((coupon, amount)) if coupon.id == requested => {
                // 两项优惠合计不超过原价
                let amount = amount.min(base);
                result.coupon_discount = amount;
                result.coupon_ref = Some(DiscountRef {
                    id: coupon.id,
                    name: coupon.coupon_name.clone(),
                    amount,
                });
                result
                    .breakdown
                    .push(format!("优惠券「{}」减 {}", coupon.coupon_name, amount));
            }
            Some((coupon, _)) => {
                warn!(
                    user_id = %user_id,
                    requested,
                    best = coupon.id,
                    "指定的优惠券不是当前最优券，不使用优惠券"
                );
                result
                    .breakdown
                    .push(format!("优惠券 {requested} 不是当前最优券，未使用"));
            }
            None => {
                debug!(user_id = %user_id, requested, "无可用优惠券");
                result
                    .breakdown
                    .push(format!("优惠券 {requested} 不满足使用条件，未使用"));
            }
        }
    }

    result.total_discount = result.campaign_discount + result.coupon_discount;
    result.final_amount = original_amount.saturating_sub(result.total_discount);
    result
}

/// 优惠最大的活动，金额相同时取 id 最小者
fn best_campaign(
    campaigns: &[Campaign],
    transaction_type: TransactionType,
    original_amount: Money,
    now: DateTime<Utc>,
) -> Option<(&Campaign, Money)> {
    campaigns
        .iter()
        .filter(|c| c.is_applicable(transaction_type, original_amount, now))
        .map(|c| (c, c.discount_for(original_amount)))
        .filter(|(_, amount)| amount.is_positive())
        .fold(None, |best, (c, amount)| match best {
            Some((b, best_amount)) if better(best_amount, b.id, amount, c.id) => Some((b, best_amount)),
            _ => Some((c, amount)),
        })
}

/// 在给定基数下优惠最大的券，金额相同时取 id 最小者
fn best_coupon<'a>(
    coupons: &'a [UserCoupon],
    user_id: &str,
    transaction_type: TransactionType,
    base: Money,
    now: DateTime<Utc>,
) -> Option<(&'a UserCoupon, Money)> {
    coupons
        .iter()
        .filter(|c| c.is_usable(user_id, transaction_type, base, now))
        .map(|c| (c, c.discount_for(base)))
        .filter(|(_, amount)| amount.is_positive())
        .fold(None, |best, (c, amount)| match best {
            Some((b, best_amount)) if better(best_amount, b.id, amount, c.id) => Some((b, best_amount)),
            _ => Some((c, amount)),
        })
}

/// 当前最优 (amount, id) 是否仍优于候选
fn better(current: Money, current_id: i64, candidate: Money, candidate_id: i64) -> bool {
    current > candidate || (current == candidate && current_id <= candidate_id)
}
