//! 优惠仓储
//!
//! 读取生效中的满减活动和用户优惠券，维护优惠券的核销与退回

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use super::traits::DiscountRepositoryTrait;
use crate::error::Result;
use crate::models::{Campaign, UserCoupon};

const USER_COUPON_SELECT: &str = r#"
    SELECT uc.id, uc.user_id, uc.coupon_id, c.name AS coupon_name, uc.status, uc.expire_at,
           c.discount_type, c.discount_value, c.min_amount, c.max_discount, c.transaction_type
    FROM user_coupons uc
    JOIN coupons c ON c.id = uc.coupon_id
"#;

/// 优惠仓储
pub struct DiscountRepository {
    pool: PgPool,
}

impl DiscountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 启用且处于有效期内的满减活动
    pub async fn list_active_campaigns_in_tx(
        conn: &mut PgConnection,
        now: DateTime<Utc>,
    ) -> Result<Vec<Campaign>> {
        let campaigns = sqlx::query_as::<_, Campaign>(
            r#"
            SELECT id, name, threshold_amount, discount_type, discount_value, max_discount,
                   transaction_type, start_time, end_time, enabled
            FROM campaigns
            WHERE enabled = true AND start_time <= $1 AND end_time > $1
            ORDER BY id ASC
            "#,
        )
        .bind(now)
        .fetch_all(conn)
        .await?;

        Ok(campaigns)
    }

    /// 用户未使用且未过期的优惠券
    pub async fn list_usable_coupons_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserCoupon>> {
        let coupons = sqlx::query_as::<_, UserCoupon>(&format!(
            "{USER_COUPON_SELECT} WHERE uc.user_id = $1 AND uc.status = 'UNUSED' AND uc.expire_at > $2 ORDER BY uc.id ASC"
        ))
        .bind(user_id)
        .bind(now)
        .fetch_all(conn)
        .await?;

        Ok(coupons)
    }

    /// 核销用户优惠券
    ///
    /// 条件更新 `WHERE status = 'UNUSED'`，并发下只有一个订单能核销成功
    pub async fn redeem_in_tx(
        tx: &mut PgConnection,
        user_coupon_id: i64,
        user_id: &str,
        order_id: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_coupons
            SET status = 'USED', used_at = NOW(), used_order_id = $3, updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND status = 'UNUSED' AND expire_at > NOW()
            "#,
        )
        .bind(user_coupon_id)
        .bind(user_id)
        .bind(order_id)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 退回用户优惠券（订单取消时）
    ///
    /// 已过期的券直接置为 EXPIRED
    pub async fn restore_in_tx(
        tx: &mut PgConnection,
        user_coupon_id: i64,
        order_id: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_coupons
            SET status = CASE WHEN expire_at > NOW() THEN 'UNUSED' ELSE 'EXPIRED' END,
                used_at = NULL, used_order_id = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'USED' AND used_order_id = $2
            "#,
        )
        .bind(user_coupon_id)
        .bind(order_id)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl DiscountRepositoryTrait for DiscountRepository {
    async fn list_active_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_active_campaigns_in_tx(&mut conn, now).await
    }

    async fn list_usable_coupons(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserCoupon>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_usable_coupons_in_tx(&mut conn, user_id, now).await
    }
}
