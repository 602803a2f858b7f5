//! 积分账本
//!
//! 积分流水以 (order_no, change_type) 唯一，同一订单的同类变动只记一次；
//! 只有流水插入成功时才变更账户余额，重复投递天然幂等。

use async_trait::async_trait;
use sqlx::PgConnection;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{Money, PointChangeType};

/// 积分账本接口
#[async_trait]
pub trait LoyaltyLedger: Send + Sync {
    /// 消费获得积分，返回本次实际入账的积分（重复记录返回 0）
    async fn credit_for_purchase(
        &self,
        conn: &mut PgConnection,
        user_id: &str,
        amount: Money,
        order_no: &str,
    ) -> Result<i64>;

    /// 退款扣回积分，不超过当前余额；返回本次实际扣回的积分（重复记录返回 0）
    async fn debit_for_refund(
        &self,
        conn: &mut PgConnection,
        user_id: &str,
        amount: Money,
        order_no: &str,
    ) -> Result<i64>;
}

/// 每 1 元积 1 分
pub fn points_for(amount: Money) -> i64 {
    amount.whole_units().max(0)
}

/// PostgreSQL 积分账本
#[derive(Debug, Default, Clone)]
pub struct PgLoyaltyLedger;

impl PgLoyaltyLedger {
    pub fn new() -> Self {
        Self
    }

    /// 写入积分流水，返回是否为首次写入
    async fn insert_record(
        conn: &mut PgConnection,
        user_id: &str,
        order_no: &str,
        change_type: PointChangeType,
        points: i64,
        remark: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO point_records (user_id, order_no, change_type, points, remark)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_no, change_type) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(order_no)
        .bind(change_type)
        .bind(points)
        .bind(remark)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl LoyaltyLedger for PgLoyaltyLedger {
    async fn credit_for_purchase(
        &self,
        conn: &mut PgConnection,
        user_id: &str,
        amount: Money,
        order_no: &str,
    ) -> Result<i64> {
        let points = points_for(amount);
        if points == 0 {
            return Ok(0);
        }

        let inserted = Self::insert_record(
            &mut *conn,
            user_id,
            order_no,
            PointChangeType::Purchase,
            points,
            "订单完成赠送积分",
        )
        .await?;

        if !inserted {
            debug!(order_no = %order_no, "积分已入账，跳过重复记录");
            return Ok(0);
        }

        sqlx::query(
            r#"
            INSERT INTO point_accounts (user_id, balance, total_earned, updated_at)
            VALUES ($1, $2, $2, NOW())
            ON CONFLICT (user_id) DO UPDATE
            SET balance = point_accounts.balance + EXCLUDED.balance,
                total_earned = point_accounts.total_earned + EXCLUDED.total_earned,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(points)
        .execute(&mut *conn)
        .await?;

        info!(user_id = %user_id, order_no = %order_no, points, "积分入账");
        Ok(points)
    }

    async fn debit_for_refund(
        &self,
        conn: &mut PgConnection,
        user_id: &str,
        amount: Money,
        order_no: &str,
    ) -> Result<i64> {
        let points = points_for(amount);
        if points == 0 {
            return Ok(0);
        }

        // 按退款金额扣回，最多扣到账户余额为 0
        let balance: Option<i64> = sqlx::query_scalar(
            "SELECT balance FROM point_accounts WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
        let points = points.min(balance.unwrap_or(0));

        // 扣回 0 分也落流水，重复投递据此跳过
        let inserted = Self::insert_record(
            &mut *conn,
            user_id,
            order_no,
            PointChangeType::Refund,
            -points,
            "订单退款扣回积分",
        )
        .await?;

        if !inserted {
            debug!(order_no = %order_no, "积分已扣回，跳过重复记录");
            return Ok(0);
        }
        if points == 0 {
            debug!(user_id = %user_id, order_no = %order_no, "积分余额为 0，无可扣回积分");
            return Ok(0);
        }

        sqlx::query(
            r#"
            UPDATE point_accounts
            SET balance = balance - $2, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(points)
        .execute(&mut *conn)
        .await?;

        info!(user_id = %user_id, order_no = %order_no, points, "积分扣回");
        Ok(points)
    }
}
