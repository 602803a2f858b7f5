//! 退款单仓储

use sqlx::{PgConnection, PgPool};

use crate::error::Result;
use crate::models::{Money, NewRefund, OperatorType, Refund};

const REFUND_COLUMNS: &str = "id, refund_no, order_id, order_no, payment_id, payment_no, \
     user_id, amount, reason, status, prior_order_status, operator_id, operator_type, \
     external_refund_id, reject_reason, failure_reason, approved_at, rejected_at, \
     completed_at, created_at, updated_at";

/// 退款单仓储
pub struct RefundRepository {
    pool: PgPool,
}

impl RefundRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 写入 ====================

    /// 在事务中创建退款单（状态 PENDING，操作人为用户本人）
    pub async fn create_in_tx(tx: &mut PgConnection, refund: &NewRefund) -> Result<Refund> {
        let sql = format!(
            r#"
            INSERT INTO refunds (refund_no, order_id, order_no, payment_id, payment_no, user_id,
                                 amount, reason, status, prior_order_status,
                                 operator_id, operator_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PENDING', $9, $6, 'USER')
            RETURNING {REFUND_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, Refund>(&sql)
            .bind(&refund.refund_no)
            .bind(refund.order_id)
            .bind(&refund.order_no)
            .bind(refund.payment_id)
            .bind(&refund.payment_no)
            .bind(&refund.user_id)
            .bind(refund.amount)
            .bind(&refund.reason)
            .bind(refund.prior_order_status)
            .fetch_one(tx)
            .await?;

        Ok(created)
    }

    // ==================== 查询 ====================

    /// 按退款单号获取
    pub async fn get_by_no(&self, refund_no: &str) -> Result<Option<Refund>> {
        let sql = format!("SELECT {REFUND_COLUMNS} FROM refunds WHERE refund_no = $1");
        let refund = sqlx::query_as::<_, Refund>(&sql)
            .bind(refund_no)
            .fetch_optional(&self.pool)
            .await?;

        Ok(refund)
    }

    /// 按退款单号加行锁读取
    pub async fn get_by_no_for_update(
        tx: &mut PgConnection,
        refund_no: &str,
    ) -> Result<Option<Refund>> {
        let sql = format!("SELECT {REFUND_COLUMNS} FROM refunds WHERE refund_no = $1 FOR UPDATE");
        let refund = sqlx::query_as::<_, Refund>(&sql)
            .bind(refund_no)
            .fetch_optional(tx)
            .await?;

        Ok(refund)
    }

    /// 列出用户退款单
    pub async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<Refund>> {
        let sql = format!(
            "SELECT {REFUND_COLUMNS} FROM refunds WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        let refunds = sqlx::query_as::<_, Refund>(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(refunds)
    }

    /// 订单是否存在未终结的退款
    pub async fn exists_open_for_order_in_tx(tx: &mut PgConnection, order_id: i64) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM refunds
                WHERE order_id = $1 AND status IN ('PENDING', 'APPROVED', 'PROCESSING')
            )
            "#,
        )
        .bind(order_id)
        .fetch_one(tx)
        .await?;

        Ok(exists)
    }

    /// 统计支付单已占用的退款金额（不含已拒绝、已失败）
    ///
    /// 调用方需持有支付单行锁
    pub async fn sum_held_for_payment_in_tx(
        tx: &mut PgConnection,
        payment_id: i64,
    ) -> Result<Money> {
        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT
            FROM refunds
            WHERE payment_id = $1 AND status NOT IN ('REJECTED', 'FAILED')
            "#,
        )
        .bind(payment_id)
        .fetch_one(tx)
        .await?;

        Ok(Money::from_cents(total))
    }

    // ==================== 状态变更 ====================

    /// 待审核 → 审核通过
    pub async fn mark_approved_in_tx(
        tx: &mut PgConnection,
        id: i64,
        operator_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE refunds
            SET status = 'APPROVED', operator_id = $2, operator_type = 'STAFF',
                approved_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(operator_id)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 待审核 → 已拒绝（运营拒绝或用户撤销）
    pub async fn mark_rejected_in_tx(
        tx: &mut PgConnection,
        id: i64,
        operator_id: &str,
        operator_type: OperatorType,
        reason: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE refunds
            SET status = 'REJECTED', operator_id = $2, operator_type = $3,
                reject_reason = $4, rejected_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(operator_id)
        .bind(operator_type)
        .bind(reason)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 审核通过 → 退款处理中
    pub async fn mark_processing_in_tx(tx: &mut PgConnection, id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE refunds
            SET status = 'PROCESSING', updated_at = NOW()
            WHERE id = $1 AND status = 'APPROVED'
            "#,
        )
        .bind(id)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 退款处理中 → 成功
    pub async fn mark_success_in_tx(
        tx: &mut PgConnection,
        id: i64,
        external_refund_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE refunds
            SET status = 'SUCCESS', external_refund_id = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'PROCESSING'
            "#,
        )
        .bind(id)
        .bind(external_refund_id)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 退款处理中 → 失败
    pub async fn mark_failed_in_tx(
        tx: &mut PgConnection,
        id: i64,
        failure_reason: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE refunds
            SET status = 'FAILED', failure_reason = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'PROCESSING'
            "#,
        )
        .bind(id)
        .bind(failure_reason)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
