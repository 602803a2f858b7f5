//! 支付单仓储
//!
//! 提供支付单的写入、行锁读取、终态变更，以及支付对象（订单/租赁/预订）的统一访问

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::error::Result;
use crate::models::{Money, NewPayment, Payment, PaymentTarget, PaymentTargetType};

const PAYMENT_COLUMNS: &str = "id, payment_no, target_type, target_id, target_no, user_id, \
     amount, refunded_amount, method, channel, status, transaction_id, error_message, \
     expire_at, paid_at, created_at, updated_at";

/// 支付单仓储
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 支付单 ====================

    /// 在事务中创建支付单（状态 PENDING）
    pub async fn create_in_tx(tx: &mut PgConnection, payment: &NewPayment) -> Result<Payment> {
        let sql = format!(
            r#"
            INSERT INTO payments (payment_no, target_type, target_id, target_no, user_id,
                                  amount, method, channel, status, expire_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PENDING', $9)
            RETURNING {PAYMENT_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, Payment>(&sql)
            .bind(&payment.payment_no)
            .bind(payment.target_type)
            .bind(payment.target_id)
            .bind(&payment.target_no)
            .bind(&payment.user_id)
            .bind(payment.amount)
            .bind(payment.method)
            .bind(payment.channel)
            .bind(payment.expire_at)
            .fetch_one(tx)
            .await?;

        Ok(created)
    }

    /// 按支付单号获取
    pub async fn get_by_no(&self, payment_no: &str) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_no = $1");
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(payment_no)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    /// 按支付单号加行锁读取（FOR UPDATE）
    ///
    /// 回调去重、金额校验与状态写入都在此锁内完成
    pub async fn get_by_no_for_update(
        tx: &mut PgConnection,
        payment_no: &str,
    ) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_no = $1 FOR UPDATE");
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(payment_no)
            .fetch_optional(tx)
            .await?;

        Ok(payment)
    }

    /// 加锁读取支付对象的成功支付单
    pub async fn get_successful_for_target_for_update(
        tx: &mut PgConnection,
        target_type: PaymentTargetType,
        target_id: i64,
    ) -> Result<Option<Payment>> {
        let sql = format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE target_type = $1 AND target_id = $2 AND status = 'SUCCESS'
            ORDER BY paid_at DESC
            LIMIT 1
            FOR UPDATE
            "#
        );
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(target_type)
            .bind(target_id)
            .fetch_optional(tx)
            .await?;

        Ok(payment)
    }

    /// 待支付 → 成功
    pub async fn mark_success_in_tx(
        tx: &mut PgConnection,
        id: i64,
        transaction_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'SUCCESS', transaction_id = $2, paid_at = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(transaction_id)
        .bind(paid_at)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 待支付 → 失败
    pub async fn mark_failed_in_tx(
        tx: &mut PgConnection,
        id: i64,
        transaction_id: Option<&str>,
        error_message: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'FAILED', transaction_id = COALESCE($2, transaction_id),
                error_message = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(transaction_id)
        .bind(error_message)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 累加已退款金额（CHECK 约束保证不超过支付金额）
    pub async fn add_refunded_amount_in_tx(
        tx: &mut PgConnection,
        id: i64,
        amount: Money,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payments
            SET refunded_amount = refunded_amount + $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(amount)
        .execute(tx)
        .await?;

        Ok(())
    }

    /// 关闭一批已过期的待支付单
    ///
    /// 使用 `FOR UPDATE SKIP LOCKED`，多实例并发扫描互不阻塞；
    /// 正在被回调处理的支付单会被跳过。返回被关闭的支付单号。
    pub async fn close_expired_batch(&self, batch_size: i64) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let ids: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT id, payment_no
            FROM payments
            WHERE status = 'PENDING' AND expire_at <= NOW()
            ORDER BY expire_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(batch_size)
        .fetch_all(&mut *tx)
        .await?;

        if ids.is_empty() {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let id_list: Vec<i64> = ids.iter().map(|(id, _)| *id).collect();
        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'CLOSED', error_message = '支付超时关闭', updated_at = NOW()
            WHERE id = ANY($1) AND status = 'PENDING'
            "#,
        )
        .bind(&id_list)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ids.into_iter().map(|(_, no)| no).collect())
    }

    // ==================== 支付对象 ====================

    /// 按类型和单号读取支付对象
    pub async fn find_target_in_tx(
        tx: &mut PgConnection,
        target_type: PaymentTargetType,
        target_no: &str,
    ) -> Result<Option<PaymentTarget>> {
        let sql = match target_type {
            PaymentTargetType::Order => {
                r#"
                SELECT id, order_no AS target_no, user_id, actual_amount AS amount, status
                FROM orders WHERE order_no = $1 FOR UPDATE
                "#
            }
            PaymentTargetType::Rental => {
                r#"
                SELECT id, rental_no AS target_no, user_id, actual_amount AS amount, status
                FROM rentals WHERE rental_no = $1 FOR UPDATE
                "#
            }
            PaymentTargetType::Booking => {
                r#"
                SELECT id, booking_no AS target_no, user_id, actual_amount AS amount, status
                FROM bookings WHERE booking_no = $1 FOR UPDATE
                "#
            }
        };

        let target = sqlx::query_as::<_, PaymentTarget>(sql)
            .bind(target_no)
            .fetch_optional(tx)
            .await?;

        Ok(target)
    }

    /// 租赁单/预订单 待支付 → 已支付
    ///
    /// 订单的支付级联由订单仓储处理（需要同时维护销量）
    pub async fn mark_external_target_paid_in_tx(
        tx: &mut PgConnection,
        target_type: PaymentTargetType,
        target_id: i64,
        paid_at: DateTime<Utc>,
    ) -> Result<bool> {
        let sql = match target_type {
            PaymentTargetType::Rental => {
                r#"
                UPDATE rentals SET status = 'PAID', paid_at = $2, updated_at = NOW()
                WHERE id = $1 AND status = 'PENDING'
                "#
            }
            PaymentTargetType::Booking => {
                r#"
                UPDATE bookings SET status = 'PAID', paid_at = $2, updated_at = NOW()
                WHERE id = $1 AND status = 'PENDING'
                "#
            }
            PaymentTargetType::Order => return Ok(false),
        };

        let result = sqlx::query(sql)
            .bind(target_id)
            .bind(paid_at)
            .execute(tx)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
