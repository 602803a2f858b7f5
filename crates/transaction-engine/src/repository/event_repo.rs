//! 订单事件仓储（Outbox）
//!
//! 事件与订单状态变更同事务写入；投递时逐条加 `SKIP LOCKED` 行锁，
//! 即时投递与后台 Worker 不会重复处理同一事件

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::error::Result;
use crate::models::{NewOrderEvent, OrderEvent};

const EVENT_COLUMNS: &str = "id, event_no, order_id, order_no, user_id, transaction_type, kind, \
     amount, status, attempts, last_error, next_attempt_at, delivered_at, created_at";

/// 订单事件仓储
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在事务中写入待投递事件，返回事件 ID
    pub async fn create_in_tx(tx: &mut PgConnection, event: &NewOrderEvent) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO order_events (event_no, order_id, order_no, user_id, transaction_type,
                                      kind, amount, status, attempts, next_attempt_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'PENDING', 0, NOW())
            RETURNING id
            "#,
        )
        .bind(&event.event_no)
        .bind(event.order_id)
        .bind(&event.order_no)
        .bind(&event.user_id)
        .bind(event.transaction_type)
        .bind(event.kind)
        .bind(event.amount)
        .fetch_one(tx)
        .await?;

        Ok(id)
    }

    /// 锁定一条待投递事件
    ///
    /// 已被其他事务锁定或已不是 PENDING 时返回 None
    pub async fn lock_pending(tx: &mut PgConnection, id: i64) -> Result<Option<OrderEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM order_events WHERE id = $1 AND status = 'PENDING' FOR UPDATE SKIP LOCKED"
        );
        let event = sqlx::query_as::<_, OrderEvent>(&sql)
            .bind(id)
            .fetch_optional(tx)
            .await?;

        Ok(event)
    }

    /// 到期待投递的事件 ID
    pub async fn list_due_ids(&self, batch_size: i64) -> Result<Vec<i64>> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM order_events
            WHERE status = 'PENDING' AND next_attempt_at <= NOW()
            ORDER BY next_attempt_at ASC
            LIMIT $1
            "#,
        )
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// 标记已投递
    pub async fn mark_delivered_in_tx(tx: &mut PgConnection, id: i64, attempts: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE order_events
            SET status = 'DELIVERED', attempts = $2, last_error = NULL,
                delivered_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .execute(tx)
        .await?;

        Ok(())
    }

    /// 记录失败并安排下次投递
    pub async fn schedule_retry_in_tx(
        tx: &mut PgConnection,
        id: i64,
        attempts: i32,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE order_events
            SET attempts = $2, last_error = $3, next_attempt_at = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(error)
        .bind(next_attempt_at)
        .execute(tx)
        .await?;

        Ok(())
    }

    /// 超过最大投递次数，标记为失败
    pub async fn mark_failed_in_tx(
        tx: &mut PgConnection,
        id: i64,
        attempts: i32,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE order_events
            SET status = 'FAILED', attempts = $2, last_error = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(error)
        .execute(tx)
        .await?;

        Ok(())
    }
}
