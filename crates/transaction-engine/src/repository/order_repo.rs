//! 订单仓储
//!
//! 状态变更一律使用 `WHERE status = $from` 条件更新，返回是否命中

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::error::Result;
use crate::models::{NewOrder, NewOrderItem, Order, OrderItem, OrderStatus};

const ORDER_COLUMNS: &str = "id, order_no, user_id, transaction_type, original_amount, \
     discount_amount, actual_amount, status, user_coupon_id, campaign_id, address_snapshot, \
     remark, paid_at, shipped_at, received_at, completed_at, cancelled_at, cancel_reason, \
     created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, sku_id, product_name, product_image, \
     sku_desc, price, quantity, subtotal, created_at";

/// 订单仓储
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 写入 ====================

    /// 在事务中创建订单
    pub async fn create_order_in_tx(tx: &mut PgConnection, order: &NewOrder) -> Result<Order> {
        let sql = format!(
            r#"
            INSERT INTO orders (order_no, user_id, transaction_type, original_amount,
                                discount_amount, actual_amount, status, user_coupon_id,
                                campaign_id, address_snapshot, remark)
            VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', $7, $8, $9, $10)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, Order>(&sql)
            .bind(&order.order_no)
            .bind(&order.user_id)
            .bind(order.transaction_type)
            .bind(order.original_amount)
            .bind(order.discount_amount)
            .bind(order.actual_amount)
            .bind(order.user_coupon_id)
            .bind(order.campaign_id)
            .bind(&order.address_snapshot)
            .bind(&order.remark)
            .fetch_one(tx)
            .await?;

        Ok(created)
    }

    /// 在事务中创建订单明细
    pub async fn create_item_in_tx(
        tx: &mut PgConnection,
        order_id: i64,
        item: &NewOrderItem,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, product_id, sku_id, product_name, product_image,
                                     sku_desc, price, quantity, subtotal)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order_id)
        .bind(item.product_id)
        .bind(item.sku_id)
        .bind(&item.product_name)
        .bind(&item.product_image)
        .bind(&item.sku_desc)
        .bind(item.price)
        .bind(item.quantity)
        .bind(item.subtotal)
        .execute(tx)
        .await?;

        Ok(())
    }

    // ==================== 查询 ====================

    /// 按订单号获取订单
    pub async fn get_by_no(&self, order_no: &str) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_no = $1");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order_no)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    /// 按订单号加行锁读取（FOR UPDATE）
    pub async fn get_by_no_for_update(
        tx: &mut PgConnection,
        order_no: &str,
    ) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_no = $1 FOR UPDATE");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order_no)
            .fetch_optional(tx)
            .await?;

        Ok(order)
    }

    /// 按 ID 加行锁读取（FOR UPDATE）
    pub async fn get_by_id_for_update(tx: &mut PgConnection, id: i64) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(tx)
            .await?;

        Ok(order)
    }

    /// 列出用户订单，可按状态过滤
    pub async fn list_by_user(
        &self,
        user_id: &str,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE user_id = $1 AND ($2::varchar IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(user_id)
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(orders)
    }

    /// 获取订单明细
    pub async fn list_items(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id");
        let items = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    /// 批量获取多个订单的明细
    pub async fn list_items_by_orders(&self, order_ids: &[i64]) -> Result<Vec<OrderItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, id"
        );
        let items = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(order_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    /// 在事务中获取订单明细
    pub async fn list_items_in_tx(tx: &mut PgConnection, order_id: i64) -> Result<Vec<OrderItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id");
        let items = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(order_id)
            .fetch_all(tx)
            .await?;

        Ok(items)
    }

    // ==================== 状态变更 ====================

    /// 通用条件状态变更
    ///
    /// 仅当当前状态为 `from` 时更新，返回是否命中
    pub async fn transition_in_tx(
        tx: &mut PgConnection,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 待支付 → 已支付
    pub async fn mark_paid_in_tx(
        tx: &mut PgConnection,
        id: i64,
        paid_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'PAID', paid_at = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(paid_at)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 待支付 → 已取消
    pub async fn mark_cancelled_in_tx(
        tx: &mut PgConnection,
        id: i64,
        reason: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'CANCELLED', cancelled_at = NOW(), cancel_reason = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 已支付/待发货 → 已发货
    pub async fn mark_shipped_in_tx(tx: &mut PgConnection, id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'SHIPPED', shipped_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status IN ('PAID', 'PENDING_SHIP')
            "#,
        )
        .bind(id)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 已发货 → 已完成（确认收货）
    pub async fn mark_completed_in_tx(tx: &mut PgConnection, id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'COMPLETED', received_at = NOW(), completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'SHIPPED'
            "#,
        )
        .bind(id)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
