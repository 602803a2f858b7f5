//! 购物车与收货地址仓储

use sqlx::{PgConnection, PgPool};

use crate::error::Result;
use crate::models::{CartItem, UserAddress};

/// 购物车仓储
pub struct CartRepository {
    pool: PgPool,
}

impl CartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 列出用户购物车全部条目
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<CartItem>> {
        let items = sqlx::query_as::<_, CartItem>(
            r#"
            SELECT id, user_id, product_id, sku_id, quantity, selected, created_at, updated_at
            FROM cart_items
            WHERE user_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// 在事务中锁定并读取用户已选中的购物车条目
    pub async fn list_selected_for_update(
        tx: &mut PgConnection,
        user_id: &str,
    ) -> Result<Vec<CartItem>> {
        let items = sqlx::query_as::<_, CartItem>(
            r#"
            SELECT id, user_id, product_id, sku_id, quantity, selected, created_at, updated_at
            FROM cart_items
            WHERE user_id = $1 AND selected = true
            ORDER BY id ASC
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_all(tx)
        .await?;

        Ok(items)
    }

    /// 在事务中删除指定购物车条目
    pub async fn delete_items_in_tx(
        tx: &mut PgConnection,
        user_id: &str,
        ids: &[i64],
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM cart_items
            WHERE user_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(ids)
        .execute(tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// 在事务中获取用户地址（归属校验）
    pub async fn get_address_in_tx(
        tx: &mut PgConnection,
        user_id: &str,
        address_id: i64,
    ) -> Result<Option<UserAddress>> {
        let address = sqlx::query_as::<_, UserAddress>(
            r#"
            SELECT id, user_id, receiver_name, phone, province, city, district, detail, created_at
            FROM user_addresses
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(address_id)
        .bind(user_id)
        .fetch_optional(tx)
        .await?;

        Ok(address)
    }
}
