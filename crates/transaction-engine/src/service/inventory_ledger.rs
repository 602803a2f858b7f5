//! 库存账本
//!
//! 库存扣减使用单条 `UPDATE ... WHERE stock >= $q` 条件更新，
//! 并发请求不会超卖，也不会把计数扣成负数。
//!
//! 选择了规格时先扣规格库存再扣商品库存，两级都成功才算预占成功；
//! 失败时由调用方回滚事务，不留下部分扣减。

use sqlx::{PgConnection, PgPool};
use tracing::{debug, instrument};

use crate::error::{CommerceError, Result};
use crate::models::ResolvedLine;
use crate::repository::CatalogRepository;

/// 库存账本
pub struct InventoryLedger {
    pool: PgPool,
}

impl InventoryLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 读取商品行的当前定价快照（只读，不预占）
    pub async fn resolve_line(&self, product_id: i64, sku_id: Option<i64>) -> Result<ResolvedLine> {
        let mut conn = self.pool.acquire().await?;
        Self::resolve_line_in_tx(&mut conn, product_id, sku_id).await
    }

    /// 预占库存（独立事务）
    #[instrument(skip(self))]
    pub async fn reserve(&self, product_id: i64, sku_id: Option<i64>, quantity: i32) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::reserve_in_tx(&mut tx, product_id, sku_id, quantity).await?;
        tx.commit().await?;
        Ok(())
    }

    /// 归还库存（独立事务）
    #[instrument(skip(self))]
    pub async fn release(&self, product_id: i64, sku_id: Option<i64>, quantity: i32) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::release_in_tx(&mut tx, product_id, sku_id, quantity).await?;
        tx.commit().await?;
        Ok(())
    }

    /// 增加销量（独立事务）
    pub async fn increase_sales_counter(&self, product_id: i64, quantity: i32) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::increase_sales_counter_in_tx(&mut tx, product_id, quantity).await?;
        tx.commit().await?;
        Ok(())
    }

    // ==================== 事务内操作 ====================

    /// 校验商品/规格可售并返回定价快照
    pub async fn resolve_line_in_tx(
        tx: &mut PgConnection,
        product_id: i64,
        sku_id: Option<i64>,
    ) -> Result<ResolvedLine> {
        let product = CatalogRepository::get_product_in_tx(&mut *tx, product_id)
            .await?
            .ok_or(CommerceError::ProductNotFound(product_id))?;

        if !product.on_sale {
            return Err(CommerceError::ProductOffShelf(product_id));
        }

        let sku = match sku_id {
            Some(sku_id) => {
                let sku = CatalogRepository::get_sku_in_tx(&mut *tx, sku_id)
                    .await?
                    .filter(|s| s.product_id == product_id && s.active)
                    .ok_or(CommerceError::SkuNotFound { product_id, sku_id })?;
                Some(sku)
            }
            None => None,
        };

        Ok(ResolvedLine::from_catalog(&product, sku.as_ref()))
    }

    /// 在事务中预占库存，返回该行的定价快照
    pub async fn reserve_in_tx(
        tx: &mut PgConnection,
        product_id: i64,
        sku_id: Option<i64>,
        quantity: i32,
    ) -> Result<ResolvedLine> {
        ensure_positive(quantity)?;

        let line = Self::resolve_line_in_tx(&mut *tx, product_id, sku_id).await?;
        let insufficient = CommerceError::InsufficientStock {
            product_id,
            requested: quantity,
        };

        if let Some(sku_id) = line.sku_id {
            let affected =
                CatalogRepository::decrement_sku_stock_in_tx(&mut *tx, sku_id, quantity).await?;
            if affected == 0 {
                return Err(insufficient);
            }
        }

        let affected =
            CatalogRepository::decrement_product_stock_in_tx(&mut *tx, product_id, quantity).await?;
        if affected == 0 {
            return Err(insufficient);
        }

        debug!(product_id, sku_id = ?line.sku_id, quantity, "库存预占成功");
        Ok(line)
    }

    /// 在事务中归还库存（预占的逆操作）
    pub async fn release_in_tx(
        tx: &mut PgConnection,
        product_id: i64,
        sku_id: Option<i64>,
        quantity: i32,
    ) -> Result<()> {
        ensure_positive(quantity)?;

        if let Some(sku_id) = sku_id {
            CatalogRepository::increment_sku_stock_in_tx(&mut *tx, sku_id, quantity).await?;
        }
        CatalogRepository::increment_product_stock_in_tx(&mut *tx, product_id, quantity).await?;

        debug!(product_id, ?sku_id, quantity, "库存已归还");
        Ok(())
    }

    pub async fn increase_sales_counter_in_tx(
        tx: &mut PgConnection,
        product_id: i64,
        quantity: i32,
    ) -> Result<()> {
        ensure_positive(quantity)?;
        CatalogRepository::increase_sales_count_in_tx(tx, product_id, quantity).await
    }
}

fn ensure_positive(quantity: i32) -> Result<()> {
    if quantity <= 0 {
        return Err(CommerceError::Validation(format!(
            "数量必须为正数: {quantity}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_must_be_positive() {
        assert!(ensure_positive(1).is_ok());
        assert_eq!(
            ensure_positive(0).unwrap_err().error_code(),
            "VALIDATION_ERROR"
        );
        assert!(ensure_positive(-3).is_err());
    }
}
