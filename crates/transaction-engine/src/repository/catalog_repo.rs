//! 商品目录仓储
//!
//! 只读访问商品/规格，库存与销量通过单条条件更新维护，保证计数不为负

use sqlx::PgConnection;

use crate::error::Result;
use crate::models::{Product, Sku};

const PRODUCT_COLUMNS: &str =
    "id, name, main_image, price, stock, sales_count, on_sale, created_at, updated_at";
const SKU_COLUMNS: &str =
    "id, product_id, spec_desc, image, price, stock, active, created_at, updated_at";

/// 商品目录仓储，方法均在调用方事务内执行
pub struct CatalogRepository;

impl CatalogRepository {
    // ==================== 查询 ====================

    /// 在事务中获取商品
    pub async fn get_product_in_tx(tx: &mut PgConnection, id: i64) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(tx)
            .await?;

        Ok(product)
    }

    /// 在事务中获取规格
    pub async fn get_sku_in_tx(tx: &mut PgConnection, id: i64) -> Result<Option<Sku>> {
        let sql = format!("SELECT {SKU_COLUMNS} FROM skus WHERE id = $1");
        let sku = sqlx::query_as::<_, Sku>(&sql)
            .bind(id)
            .fetch_optional(tx)
            .await?;

        Ok(sku)
    }

    // ==================== 库存 ====================

    /// 扣减规格库存
    ///
    /// 返回受影响行数，0 表示库存不足
    pub async fn decrement_sku_stock_in_tx(
        tx: &mut PgConnection,
        sku_id: i64,
        quantity: i32,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE skus
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            "#,
        )
        .bind(sku_id)
        .bind(quantity)
        .execute(tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// 扣减商品库存
    ///
    /// 返回受影响行数，0 表示库存不足
    pub async fn decrement_product_stock_in_tx(
        tx: &mut PgConnection,
        product_id: i64,
        quantity: i32,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .execute(tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// 归还规格库存
    pub async fn increment_sku_stock_in_tx(
        tx: &mut PgConnection,
        sku_id: i64,
        quantity: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE skus
            SET stock = stock + $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(sku_id)
        .bind(quantity)
        .execute(tx)
        .await?;

        Ok(())
    }

    /// 归还商品库存
    pub async fn increment_product_stock_in_tx(
        tx: &mut PgConnection,
        product_id: i64,
        quantity: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE products
            SET stock = stock + $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .execute(tx)
        .await?;

        Ok(())
    }

    // ==================== 销量 ====================

    /// 增加商品销量
    pub async fn increase_sales_count_in_tx(
        tx: &mut PgConnection,
        product_id: i64,
        quantity: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE products
            SET sales_count = sales_count + $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .execute(tx)
        .await?;

        Ok(())
    }
}
