//! 库存账本与价格预览集成测试
//!
//! ## 运行方式
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo test --test inventory_ledger_test -- --ignored
//! ```

mod common;

use transaction_engine::error::CommerceError;
use transaction_engine::models::{Money, TransactionType};
use transaction_engine::service::InventoryLedger;

use common::*;

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_reserve_release_roundtrip_on_both_levels() {
    let pool = connect().await;
    seed_product(&pool, 950_001, 1000, 10).await;
    seed_sku(&pool, 960_001, 950_001, 1200, 4).await;
    let ledger = InventoryLedger::new(pool.clone());

    ledger.reserve(950_001, Some(960_001), 3).await.unwrap();
    assert_eq!(sku_stock(&pool, 960_001).await, 1);
    assert_eq!(product_stock(&pool, 950_001).await.0, 7);

    ledger.release(950_001, Some(960_001), 3).await.unwrap();
    assert_eq!(sku_stock(&pool, 960_001).await, 4);
    assert_eq!(product_stock(&pool, 950_001).await.0, 10);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_sku_shortage_leaves_product_untouched() {
    let pool = connect().await;
    seed_product(&pool, 950_011, 1000, 10).await;
    seed_sku(&pool, 960_011, 950_011, 1000, 2).await;
    let ledger = InventoryLedger::new(pool.clone());

    let err = ledger.reserve(950_011, Some(960_011), 3).await.unwrap_err();
    assert!(matches!(err, CommerceError::InsufficientStock { .. }));
    assert_eq!(sku_stock(&pool, 960_011).await, 2);
    assert_eq!(product_stock(&pool, 950_011).await.0, 10);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_resolve_line_checks_sku_ownership_and_shelf() {
    let pool = connect().await;
    seed_product(&pool, 950_021, 1000, 10).await;
    seed_product(&pool, 950_022, 2000, 10).await;
    seed_sku(&pool, 960_021, 950_021, 1500, 5).await;
    let ledger = InventoryLedger::new(pool.clone());

    let line = ledger.resolve_line(950_021, Some(960_021)).await.unwrap();
    assert_eq!(line.unit_price, Money::from_cents(1500));

    let err = ledger.resolve_line(950_022, Some(960_021)).await.unwrap_err();
    assert!(matches!(
        err,
        CommerceError::SkuNotFound { product_id: 950_022, sku_id: 960_021 }
    ));

    sqlx::query("UPDATE products SET on_sale = false WHERE id = 950022")
        .execute(&pool)
        .await
        .unwrap();
    let err = ledger.resolve_line(950_022, None).await.unwrap_err();
    assert!(matches!(err, CommerceError::ProductOffShelf(950_022)));

    let err = ledger.resolve_line(959_999_999, None).await.unwrap_err();
    assert!(matches!(err, CommerceError::ProductNotFound(959_999_999)));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_sales_counter_increments() {
    let pool = connect().await;
    seed_product(&pool, 950_031, 1000, 10).await;
    let ledger = InventoryLedger::new(pool.clone());

    ledger.increase_sales_counter(950_031, 2).await.unwrap();
    ledger.increase_sales_counter(950_031, 1).await.unwrap();

    assert_eq!(product_stock(&pool, 950_031).await, (10, 3));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_preview_never_exceeds_original() {
    let engine = setup_engine().await;

    let preview = engine
        .orders
        .preview_discount(TransactionType::Retail, Money::from_cents(26000))
        .await
        .unwrap();

    assert_eq!(preview.original_amount, Money::from_cents(26000).to_decimal());
    assert!(preview.campaign_discount <= preview.original_amount);
    assert_eq!(
        preview.final_amount,
        preview.original_amount - preview.campaign_discount
    );
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_quote_with_coupon_does_not_consume_it() {
    let engine = setup_engine().await;
    let user = unique_user("quote-coupon");
    let coupon = grant_fixed_coupon(&engine.pool, &user, 1000, 0).await;

    let quote = engine
        .orders
        .quote_discount(&user, TransactionType::Retail, Money::from_cents(26000), Some(coupon))
        .await
        .unwrap();

    assert_eq!(quote.coupon_discount, Money::from_cents(1000).to_decimal());
    assert_eq!(quote.coupon_name.as_deref(), Some("测试满减券"));
    assert_eq!(
        quote.final_amount,
        quote.original_amount - quote.campaign_discount - quote.coupon_discount
    );
    assert_eq!(coupon_status(&engine.pool, coupon).await, "UNUSED");
}
