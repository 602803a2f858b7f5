//! 商品目录与购物车实体
//!
//! 商品、规格由目录子系统维护，交易引擎只读取并修改库存/销量计数

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::Money;

/// 商品
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[sqlx(default)]
    pub main_image: Option<String>,
    pub price: Money,
    pub stock: i32,
    pub sales_count: i32,
    pub on_sale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 商品规格（SKU）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    pub id: i64,
    pub product_id: i64,
    pub spec_desc: String,
    #[sqlx(default)]
    pub image: Option<String>,
    pub price: Money,
    pub stock: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 已定价的订单行
///
/// 下单时的价格与展示信息快照，规格价格优先于商品价格
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLine {
    pub product_id: i64,
    pub sku_id: Option<i64>,
    pub product_name: String,
    pub product_image: Option<String>,
    pub sku_desc: Option<String>,
    pub unit_price: Money,
}

impl ResolvedLine {
    pub fn from_catalog(product: &Product, sku: Option<&Sku>) -> Self {
        match sku {
            Some(sku) => Self {
                product_id: product.id,
                sku_id: Some(sku.id),
                product_name: product.name.clone(),
                product_image: sku.image.clone().or_else(|| product.main_image.clone()),
                sku_desc: Some(sku.spec_desc.clone()),
                unit_price: sku.price,
            },
            None => Self {
                product_id: product.id,
                sku_id: None,
                product_name: product.name.clone(),
                product_image: product.main_image.clone(),
                sku_desc: None,
                unit_price: product.price,
            },
        }
    }
}

/// 购物车条目
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: i64,
    pub user_id: String,
    pub product_id: i64,
    #[sqlx(default)]
    pub sku_id: Option<i64>,
    pub quantity: i32,
    pub selected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 用户收货地址
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserAddress {
    pub id: i64,
    pub user_id: String,
    pub receiver_name: String,
    pub phone: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

/// 订单收货地址快照（JSONB，创建后不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSnapshot {
    pub receiver_name: String,
    pub phone: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub detail: String,
}

impl From<&UserAddress> for AddressSnapshot {
    fn from(address: &UserAddress) -> Self {
        Self {
            receiver_name: address.receiver_name.clone(),
            phone: address.phone.clone(),
            province: address.province.clone(),
            city: address.city.clone(),
            district: address.district.clone(),
            detail: address.detail.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        Product {
            id: 1,
            name: "登山杖".to_string(),
            main_image: Some("https://img.test/pole.png".to_string()),
            price: Money::from_cents(8000),
            stock: 10,
            sales_count: 0,
            on_sale: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_resolve_line_without_sku_uses_product_price() {
        let line = ResolvedLine::from_catalog(&product(), None);
        assert_eq!(line.unit_price, Money::from_cents(8000));
        assert_eq!(line.sku_id, None);
        assert_eq!(line.sku_desc, None);
    }

    #[test]
    fn test_resolve_line_sku_price_overrides() {
        let sku = Sku {
            id: 11,
            product_id: 1,
            spec_desc: "碳纤维 / 120cm".to_string(),
            image: None,
            price: Money::from_cents(12000),
            stock: 5,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let line = ResolvedLine::from_catalog(&product(), Some(&sku));
        assert_eq!(line.unit_price, Money::from_cents(12000));
        assert_eq!(line.sku_id, Some(11));
        assert_eq!(line.sku_desc.as_deref(), Some("碳纤维 / 120cm"));
        // 规格无图时回落到商品主图
        assert_eq!(line.product_image.as_deref(), Some("https://img.test/pole.png"));
    }
}
