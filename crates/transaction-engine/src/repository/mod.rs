//! 数据库仓储层
//!
//! 每个仓储同时提供连接池方法和 `*_in_tx` 静态方法，
//! 后者接收 `&mut PgConnection`，供服务层在同一事务中组合多步写入

pub mod cart_repo;
pub mod catalog_repo;
pub mod discount_repo;
pub mod event_repo;
pub mod order_repo;
pub mod payment_repo;
pub mod refund_repo;
pub mod traits;

pub use cart_repo::CartRepository;
pub use catalog_repo::CatalogRepository;
pub use discount_repo::DiscountRepository;
pub use event_repo::EventRepository;
pub use order_repo::OrderRepository;
pub use payment_repo::PaymentRepository;
pub use refund_repo::RefundRepository;
pub use traits::DiscountRepositoryTrait;

#[cfg(test)]
pub use traits::MockDiscountRepositoryTrait;
