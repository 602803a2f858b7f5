//! 交易引擎领域模型
//!
//! 包含订单、支付、退款、商品目录、优惠和订单事件的实体定义

pub mod catalog;
pub mod discount;
pub mod enums;
pub mod event;
pub mod money;
pub mod order;
pub mod payment;
pub mod refund;

// 重新导出常用类型
pub use catalog::{AddressSnapshot, CartItem, Product, ResolvedLine, Sku, UserAddress};
pub use discount::{Campaign, DiscountRef, DiscountResult, UserCoupon, discount_amount};
pub use enums::{
    DiscountType, EventStatus, OperatorType, OrderEventKind, OrderStatus, PaymentChannel,
    PaymentMethod, PaymentStatus, PaymentTargetType, PointChangeType, RefundStatus,
    TransactionType, UserCouponStatus,
};
pub use event::{NewOrderEvent, OrderEvent};
pub use money::Money;
pub use order::{NewOrder, NewOrderItem, Order, OrderItem};
pub use payment::{NewPayment, Payment, PaymentTarget};
pub use refund::{NewRefund, Refund, restoration_status};
