//! 交易引擎枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化，数据库中以大写下划线字符串存储

use serde::{Deserialize, Serialize};

/// 交易类型
///
/// 决定优惠活动/优惠券的适用范围，以及是否参与积分等副作用
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// 商城零售
    #[default]
    Retail,
    /// 装备租赁
    Rental,
    /// 场馆预订
    Booking,
    /// 会员套餐（不参与积分）
    MemberPackage,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retail => "RETAIL",
            Self::Rental => "RENTAL",
            Self::Booking => "BOOKING",
            Self::MemberPackage => "MEMBER_PACKAGE",
        }
    }

    /// 是否豁免订单事件副作用
    pub fn is_hook_exempt(&self) -> bool {
        matches!(self, Self::MemberPackage)
    }
}

/// 订单状态
///
/// 正向流程: PENDING → PAID → PENDING_SHIP → SHIPPED → COMPLETED
/// 取消: PENDING → CANCELLED
/// 退款: PAID/PENDING_SHIP/SHIPPED → REFUNDING → REFUNDED 或回到原状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// 待支付
    #[default]
    Pending,
    /// 已支付
    Paid,
    /// 待发货
    PendingShip,
    /// 已发货
    Shipped,
    /// 已完成
    Completed,
    /// 已取消
    Cancelled,
    /// 退款中
    Refunding,
    /// 已退款
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::PendingShip => "PENDING_SHIP",
            Self::Shipped => "SHIPPED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Refunding => "REFUNDING",
            Self::Refunded => "REFUNDED",
        }
    }

    /// 展示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "待支付",
            Self::Paid => "已支付",
            Self::PendingShip => "待发货",
            Self::Shipped => "已发货",
            Self::Completed => "已完成",
            Self::Cancelled => "已取消",
            Self::Refunding => "退款中",
            Self::Refunded => "已退款",
        }
    }

    /// 是否允许发起退款
    pub fn is_refundable(&self) -> bool {
        matches!(self, Self::Paid | Self::PendingShip | Self::Shipped)
    }

    /// 状态流转合法性
    ///
    /// REFUNDING 可以回到进入退款前的任一可退款状态
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Paid)
                | (Pending, Cancelled)
                | (Paid, PendingShip)
                | (Paid, Shipped)
                | (Paid, Refunding)
                | (PendingShip, Shipped)
                | (PendingShip, Refunding)
                | (Shipped, Completed)
                | (Shipped, Refunding)
                | (Refunding, Refunded)
                | (Refunding, Paid)
                | (Refunding, PendingShip)
                | (Refunding, Shipped)
        )
    }
}

/// 支付对象类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentTargetType {
    /// 商城订单
    Order,
    /// 租赁单
    Rental,
    /// 预订单
    Booking,
}

impl PaymentTargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "ORDER",
            Self::Rental => "RENTAL",
            Self::Booking => "BOOKING",
        }
    }
}

/// 支付单状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// 待支付
    #[default]
    Pending,
    /// 支付成功
    Success,
    /// 支付失败
    Failed,
    /// 已关闭（超时未支付）
    Closed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Closed => "CLOSED",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "待支付",
            Self::Success => "支付成功",
            Self::Failed => "支付失败",
            Self::Closed => "已关闭",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// 支付方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// 第三方支付网关
    #[default]
    Gateway,
    /// 线下现金
    Cash,
}

/// 网关支付渠道
///
/// 决定网关下单时返回的参数形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentChannel {
    /// 移动应用内支付
    App,
    /// 扫码支付
    Native,
    /// 移动网页支付
    H5,
}

impl PaymentChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::App => "APP",
            Self::Native => "NATIVE",
            Self::H5 => "H5",
        }
    }
}

/// 退款单状态
///
/// PENDING → APPROVED → PROCESSING → SUCCESS / FAILED，或 PENDING → REJECTED
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    /// 待审核
    #[default]
    Pending,
    /// 已审核通过
    Approved,
    /// 已拒绝（含用户撤销）
    Rejected,
    /// 退款处理中
    Processing,
    /// 退款成功
    Success,
    /// 退款失败
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "待审核",
            Self::Approved => "审核通过",
            Self::Rejected => "已拒绝",
            Self::Processing => "退款中",
            Self::Success => "退款成功",
            Self::Failed => "退款失败",
        }
    }

    /// 是否为未终结状态（同一订单至多一笔）
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved | Self::Processing)
    }

    /// 是否占用支付单的可退金额
    pub fn holds_amount(&self) -> bool {
        !matches!(self, Self::Rejected | Self::Failed)
    }
}

/// 操作人类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorType {
    /// 用户本人
    User,
    /// 运营人员
    Staff,
    /// 系统自动
    System,
}

/// 优惠计算方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    /// 固定金额（discount_value 为分）
    Fixed,
    /// 百分比折扣（discount_value 为减免百分比 1-100）
    Percentage,
}

/// 用户优惠券状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserCouponStatus {
    #[default]
    Unused,
    Used,
    Expired,
}

/// 订单事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEventKind {
    /// 订单完成（确认收货）
    OrderCompleted,
    /// 订单退款成功
    OrderRefunded,
}

/// 订单事件投递状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    #[default]
    Pending,
    Delivered,
    Failed,
}

/// 积分变动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointChangeType {
    /// 消费获得（+）
    Purchase,
    /// 退款扣回（-）
    Refund,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_forward_flow() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::PendingShip));
        assert!(OrderStatus::PendingShip.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn test_order_status_illegal_transitions() {
        // 已发货订单不可取消
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Refunding));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Refunding));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Refunded.can_transition_to(OrderStatus::Paid));
    }

    #[test]
    fn test_order_status_refund_restoration() {
        for prior in [OrderStatus::Paid, OrderStatus::PendingShip, OrderStatus::Shipped] {
            assert!(prior.is_refundable());
            assert!(prior.can_transition_to(OrderStatus::Refunding));
            assert!(OrderStatus::Refunding.can_transition_to(prior));
        }
        assert!(OrderStatus::Refunding.can_transition_to(OrderStatus::Refunded));
    }

    #[test]
    fn test_payment_terminal_states() {
        assert!(PaymentStatus::Closed.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
    }

    #[test]
    fn test_order_status_serialization() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::PendingShip).unwrap(),
            "\"PENDING_SHIP\""
        );
        assert_eq!(
            serde_json::from_str::<TransactionType>("\"MEMBER_PACKAGE\"").unwrap(),
            TransactionType::MemberPackage
        );
        assert_eq!(OrderStatus::PendingShip.as_str(), "PENDING_SHIP");
    }

    #[test]
    fn test_display_names() {
        assert_eq!(OrderStatus::Pending.display_name(), "待支付");
        assert_eq!(OrderStatus::Refunding.display_name(), "退款中");
        assert_eq!(PaymentStatus::Closed.display_name(), "已关闭");
        assert_eq!(RefundStatus::Approved.display_name(), "审核通过");
    }

    #[test]
    fn test_refund_status_classification() {
        assert!(RefundStatus::Pending.is_open());
        assert!(RefundStatus::Processing.is_open());
        assert!(!RefundStatus::Success.is_open());
        assert!(RefundStatus::Success.holds_amount());
        assert!(!RefundStatus::Rejected.holds_amount());
        assert!(!RefundStatus::Failed.holds_amount());
    }

    #[test]
    fn test_hook_exemption() {
        assert!(TransactionType::MemberPackage.is_hook_exempt());
        assert!(!TransactionType::Retail.is_hook_exempt());
    }
}
