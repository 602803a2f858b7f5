//! 金额类型
//!
//! 所有金额以分为单位的整数存储和计算，仅在对外展示时转换为两位小数。

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 金额（单位：分）
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// 单价乘以数量
    pub fn times(self, quantity: i32) -> Self {
        Self(self.0 * i64::from(quantity))
    }

    /// 按百分比计算（向下取整到分）
    pub fn percent(self, percent: i64) -> Self {
        Self(self.0 * percent / 100)
    }

    /// 减法，结果不低于零
    pub fn saturating_sub(self, other: Money) -> Self {
        Self((self.0 - other.0).max(0))
    }

    /// 整元部分（不足一元舍去）
    pub fn whole_units(self) -> i64 {
        self.0 / 100
    }

    /// 转换为两位小数，用于 DTO 展示
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_times_and_sum() {
        let lines = [Money::from_cents(8000).times(2), Money::from_cents(10000).times(1)];
        let total: Money = lines.into_iter().sum();
        assert_eq!(total, Money::from_cents(26000));
    }

    #[test]
    fn test_percent_floors_to_cent() {
        // 999 分打 15% = 149.85 分，向下取整为 149
        assert_eq!(Money::from_cents(999).percent(15), Money::from_cents(149));
        assert_eq!(Money::from_cents(24000).percent(10), Money::from_cents(2400));
    }

    #[test]
    fn test_saturating_sub() {
        assert_eq!(
            Money::from_cents(100).saturating_sub(Money::from_cents(300)),
            Money::ZERO
        );
    }

    #[test]
    fn test_decimal_display() {
        assert_eq!(Money::from_cents(26000).to_decimal().to_string(), "260.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(26099).whole_units(), 260);
    }
}
