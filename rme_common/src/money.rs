use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------       Money         ---------------------------------------------------------
/// An amount of money, stored as integer cents. All ledger arithmetic happens in cents so that sums of payments
/// are exact; fractions only appear when a commission rate is applied, and the result is rounded back to cents
/// immediately.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in cents: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {} is too large to convert to Money", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let units = self.0 as f64 / 100.0;
        write!(f, "{units:0.2}")
    }
}

impl Money {
    /// The raw value in cents.
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Whole currency units, i.e. `Money::from_units(5)` is 5.00.
    pub fn from_units(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Applies a percentage rate, rounding half-away-from-zero to the nearest cent.
    /// `Money::from_units(100).percentage(10.0)` is 10.00.
    pub fn percentage(&self, percent: f64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self((self.0 as f64 * percent / 100.0).round() as i64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cents_arithmetic() {
        let a = Money::from_units(100);
        let b = Money::from_cents(2_550);
        assert_eq!((a + b).value(), 12_550);
        assert_eq!((a - b).value(), 7_450);
        assert_eq!((-b).value(), -2_550);
        assert_eq!((b * 2).value(), 5_100);
        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.value(), 15_100);
    }

    #[test]
    fn percentage_rounds_to_nearest_cent() {
        assert_eq!(Money::from_units(100).percentage(10.0), Money::from_units(10));
        // 33.333... cents rounds up
        assert_eq!(Money::from_cents(100).percentage(33.333), Money::from_cents(33));
        assert_eq!(Money::from_cents(150).percentage(33.0), Money::from_cents(50)); // 49.5 rounds away from zero
        assert_eq!(Money::from_cents(0).percentage(15.0), Money::from_cents(0));
    }

    #[test]
    fn display_in_units() {
        assert_eq!(Money::from_cents(12_345).to_string(), "123.45");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
    }
}
