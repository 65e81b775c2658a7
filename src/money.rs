//! Fixed-point money type
//!
//! Amounts are integer cents so ledger arithmetic is exact. Conversion from
//! dollars rounds to the nearest cent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Monetary amount in cents.
///
/// # Examples
/// - `Money::from_cents(9500)` = $95.00
/// - `Money::from_dollars(1.5)` = $1.50
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Create from whole cents
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Create from dollars, rounding to the nearest cent (negatives clamp to zero)
    pub fn from_dollars(dollars: f64) -> Self {
        if !dollars.is_finite() || dollars <= 0.0 {
            return Self::ZERO;
        }
        Self((dollars * 100.0).round() as u64)
    }

    /// Raw cents
    pub const fn cents(self) -> u64 {
        self.0
    }

    /// Value in dollars (for display and ratios only)
    pub fn as_dollars(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Scale by a non-negative factor, rounding down to the cent
    pub fn scale(self, factor: f64) -> Self {
        if !factor.is_finite() || factor <= 0.0 {
            return Self::ZERO;
        }
        // Nudge before flooring so 0.95 × $500 is $475.00, not $474.99
        Self((self.0 as f64 * factor + 1e-6).floor() as u64)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

// Saturates at zero; ledger code uses checked_sub where underflow matters.
impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_sub(rhs.0);
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

/// Serialize `Money` as a dollar amount (`95.5`) for human-edited files
///
/// Use with `#[serde(with = "crate::money::dollars")]`.
pub mod dollars {
    use super::Money;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(money: &Money, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(money.as_dollars())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        let dollars = f64::deserialize(deserializer)?;
        if dollars < 0.0 {
            return Err(serde::de::Error::custom("amount must not be negative"));
        }
        Ok(Money::from_dollars(dollars))
    }
}

/// Optional variant of [`dollars`]
pub mod option_dollars {
    use super::Money;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        money: &Option<Money>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match money {
            Some(m) => serializer.serialize_some(&m.as_dollars()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Money>, D::Error> {
        let dollars = Option::<f64>::deserialize(deserializer)?;
        match dollars {
            Some(d) if d < 0.0 => Err(serde::de::Error::custom("amount must not be negative")),
            Some(d) => Ok(Some(Money::from_dollars(d))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dollars_rounds() {
        assert_eq!(Money::from_dollars(95.0).cents(), 9500);
        assert_eq!(Money::from_dollars(0.016).cents(), 2);
        assert_eq!(Money::from_dollars(-3.0), Money::ZERO);
        assert_eq!(Money::from_dollars(f64::NAN), Money::ZERO);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(9500).to_string(), "$95.00");
        assert_eq!(Money::from_cents(7).to_string(), "$0.07");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(500);
        let b = Money::from_cents(200);
        assert_eq!(a + b, Money::from_cents(700));
        assert_eq!(a - b, Money::from_cents(300));
        assert_eq!(b - a, Money::ZERO);
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(a.scale(0.6), Money::from_cents(300));
        let total: Money = [a, b].iter().sum();
        assert_eq!(total, Money::from_cents(700));
        assert_eq!(Money::from_dollars(500.0).scale(0.95), Money::from_dollars(475.0));
    }

    #[test]
    fn test_dollars_serde() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Budget {
            #[serde(with = "dollars")]
            total: Money,
            #[serde(default, with = "option_dollars")]
            cap: Option<Money>,
        }

        let budget: Budget = serde_yaml::from_str("total: 500.25\n").unwrap();
        assert_eq!(budget.total, Money::from_cents(50025));
        assert_eq!(budget.cap, None);
        assert!(serde_yaml::from_str::<Budget>("total: -1\n").is_err());
    }
}
