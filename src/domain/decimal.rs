//! Lossless decimal numeric type backed by rust_decimal.
//!
//! All ledger math runs on this wrapper to avoid floating-point drift in
//! cash/PnL accumulators. Serializes to JSON number (not string).

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lossless decimal numeric type for financial calculations.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Decimal {
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse a Decimal from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Decimal)
    }

    /// Format as a canonical string (no exponent notation, no trailing zeros).
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    pub fn one() -> Self {
        Decimal(RustDecimal::ONE)
    }

    pub fn from_i64(v: i64) -> Self {
        Decimal(RustDecimal::from(v))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }

    /// Sign of the value: -1, 0 or +1.
    pub fn signum(&self) -> Self {
        if self.is_zero() {
            Decimal::zero()
        } else {
            Decimal(self.0.signum())
        }
    }

    pub fn min(self, other: Self) -> Self {
        if self <= other {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Self) -> Self {
        if self >= other {
            self
        } else {
            other
        }
    }

    /// The relative tolerance used for equity identity checks (1e-9).
    pub fn identity_tolerance() -> Self {
        Decimal(RustDecimal::new(1, 9))
    }

    /// True when `self` and `other` agree within the relative tolerance of
    /// [`Decimal::identity_tolerance`], with an absolute floor near zero.
    pub fn approx_eq(&self, other: Self) -> bool {
        let diff = (*self - other).abs();
        let scale = self.abs().max(other.abs()).max(Decimal::one());
        diff <= scale * Decimal::identity_tolerance()
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::SubAssign for Decimal {
    fn sub_assign(&mut self, rhs: Decimal) {
        self.0 -= rhs.0;
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_parse_and_canonical_format() {
        for s in ["123.456", "0.0001", "-123.456", "0", "999999999.999999999"] {
            let parsed = d(s);
            let reparsed = d(&parsed.to_canonical_string());
            assert_eq!(parsed, reparsed, "roundtrip failed for {}", s);
        }
        assert!(!d("123").to_canonical_string().contains('e'));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!((d("10.5") + d("2.5")).to_canonical_string(), "13");
        assert_eq!((d("10.5") - d("2.5")).to_canonical_string(), "8");
        assert_eq!((d("10.5") * d("2.5")).to_canonical_string(), "26.25");
        assert_eq!((d("10") / d("4")).to_canonical_string(), "2.5");
        assert_eq!((-d("3")).to_canonical_string(), "-3");
    }

    #[test]
    fn test_signum() {
        assert_eq!(d("5").signum(), d("1"));
        assert_eq!(d("-5").signum(), d("-1"));
        assert_eq!(Decimal::zero().signum(), Decimal::zero());
    }

    #[test]
    fn test_min_max() {
        assert_eq!(d("3").min(d("7")), d("3"));
        assert_eq!(d("3").max(d("7")), d("7"));
        assert_eq!(d("-3").min(d("-7")), d("-7"));
    }

    #[test]
    fn test_approx_eq_tolerance() {
        let a = d("100000");
        let b = a + d("0.00001");
        assert!(a.approx_eq(a));
        assert!(a.approx_eq(b));
        assert!(!a.approx_eq(d("100001")));
        assert!(Decimal::zero().approx_eq(Decimal::zero()));
    }

    #[test]
    fn test_json_serialization_is_number() {
        let json = serde_json::to_value(d("123.456")).unwrap();
        assert!(json.is_number());
        assert_eq!(json.to_string(), "123.456");
    }
}
