use crate::decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// `xsd:integer`, backed by `i64` (large enough for every practical SPARQL
/// numeric literal; arbitrary precision is not implemented).
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Default, Hash)]
pub struct Integer(i64);

impl Integer {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn as_i64(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        self.0.checked_mul(rhs.0).map(Self)
    }

    pub fn checked_neg(self) -> Option<Self> {
        self.0.checked_neg().map(Self)
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }
}

impl From<i64> for Integer {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<i32> for Integer {
    fn from(value: i32) -> Self {
        Self(i64::from(value))
    }
}

impl From<Integer> for i64 {
    fn from(value: Integer) -> Self {
        value.0
    }
}

impl From<Integer> for Decimal {
    fn from(value: Integer) -> Self {
        Decimal::from_i64(value.0)
    }
}

impl From<Integer> for f64 {
    fn from(value: Integer) -> Self {
        value.0 as f64
    }
}

impl fmt::Display for Integer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParseIntegerError;

impl fmt::Display for ParseIntegerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid xsd:integer lexical form")
    }
}

impl std::error::Error for ParseIntegerError {}

impl FromStr for Integer {
    type Err = ParseIntegerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        input.trim().parse().map(Self).map_err(|_| ParseIntegerError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_lexical_form() {
        assert_eq!("42".parse::<Integer>().unwrap(), Integer::from(42));
        assert_eq!("-7".parse::<Integer>().unwrap(), Integer::from(-7));
    }

    #[test]
    fn rejects_non_integer_forms() {
        assert!("4.2".parse::<Integer>().is_err());
        assert!("abc".parse::<Integer>().is_err());
    }

    #[test]
    fn checked_arithmetic_detects_overflow() {
        let max = Integer::from(i64::MAX);
        assert!(max.checked_add(Integer::from(1)).is_none());
        assert_eq!(
            Integer::from(2).checked_add(Integer::from(3)),
            Some(Integer::from(5))
        );
    }

    #[test]
    fn abs_and_neg() {
        assert_eq!(Integer::from(-5).abs(), Integer::from(5));
        assert_eq!(Integer::from(5).checked_neg(), Some(Integer::from(-5)));
    }

    #[test]
    fn converts_to_decimal_and_f64() {
        let i = Integer::from(10);
        assert_eq!(Decimal::from(i), Decimal::from_i64(10));
        assert_eq!(f64::from(i), 10.0);
    }

    #[test]
    fn display_round_trips() {
        assert_eq!(Integer::from(-3).to_string(), "-3");
    }
}
