//! The subset of XML Schema datatypes the SPARQL expression evaluator needs:
//! numeric promotion (`xsd:integer` → `xsd:decimal` → `xsd:float` →
//! `xsd:double`), boolean, and date/time/duration with their accessors.

mod boolean;
mod date_time;
mod decimal;
mod float_double;
mod integer;

pub use boolean::{Boolean, ParseBooleanError};
pub use date_time::{DateTime, Duration, ParseDateTimeError, TimezoneOffset};
pub use decimal::{Decimal, ParseDecimalError};
pub use float_double::{Double, Float, ParseFloatError};
pub use integer::{Integer, ParseIntegerError};

/// The numeric promotion ladder used by arithmetic and comparison
/// operators: values are promoted to the narrowest common type before the
/// operation, per SPARQL 1.1 operator mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Integer(Integer),
    Decimal(Decimal),
    Float(Float),
    Double(Double),
}

impl Numeric {
    pub fn to_double(self) -> Double {
        match self {
            Self::Integer(v) => Double::new(f64::from(v)),
            Self::Decimal(v) => Double::new(v.to_f64()),
            Self::Float(v) => Double::from(v),
            Self::Double(v) => v,
        }
    }

    /// Promotes two operands to their common type, widest wins.
    pub fn promote(self, other: Self) -> (Self, Self) {
        use Numeric::{Decimal as D, Double as Db, Float as F, Integer as I};
        match (self, other) {
            (I(_), I(_)) | (D(_), D(_)) | (F(_), F(_)) | (Db(_), Db(_)) => (self, other),
            (Db(_), _) | (_, Db(_)) => (
                Db(self.to_double()),
                Db(other.to_double()),
            ),
            (F(_), _) | (_, F(_)) => {
                let to_f = |n: Self| match n {
                    I(v) => Float::new(f64::from(v) as f32),
                    D(v) => Float::new(v.to_f64() as f32),
                    F(v) => v,
                    Db(_) => unreachable!("double case handled above"),
                };
                (F(to_f(self)), F(to_f(other)))
            }
            (D(_), I(_)) | (I(_), D(_)) => {
                let to_d = |n: Self| match n {
                    I(v) => crate::decimal::Decimal::from(v),
                    D(v) => v,
                    _ => unreachable!("float/double handled above"),
                };
                (D(to_d(self)), D(to_d(other)))
            }
        }
    }
}

impl std::fmt::Display for Numeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => v.fmt(f),
            Self::Decimal(v) => v.fmt(f),
            Self::Float(v) => v.fmt(f),
            Self::Double(v) => v.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_keeps_matching_types_unchanged() {
        let (a, b) = Numeric::Integer(Integer::from(1)).promote(Numeric::Integer(Integer::from(2)));
        assert!(matches!(a, Numeric::Integer(_)) && matches!(b, Numeric::Integer(_)));
    }

    #[test]
    fn promote_widens_integer_and_decimal_to_decimal() {
        let (a, b) = Numeric::Integer(Integer::from(1)).promote(Numeric::Decimal(Decimal::from_i64(2)));
        assert!(matches!(a, Numeric::Decimal(_)) && matches!(b, Numeric::Decimal(_)));
    }

    #[test]
    fn promote_widens_to_double_when_either_side_is_double() {
        let (a, b) = Numeric::Integer(Integer::from(1)).promote(Numeric::Double(Double::new(2.0)));
        assert!(matches!(a, Numeric::Double(_)) && matches!(b, Numeric::Double(_)));
        let (a, b) = Numeric::Float(Float::new(1.0)).promote(Numeric::Double(Double::new(2.0)));
        assert!(matches!(a, Numeric::Double(_)) && matches!(b, Numeric::Double(_)));
    }

    #[test]
    fn promote_widens_integer_and_decimal_to_float_when_paired_with_float() {
        let (a, b) = Numeric::Integer(Integer::from(1)).promote(Numeric::Float(Float::new(2.0)));
        assert!(matches!(a, Numeric::Float(_)) && matches!(b, Numeric::Float(_)));
    }

    #[test]
    fn to_double_converts_every_variant() {
        assert_eq!(Numeric::Integer(Integer::from(3)).to_double(), Double::new(3.0));
        assert_eq!(Numeric::Decimal(Decimal::from_i64(3)).to_double(), Double::new(3.0));
    }
}
