use std::fmt;
use std::str::FromStr;

/// `xsd:boolean`.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Default, Hash)]
pub struct Boolean(bool);

impl Boolean {
    pub const fn from_bool(value: bool) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn is_true(self) -> bool {
        self.0
    }
}

impl From<bool> for Boolean {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

impl From<Boolean> for bool {
    fn from(value: Boolean) -> Self {
        value.0
    }
}

impl std::ops::Not for Boolean {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl std::ops::BitAnd for Boolean {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 && rhs.0)
    }
}

impl std::ops::BitOr for Boolean {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 || rhs.0)
    }
}

impl fmt::Display for Boolean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0 { "true" } else { "false" })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParseBooleanError;

impl fmt::Display for ParseBooleanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid xsd:boolean lexical form")
    }
}

impl std::error::Error for ParseBooleanError {}

impl FromStr for Boolean {
    type Err = ParseBooleanError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "true" | "1" => Ok(Self(true)),
            "false" | "0" => Ok(Self(false)),
            _ => Err(ParseBooleanError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_canonical_and_numeric_lexical_forms() {
        assert_eq!("true".parse::<Boolean>().unwrap(), Boolean::from_bool(true));
        assert_eq!("1".parse::<Boolean>().unwrap(), Boolean::from_bool(true));
        assert_eq!("false".parse::<Boolean>().unwrap(), Boolean::from_bool(false));
        assert_eq!("0".parse::<Boolean>().unwrap(), Boolean::from_bool(false));
    }

    #[test]
    fn rejects_other_forms() {
        assert!("True".parse::<Boolean>().is_err());
        assert!("yes".parse::<Boolean>().is_err());
    }

    #[test]
    fn boolean_operators() {
        let t = Boolean::from_bool(true);
        let f = Boolean::from_bool(false);
        assert_eq!(!t, f);
        assert_eq!(t & f, f);
        assert_eq!(t | f, t);
    }

    #[test]
    fn display_round_trips_lexical_form() {
        assert_eq!(Boolean::from_bool(true).to_string(), "true");
        assert_eq!(Boolean::from_bool(false).to_string(), "false");
    }
}
