use std::fmt;

/// The abstract classification of a parse failure, per the parser's failure
/// model: a single descriptive message, no error recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnexpectedToken { expected: &'static str, found: String },
    IncompleteConstruct(&'static str),
    UnknownPrefix(String),
    InvalidIri(String),
    InvalidLiteral(String),
    InvalidNumber(String),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedToken { expected, found } => {
                write!(f, "expected {expected}, found '{found}'")
            }
            Self::IncompleteConstruct(what) => write!(f, "incomplete {what}"),
            Self::UnknownPrefix(prefix) => write!(f, "unknown prefix '{prefix}:'"),
            Self::InvalidIri(iri) => write!(f, "invalid IRI '{iri}'"),
            Self::InvalidLiteral(lit) => write!(f, "invalid literal '{lit}'"),
            Self::InvalidNumber(n) => write!(f, "invalid numeric literal '{n}'"),
        }
    }
}

/// A SPARQL parse error carrying the byte offset into the query text at
/// which it was detected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at byte offset {position}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: usize,
}

impl ParseError {
    pub(crate) fn new(kind: ParseErrorKind, position: usize) -> Self {
        Self { kind, position }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_the_byte_offset() {
        let err = ParseError::new(ParseErrorKind::UnknownPrefix("ex".to_owned()), 12);
        assert_eq!(err.to_string(), "unknown prefix 'ex:' at byte offset 12");
    }

    #[test]
    fn unexpected_token_names_both_expected_and_found() {
        let kind = ParseErrorKind::UnexpectedToken {
            expected: "'}'",
            found: "SELECT".to_owned(),
        };
        assert_eq!(kind.to_string(), "expected '}', found 'SELECT'");
    }
}
