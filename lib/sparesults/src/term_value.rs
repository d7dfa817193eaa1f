//! The term-value shape used at the engine boundary (§6): the cross-format
//! representation a SELECT result row, or a parsed SPARQL-results JSON
//! binding, is expressed in. Distinct from [`oxrdf::Term`] because bindings
//! arriving from a federated `SERVICE` call are parsed straight into this
//! shape before being re-interned as atoms by the evaluator.

use oxrdf::{BlankNode, Literal, NamedNode, Term};
use std::fmt;

/// One binding's value, tagged the way the W3C SPARQL-results JSON format
/// tags it (`"uri"`, `"literal"`, `"bnode"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermValue {
    pub kind: TermValueKind,
    /// The lexical form, without angle brackets/quotes/`_:` prefix.
    pub value: String,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermValueKind {
    Iri,
    Literal,
    BNode,
}

impl TermValue {
    pub fn iri(value: impl Into<String>) -> Self {
        Self {
            kind: TermValueKind::Iri,
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn bnode(value: impl Into<String>) -> Self {
        Self {
            kind: TermValueKind::BNode,
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn plain_literal(value: impl Into<String>) -> Self {
        Self {
            kind: TermValueKind::Literal,
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            kind: TermValueKind::Literal,
            value: value.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    pub fn lang_literal(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            kind: TermValueKind::Literal,
            value: value.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }

    /// N-Triples-style round-trip rendering, per the term-value contract
    /// (`<iri>`, `"lex"`, `"lex"@lang`, `"lex"^^<dt>`, `_:label`).
    pub fn to_ntriples(&self) -> String {
        match self.kind {
            TermValueKind::Iri => format!("<{}>", self.value),
            TermValueKind::BNode => format!("_:{}", self.value),
            TermValueKind::Literal => {
                let escaped = escape_literal(&self.value);
                if let Some(lang) = &self.language {
                    format!("\"{escaped}\"@{lang}")
                } else if let Some(dt) = &self.datatype {
                    format!("\"{escaped}\"^^<{dt}>")
                } else {
                    format!("\"{escaped}\"")
                }
            }
        }
    }
}

fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

impl fmt::Display for TermValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ntriples())
    }
}

impl From<&Term> for TermValue {
    fn from(term: &Term) -> Self {
        match term {
            Term::NamedNode(n) => Self::iri(n.as_str()),
            Term::BlankNode(b) => Self::bnode(b.as_str()),
            Term::Literal(l) => Self {
                kind: TermValueKind::Literal,
                value: l.value().to_owned(),
                datatype: if l.is_plain() {
                    None
                } else {
                    Some(l.datatype().as_str().to_owned())
                },
                language: l.language().map(str::to_owned),
            },
        }
    }
}

impl From<Term> for TermValue {
    fn from(term: Term) -> Self {
        Self::from(&term)
    }
}

impl TryFrom<&TermValue> for Term {
    type Error = crate::error::ParseResultsError;

    fn try_from(value: &TermValue) -> Result<Self, Self::Error> {
        Ok(match value.kind {
            TermValueKind::Iri => Term::NamedNode(
                NamedNode::new(&value.value)
                    .map_err(|e| crate::error::ParseResultsError::InvalidTerm(e.to_string()))?,
            ),
            TermValueKind::BNode => Term::BlankNode(BlankNode::new_unchecked(&value.value)),
            TermValueKind::Literal => match (&value.language, &value.datatype) {
                (Some(lang), _) => Term::Literal(
                    Literal::new_language_tagged_literal(value.value.clone(), lang.clone())
                        .map_err(|e| {
                            crate::error::ParseResultsError::InvalidTerm(e.to_string())
                        })?,
                ),
                (None, Some(dt)) => Term::Literal(Literal::new_typed_literal(
                    value.value.clone(),
                    NamedNode::new(dt).map_err(|e| {
                        crate::error::ParseResultsError::InvalidTerm(e.to_string())
                    })?,
                )),
                (None, None) => Term::Literal(Literal::new_simple_literal(value.value.clone())),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_ntriples_renders_each_kind() {
        assert_eq!(TermValue::iri("http://example.com/").to_ntriples(), "<http://example.com/>");
        assert_eq!(TermValue::bnode("b1").to_ntriples(), "_:b1");
        assert_eq!(TermValue::plain_literal("hi").to_ntriples(), "\"hi\"");
        assert_eq!(
            TermValue::lang_literal("hi", "en").to_ntriples(),
            "\"hi\"@en"
        );
        assert_eq!(
            TermValue::typed_literal("42", "http://www.w3.org/2001/XMLSchema#integer").to_ntriples(),
            "\"42\"^^<http://www.w3.org/2001/XMLSchema#integer>"
        );
    }

    #[test]
    fn escapes_quotes_and_backslashes_in_literals() {
        assert_eq!(
            TermValue::plain_literal("a\"b\\c").to_ntriples(),
            "\"a\\\"b\\\\c\""
        );
    }

    #[test]
    fn from_term_preserves_plain_vs_typed_literals() {
        let plain = Term::Literal(Literal::new_simple_literal("x"));
        assert_eq!(TermValue::from(&plain).datatype, None);
        let typed = Term::Literal(Literal::new_typed_literal(
            "3",
            NamedNode::new("http://www.w3.org/2001/XMLSchema#integer").unwrap(),
        ));
        assert_eq!(
            TermValue::from(&typed).datatype.as_deref(),
            Some("http://www.w3.org/2001/XMLSchema#integer")
        );
    }

    #[test]
    fn round_trips_through_term_conversion() {
        let tv = TermValue::iri("http://example.com/s");
        let term = Term::try_from(&tv).unwrap();
        assert_eq!(term, Term::NamedNode(NamedNode::new("http://example.com/s").unwrap()));
    }
}
