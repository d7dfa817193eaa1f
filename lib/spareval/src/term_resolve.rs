//! Resolves a parser-side `TermRef` constant (an IRI, prefixed name,
//! literal, or synthesized RDF-collection marker) against its source text
//! and prologue into a concrete [`oxrdf::Term`]. Shared by the expression
//! evaluator, the scan operator (triple pattern constants) and CONSTRUCT
//! template instantiation.

use oxrdf::vocab::{rdf, xsd};
use oxrdf::{BlankNode, Literal, NamedNode, Term};
use spargebra::algebra::{TermKind, TermRef};
use spargebra::Prologue;

use crate::eval_error::EngineError;

pub fn resolve_term(term: TermRef, source: &str, prologue: &Prologue) -> Result<Term, EngineError> {
    let text = term.text(source);
    match term.kind {
        TermKind::Iri => {
            let iri = prologue.resolve_iri(text)?;
            Ok(Term::NamedNode(
                NamedNode::new(iri).map_err(|e| EngineError::evaluation(e.to_string()))?,
            ))
        }
        TermKind::PrefixedName => {
            let iri = prologue.resolve_prefixed_name(text)?;
            Ok(Term::NamedNode(NamedNode::new_unchecked(iri)))
        }
        TermKind::KeywordA => Ok(Term::NamedNode(rdf::TYPE.into_owned())),
        TermKind::BlankNode => Ok(Term::BlankNode(BlankNode::new_unchecked(&text[2..]))),
        TermKind::AnonBlankNode => {
            Ok(Term::BlankNode(BlankNode::new_unchecked(format!("anon{}", term.start))))
        }
        TermKind::NumericLiteral => Ok(Term::Literal(numeric_literal(text))),
        TermKind::BooleanLiteral => Ok(Term::Literal(Literal::new_typed_literal(
            text,
            xsd::BOOLEAN,
        ))),
        TermKind::Literal => parse_quoted_literal(text, prologue),
        TermKind::RdfFirst => Ok(Term::NamedNode(rdf::FIRST.into_owned())),
        TermKind::RdfRest => Ok(Term::NamedNode(rdf::REST.into_owned())),
        TermKind::RdfNil => Ok(Term::NamedNode(rdf::NIL.into_owned())),
        TermKind::Variable => unreachable!("variables are resolved from the row, not as constants"),
    }
}

fn numeric_literal(text: &str) -> Literal {
    let datatype = if text.contains(['e', 'E']) {
        xsd::DOUBLE
    } else if text.contains('.') {
        xsd::DECIMAL
    } else {
        xsd::INTEGER
    };
    Literal::new_typed_literal(text, datatype)
}

fn parse_quoted_literal(text: &str, prologue: &Prologue) -> Result<Term, EngineError> {
    let bytes = text.as_bytes();
    let quote = bytes[0];
    let long = bytes.len() >= 6 && bytes[1] == quote && bytes[2] == quote;
    let quote_len = if long { 3 } else { 1 };
    let mut i = quote_len;
    let mut escaped = false;
    let end_idx = loop {
        match bytes.get(i) {
            None => {
                return Err(EngineError::evaluation(format!(
                    "unterminated literal: {text}"
                )))
            }
            Some(b'\\') if !escaped => {
                escaped = true;
                i += 1;
            }
            Some(&c) if c == quote && !escaped => {
                if !long {
                    let end = i;
                    i += 1;
                    break end;
                }
                if bytes.get(i + 1) == Some(&quote) && bytes.get(i + 2) == Some(&quote) {
                    let end = i;
                    i += 3;
                    break end;
                }
                i += 1;
            }
            _ => {
                escaped = false;
                i += 1;
            }
        }
    };
    let lexical = unescape_sparql_string(&text[quote_len..end_idx]);
    let suffix = &text[i..];
    if let Some(lang) = suffix.strip_prefix('@') {
        return Literal::new_language_tagged_literal(lexical, lang)
            .map(Term::Literal)
            .map_err(|e| EngineError::evaluation(e.to_string()));
    }
    if let Some(datatype_text) = suffix.strip_prefix("^^") {
        let datatype = if let Some(inner) = datatype_text
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
        {
            inner.to_owned()
        } else {
            prologue.resolve_prefixed_name(datatype_text)?
        };
        return Ok(Term::Literal(Literal::new_typed_literal(
            lexical,
            NamedNode::new_unchecked(datatype),
        )));
    }
    Ok(Term::Literal(Literal::new_simple_literal(lexical)))
}

fn unescape_sparql_string(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_owned();
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some('u') => push_unicode_escape(&mut chars, &mut out, 4),
            Some('U') => push_unicode_escape(&mut chars, &mut out, 8),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn push_unicode_escape(chars: &mut std::str::Chars<'_>, out: &mut String, digits: usize) {
    let hex: String = chars.by_ref().take(digits).collect();
    if let Ok(code) = u32::from_str_radix(&hex, 16) {
        if let Some(c) = char::from_u32(code) {
            out.push(c);
            return;
        }
    }
    out.push_str(&hex);
}

#[cfg(test)]
mod tests {
    use super::*;
    use spargebra::PrologueDecl;

    fn prologue() -> Prologue {
        Prologue::new(PrologueDecl::default()).unwrap()
    }

    #[test]
    fn resolves_numeric_literal_kinds() {
        assert_eq!(numeric_literal("42").datatype(), xsd::INTEGER);
        assert_eq!(numeric_literal("4.2").datatype(), xsd::DECIMAL);
        assert_eq!(numeric_literal("4.2e1").datatype(), xsd::DOUBLE);
    }

    #[test]
    fn parses_plain_quoted_literal() {
        let term = parse_quoted_literal("\"hello\"", &prologue()).unwrap();
        assert_eq!(term, Term::Literal(Literal::new_simple_literal("hello")));
    }

    #[test]
    fn parses_language_tagged_literal() {
        let term = parse_quoted_literal("\"bonjour\"@fr", &prologue()).unwrap();
        assert_eq!(
            term,
            Term::Literal(Literal::new_language_tagged_literal("bonjour", "fr").unwrap())
        );
    }

    #[test]
    fn unescapes_backslash_sequences() {
        let term = parse_quoted_literal(r#""line\nbreak""#, &prologue()).unwrap();
        assert_eq!(
            term,
            Term::Literal(Literal::new_simple_literal("line\nbreak"))
        );
    }
}
