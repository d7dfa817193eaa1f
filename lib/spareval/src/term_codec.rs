//! Canonical string encoding used by the atom table: the same N-Triples-style
//! rendering [`oxrdf::Term::to_ntriples`] already produces for display,
//! reused here as the interned form so no second serialization exists.

use oxrdf::{BlankNode, Literal, NamedNode, Term, TermRef};

use crate::eval_error::EngineError;

pub fn encode_term(term: TermRef<'_>) -> String {
    term.to_ntriples()
}

/// Parses a term back out of its canonical encoding. The leading byte
/// (`<`, `_`, `"`) always disambiguates the term kind, matching the grammar
/// `to_ntriples` produces.
pub fn decode_term(text: &str) -> Result<Term, EngineError> {
    if let Some(rest) = text.strip_prefix('<') {
        let iri = rest
            .strip_suffix('>')
            .ok_or_else(|| EngineError::Storage(format!("malformed atom IRI: {text}")))?;
        return Ok(Term::NamedNode(NamedNode::new_unchecked(iri)));
    }
    if let Some(label) = text.strip_prefix("_:") {
        return Ok(Term::BlankNode(BlankNode::new_unchecked(label)));
    }
    if text.starts_with('"') {
        return decode_literal(text).map(Term::Literal);
    }
    Err(EngineError::Storage(format!(
        "malformed atom encoding: {text}"
    )))
}

fn decode_literal(text: &str) -> Result<Literal, EngineError> {
    let bytes = text.as_bytes();
    let mut end = 1;
    let mut escaped = false;
    while end < bytes.len() {
        match bytes[end] {
            b'\\' if !escaped => escaped = true,
            b'"' if !escaped => break,
            _ => escaped = false,
        }
        end += 1;
    }
    if end >= bytes.len() {
        return Err(EngineError::Storage(format!(
            "unterminated literal atom: {text}"
        )));
    }
    let lexical = unescape(&text[1..end]);
    let suffix = &text[end + 1..];
    if let Some(lang) = suffix.strip_prefix('@') {
        return Literal::new_language_tagged_literal(lexical, lang)
            .map_err(|e| EngineError::Storage(e.to_string()));
    }
    if let Some(datatype) = suffix.strip_prefix("^^<").and_then(|s| s.strip_suffix('>')) {
        return Ok(Literal::new_typed_literal(
            lexical,
            NamedNode::new_unchecked(datatype),
        ));
    }
    if suffix.is_empty() {
        return Ok(Literal::new_simple_literal(lexical));
    }
    Err(EngineError::Storage(format!(
        "malformed literal atom suffix: {suffix}"
    )))
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_iri() {
        let term = Term::NamedNode(NamedNode::new("http://example.com/s").unwrap());
        let encoded = encode_term(term.as_ref());
        assert_eq!(decode_term(&encoded).unwrap(), term);
    }

    #[test]
    fn round_trips_typed_literal() {
        let term = Term::Literal(Literal::new_typed_literal(
            "42",
            NamedNode::new("http://www.w3.org/2001/XMLSchema#integer").unwrap(),
        ));
        let encoded = encode_term(term.as_ref());
        assert_eq!(decode_term(&encoded).unwrap(), term);
    }

    #[test]
    fn round_trips_language_literal_with_escapes() {
        let term = Term::Literal(
            Literal::new_language_tagged_literal("line one\nline \"two\"", "en").unwrap(),
        );
        let encoded = encode_term(term.as_ref());
        assert_eq!(decode_term(&encoded).unwrap(), term);
    }

    #[test]
    fn round_trips_blank_node() {
        let term = Term::BlankNode(BlankNode::new("b1").unwrap());
        let encoded = encode_term(term.as_ref());
        assert_eq!(decode_term(&encoded).unwrap(), term);
    }
}
