//! The prologue resolver (C5): expands `BASE` and `PREFIX` declarations
//! against a "prefixed-name" or relative-IRI term reference to produce the
//! canonical `<scheme://...>` form.
//!
//! Expansion is lazy: the parser only records the prologue, it never
//! resolves a single prefixed name itself. The planner/evaluator resolve on
//! first use and cache the result for the query's lifetime (the cache lives
//! on [`Prologue`] itself, since both hold the same lifetime as the parsed
//! query).

use oxiri::Iri;
use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::{ParseError, ParseErrorKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrologueDecl {
    pub base: Option<String>,
    /// prefix (without trailing `:`) -> namespace IRI.
    pub prefixes: HashMap<String, String>,
}

/// The resolver built from a parsed [`PrologueDecl`]. Caches expansions
/// keyed by the exact prefixed-name text so repeated references to the same
/// prefix/local pair (common across triple patterns) are resolved once.
pub struct Prologue {
    decl: PrologueDecl,
    base: Option<Iri<String>>,
    cache: RefCell<HashMap<String, String>>,
}

impl Prologue {
    pub fn new(decl: PrologueDecl) -> Result<Self, ParseError> {
        let base = match &decl.base {
            Some(b) => Some(
                Iri::parse(b.clone())
                    .map_err(|e| ParseError::new(ParseErrorKind::InvalidIri(e.to_string()), 0))?,
            ),
            None => None,
        };
        Ok(Self {
            decl,
            base,
            cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn declarations(&self) -> &PrologueDecl {
        &self.decl
    }

    /// Resolves a `prefix:local` reference (the full text including the
    /// colon) to a canonical `<iri>` string, per RFC 3986 relative
    /// resolution against BASE when the namespace itself is relative.
    pub fn resolve_prefixed_name(&self, text: &str) -> Result<String, ParseError> {
        if let Some(hit) = self.cache.borrow().get(text) {
            return Ok(hit.clone());
        }
        let (prefix, local) = text
            .split_once(':')
            .ok_or_else(|| ParseError::new(ParseErrorKind::UnknownPrefix(text.to_owned()), 0))?;
        let ns = self
            .decl
            .prefixes
            .get(prefix)
            .ok_or_else(|| ParseError::new(ParseErrorKind::UnknownPrefix(prefix.to_owned()), 0))?;
        let local = unescape_pn_local(local);
        let resolved = self.resolve_iri(&format!("{ns}{local}"))?;
        self.cache
            .borrow_mut()
            .insert(text.to_owned(), resolved.clone());
        Ok(resolved)
    }

    /// Resolves a possibly-relative IRI reference against BASE.
    pub fn resolve_iri(&self, iri: &str) -> Result<String, ParseError> {
        match &self.base {
            Some(base) => base
                .resolve(iri)
                .map(|resolved| resolved.into_inner())
                .map_err(|e| ParseError::new(ParseErrorKind::InvalidIri(e.to_string()), 0)),
            None => {
                // With no BASE, the reference must already be absolute.
                Iri::parse(iri.to_owned())
                    .map(Iri::into_inner)
                    .map_err(|e| ParseError::new(ParseErrorKind::InvalidIri(e.to_string()), 0))
            }
        }
    }
}

fn unescape_pn_local(local: &str) -> String {
    if !local.contains('\\') {
        return local.to_owned();
    }
    let mut out = String::with_capacity(local.len());
    let mut chars = local.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_prefixed_name() {
        let mut decl = PrologueDecl::default();
        decl.prefixes
            .insert("foaf".to_owned(), "http://xmlns.com/foaf/0.1/".to_owned());
        let prologue = Prologue::new(decl).unwrap();
        assert_eq!(
            prologue.resolve_prefixed_name("foaf:name").unwrap(),
            "http://xmlns.com/foaf/0.1/name"
        );
    }

    #[test]
    fn unknown_prefix_errors() {
        let prologue = Prologue::new(PrologueDecl::default()).unwrap();
        assert!(prologue.resolve_prefixed_name("ex:thing").is_err());
    }

    #[test]
    fn resolves_relative_against_base() {
        let mut decl = PrologueDecl::default();
        decl.base = Some("http://example.com/data/".to_owned());
        let prologue = Prologue::new(decl).unwrap();
        assert_eq!(
            prologue.resolve_iri("alice").unwrap(),
            "http://example.com/data/alice"
        );
    }
}
