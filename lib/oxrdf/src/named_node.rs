use oxiri::Iri;
use std::fmt;

/// An owned RDF [IRI](https://www.w3.org/TR/rdf11-concepts/#dfn-iri).
///
/// The validity of the IRI is checked with [`oxiri`] at construction time unless
/// [`NamedNode::new_unchecked`] is used.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone)]
pub struct NamedNode {
    iri: String,
}

impl NamedNode {
    /// Builds and validates an RDF [IRI](https://www.w3.org/TR/rdf11-concepts/#dfn-iri).
    pub fn new(iri: impl Into<String>) -> Result<Self, IriParseError> {
        let iri = iri.into();
        Iri::parse(iri.as_str()).map_err(|e| IriParseError {
            iri: iri.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { iri })
    }

    /// Builds an RDF IRI without checking it for validity.
    ///
    /// Used internally by the atom table when re-materializing terms that
    /// were already validated at intern time.
    pub fn new_unchecked(iri: impl Into<String>) -> Self {
        Self { iri: iri.into() }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.iri
    }

    #[inline]
    pub fn into_string(self) -> String {
        self.iri
    }

    #[inline]
    pub fn as_ref(&self) -> NamedNodeRef<'_> {
        NamedNodeRef { iri: &self.iri }
    }
}

impl fmt::Display for NamedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl fmt::Debug for NamedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

/// A borrowed version of [`NamedNode`].
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy)]
pub struct NamedNodeRef<'a> {
    iri: &'a str,
}

impl<'a> NamedNodeRef<'a> {
    pub fn new(iri: &'a str) -> Result<Self, IriParseError> {
        Iri::parse(iri).map_err(|e| IriParseError {
            iri: iri.to_owned(),
            message: e.to_string(),
        })?;
        Ok(Self { iri })
    }

    #[inline]
    pub const fn new_unchecked(iri: &'a str) -> Self {
        Self { iri }
    }

    #[inline]
    pub const fn as_str(self) -> &'a str {
        self.iri
    }

    #[inline]
    pub fn into_owned(self) -> NamedNode {
        NamedNode {
            iri: self.iri.to_owned(),
        }
    }
}

impl fmt::Display for NamedNodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.iri)
    }
}

impl fmt::Debug for NamedNodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<'a> From<&'a NamedNode> for NamedNodeRef<'a> {
    fn from(node: &'a NamedNode) -> Self {
        node.as_ref()
    }
}

impl From<NamedNodeRef<'_>> for NamedNode {
    fn from(node: NamedNodeRef<'_>) -> Self {
        node.into_owned()
    }
}

impl PartialEq<NamedNode> for NamedNodeRef<'_> {
    fn eq(&self, other: &NamedNode) -> bool {
        self.iri == other.iri
    }
}

impl PartialEq<NamedNodeRef<'_>> for NamedNode {
    fn eq(&self, other: &NamedNodeRef<'_>) -> bool {
        self.iri == other.iri
    }
}

/// An error raised when an IRI is not valid, carrying the offending text for
/// inclusion in a `ParseError` or `EvaluationError`.
#[derive(Debug, Clone)]
pub struct IriParseError {
    iri: String,
    message: String,
}

impl fmt::Display for IriParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error parsing IRI '{}': {}", self.iri, self.message)
    }
}

impl std::error::Error for IriParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_iri() {
        assert!(NamedNode::new("not an iri").is_err());
    }

    #[test]
    fn display_wraps_in_angle_brackets() {
        let n = NamedNode::new("http://example.com/foo").unwrap();
        assert_eq!(n.to_string(), "<http://example.com/foo>");
        assert_eq!(n.as_str(), "http://example.com/foo");
    }

    #[test]
    fn ref_and_owned_compare_equal() {
        let owned = NamedNode::new("http://example.com/foo").unwrap();
        let borrowed = NamedNodeRef::new("http://example.com/foo").unwrap();
        assert_eq!(borrowed, owned);
        assert_eq!(owned, borrowed);
        assert_eq!(borrowed.into_owned(), owned);
    }
}
