use crate::blank_node::{BlankNode, BlankNodeRef};
use crate::literal::{Literal, LiteralRef};
use crate::named_node::{NamedNode, NamedNodeRef};
use std::fmt;

/// An RDF term: the tagged variant described by the data model (IRI, literal
/// or blank node). RDF-star triple terms are out of scope.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug)]
pub enum Term {
    NamedNode(NamedNode),
    BlankNode(BlankNode),
    Literal(Literal),
}

impl Term {
    pub fn as_ref(&self) -> TermRef<'_> {
        match self {
            Self::NamedNode(n) => TermRef::NamedNode(n.as_ref()),
            Self::BlankNode(n) => TermRef::BlankNode(n.as_ref()),
            Self::Literal(l) => TermRef::Literal(l.as_ref()),
        }
    }

    pub fn to_ntriples(&self) -> String {
        self.as_ref().to_ntriples()
    }

    pub fn is_named_node(&self) -> bool {
        matches!(self, Self::NamedNode(_))
    }

    pub fn is_blank_node(&self) -> bool {
        matches!(self, Self::BlankNode(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl From<NamedNode> for Term {
    fn from(n: NamedNode) -> Self {
        Self::NamedNode(n)
    }
}

impl From<BlankNode> for Term {
    fn from(n: BlankNode) -> Self {
        Self::BlankNode(n)
    }
}

impl From<Literal> for Term {
    fn from(l: Literal) -> Self {
        Self::Literal(l)
    }
}

/// A borrowed [`Term`].
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Debug)]
pub enum TermRef<'a> {
    NamedNode(NamedNodeRef<'a>),
    BlankNode(BlankNodeRef<'a>),
    Literal(LiteralRef<'a>),
}

impl<'a> TermRef<'a> {
    pub fn into_owned(self) -> Term {
        match self {
            Self::NamedNode(n) => Term::NamedNode(n.into_owned()),
            Self::BlankNode(n) => Term::BlankNode(n.into_owned()),
            Self::Literal(l) => Term::Literal(l.into_owned()),
        }
    }

    pub fn to_ntriples(self) -> String {
        match self {
            Self::NamedNode(n) => n.to_string(),
            Self::BlankNode(n) => n.to_string(),
            Self::Literal(l) => l.to_ntriples(),
        }
    }
}

impl fmt::Display for TermRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamedNode(n) => n.fmt(f),
            Self::BlankNode(n) => n.fmt(f),
            Self::Literal(l) => l.fmt(f),
        }
    }
}

impl<'a> From<&'a Term> for TermRef<'a> {
    fn from(t: &'a Term) -> Self {
        t.as_ref()
    }
}

impl<'a> From<NamedNodeRef<'a>> for TermRef<'a> {
    fn from(n: NamedNodeRef<'a>) -> Self {
        Self::NamedNode(n)
    }
}

impl<'a> From<BlankNodeRef<'a>> for TermRef<'a> {
    fn from(n: BlankNodeRef<'a>) -> Self {
        Self::BlankNode(n)
    }
}

impl<'a> From<LiteralRef<'a>> for TermRef<'a> {
    fn from(l: LiteralRef<'a>) -> Self {
        Self::Literal(l)
    }
}

/// The subset of [`Term`] valid in subject position: IRI or blank node.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug)]
pub enum NamedOrBlankNode {
    NamedNode(NamedNode),
    BlankNode(BlankNode),
}

impl NamedOrBlankNode {
    pub fn as_ref(&self) -> NamedOrBlankNodeRef<'_> {
        match self {
            Self::NamedNode(n) => NamedOrBlankNodeRef::NamedNode(n.as_ref()),
            Self::BlankNode(n) => NamedOrBlankNodeRef::BlankNode(n.as_ref()),
        }
    }
}

impl fmt::Display for NamedOrBlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl From<NamedNode> for NamedOrBlankNode {
    fn from(n: NamedNode) -> Self {
        Self::NamedNode(n)
    }
}

impl From<BlankNode> for NamedOrBlankNode {
    fn from(n: BlankNode) -> Self {
        Self::BlankNode(n)
    }
}

impl From<NamedOrBlankNode> for Term {
    fn from(n: NamedOrBlankNode) -> Self {
        match n {
            NamedOrBlankNode::NamedNode(n) => Self::NamedNode(n),
            NamedOrBlankNode::BlankNode(n) => Self::BlankNode(n),
        }
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Debug)]
pub enum NamedOrBlankNodeRef<'a> {
    NamedNode(NamedNodeRef<'a>),
    BlankNode(BlankNodeRef<'a>),
}

impl<'a> NamedOrBlankNodeRef<'a> {
    pub fn into_owned(self) -> NamedOrBlankNode {
        match self {
            Self::NamedNode(n) => NamedOrBlankNode::NamedNode(n.into_owned()),
            Self::BlankNode(n) => NamedOrBlankNode::BlankNode(n.into_owned()),
        }
    }
}

impl fmt::Display for NamedOrBlankNodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamedNode(n) => n.fmt(f),
            Self::BlankNode(n) => n.fmt(f),
        }
    }
}

impl<'a> From<NamedOrBlankNodeRef<'a>> for TermRef<'a> {
    fn from(n: NamedOrBlankNodeRef<'a>) -> Self {
        match n {
            NamedOrBlankNodeRef::NamedNode(n) => Self::NamedNode(n),
            NamedOrBlankNodeRef::BlankNode(n) => Self::BlankNode(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::Literal;

    #[test]
    fn term_kind_predicates() {
        let iri = Term::NamedNode(NamedNode::new("http://example.com/").unwrap());
        assert!(iri.is_named_node());
        assert!(!iri.is_literal());
        let lit = Term::Literal(Literal::new_simple_literal("x"));
        assert!(lit.is_literal());
        assert!(!lit.is_blank_node());
    }

    #[test]
    fn to_ntriples_round_trips_each_kind() {
        let iri = Term::NamedNode(NamedNode::new("http://example.com/").unwrap());
        assert_eq!(iri.to_ntriples(), "<http://example.com/>");
        let lit = Term::Literal(Literal::new_language_tagged_literal_unchecked("hi", "en"));
        assert_eq!(lit.to_ntriples(), "\"hi\"@en");
    }
}
