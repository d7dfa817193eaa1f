use crate::blank_node::{BlankNode, BlankNodeRef};
use crate::named_node::{NamedNode, NamedNodeRef};
use crate::term::{NamedOrBlankNode, NamedOrBlankNodeRef, Term, TermRef};
use std::fmt;

/// A named graph's name, or the distinguished default-graph sentinel.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Default)]
pub enum GraphName {
    NamedNode(NamedNode),
    BlankNode(BlankNode),
    #[default]
    DefaultGraph,
}

impl GraphName {
    pub fn as_ref(&self) -> GraphNameRef<'_> {
        match self {
            Self::NamedNode(n) => GraphNameRef::NamedNode(n.as_ref()),
            Self::BlankNode(n) => GraphNameRef::BlankNode(n.as_ref()),
            Self::DefaultGraph => GraphNameRef::DefaultGraph,
        }
    }

    pub fn is_default_graph(&self) -> bool {
        matches!(self, Self::DefaultGraph)
    }
}

impl fmt::Display for GraphName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl From<NamedNode> for GraphName {
    fn from(n: NamedNode) -> Self {
        Self::NamedNode(n)
    }
}

impl From<BlankNode> for GraphName {
    fn from(n: BlankNode) -> Self {
        Self::BlankNode(n)
    }
}

impl From<NamedOrBlankNode> for GraphName {
    fn from(n: NamedOrBlankNode) -> Self {
        match n {
            NamedOrBlankNode::NamedNode(n) => Self::NamedNode(n),
            NamedOrBlankNode::BlankNode(n) => Self::BlankNode(n),
        }
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Debug, Default)]
pub enum GraphNameRef<'a> {
    NamedNode(NamedNodeRef<'a>),
    BlankNode(BlankNodeRef<'a>),
    #[default]
    DefaultGraph,
}

impl<'a> GraphNameRef<'a> {
    pub fn into_owned(self) -> GraphName {
        match self {
            Self::NamedNode(n) => GraphName::NamedNode(n.into_owned()),
            Self::BlankNode(n) => GraphName::BlankNode(n.into_owned()),
            Self::DefaultGraph => GraphName::DefaultGraph,
        }
    }

    pub fn is_default_graph(self) -> bool {
        matches!(self, Self::DefaultGraph)
    }
}

impl fmt::Display for GraphNameRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamedNode(n) => n.fmt(f),
            Self::BlankNode(n) => n.fmt(f),
            Self::DefaultGraph => f.write_str("DEFAULT"),
        }
    }
}

impl<'a> From<&'a GraphName> for GraphNameRef<'a> {
    fn from(g: &'a GraphName) -> Self {
        g.as_ref()
    }
}

impl<'a> From<NamedOrBlankNodeRef<'a>> for GraphNameRef<'a> {
    fn from(n: NamedOrBlankNodeRef<'a>) -> Self {
        match n {
            NamedOrBlankNodeRef::NamedNode(n) => Self::NamedNode(n),
            NamedOrBlankNodeRef::BlankNode(n) => Self::BlankNode(n),
        }
    }
}

/// An RDF triple: subject, predicate, object.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug)]
pub struct Triple {
    pub subject: NamedOrBlankNode,
    pub predicate: NamedNode,
    pub object: Term,
}

impl Triple {
    pub fn new(
        subject: impl Into<NamedOrBlankNode>,
        predicate: impl Into<NamedNode>,
        object: impl Into<Term>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    pub fn as_ref(&self) -> TripleRef<'_> {
        TripleRef {
            subject: self.subject.as_ref(),
            predicate: self.predicate.as_ref(),
            object: self.object.as_ref(),
        }
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Debug)]
pub struct TripleRef<'a> {
    pub subject: NamedOrBlankNodeRef<'a>,
    pub predicate: NamedNodeRef<'a>,
    pub object: TermRef<'a>,
}

impl TripleRef<'_> {
    pub fn into_owned(self) -> Triple {
        Triple {
            subject: self.subject.into_owned(),
            predicate: self.predicate.into_owned(),
            object: self.object.into_owned(),
        }
    }
}

/// An RDF quad: a [`Triple`] scoped to a graph.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug)]
pub struct Quad {
    pub subject: NamedOrBlankNode,
    pub predicate: NamedNode,
    pub object: Term,
    pub graph_name: GraphName,
}

impl Quad {
    pub fn new(
        subject: impl Into<NamedOrBlankNode>,
        predicate: impl Into<NamedNode>,
        object: impl Into<Term>,
        graph_name: impl Into<GraphName>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            graph_name: graph_name.into(),
        }
    }

    pub fn as_ref(&self) -> QuadRef<'_> {
        QuadRef {
            subject: self.subject.as_ref(),
            predicate: self.predicate.as_ref(),
            object: self.object.as_ref(),
            graph_name: self.graph_name.as_ref(),
        }
    }

    pub fn into_triple(self) -> Triple {
        Triple {
            subject: self.subject,
            predicate: self.predicate,
            object: self.object,
        }
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Debug)]
pub struct QuadRef<'a> {
    pub subject: NamedOrBlankNodeRef<'a>,
    pub predicate: NamedNodeRef<'a>,
    pub object: TermRef<'a>,
    pub graph_name: GraphNameRef<'a>,
}

impl QuadRef<'_> {
    pub fn into_owned(self) -> Quad {
        Quad {
            subject: self.subject.into_owned(),
            predicate: self.predicate.into_owned(),
            object: self.object.into_owned(),
            graph_name: self.graph_name.into_owned(),
        }
    }
}

impl<'a> From<&'a Quad> for QuadRef<'a> {
    fn from(q: &'a Quad) -> Self {
        q.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::named_node::NamedNode;

    fn iri(s: &str) -> NamedNode {
        NamedNode::new(s).unwrap()
    }

    #[test]
    fn quad_into_triple_drops_graph_name() {
        let quad = Quad::new(
            iri("http://example.com/s"),
            iri("http://example.com/p"),
            Term::NamedNode(iri("http://example.com/o")),
            iri("http://example.com/g"),
        );
        let triple = quad.clone().into_triple();
        assert_eq!(triple.subject, quad.subject);
        assert_eq!(triple.predicate, quad.predicate);
        assert_eq!(triple.object, quad.object);
    }

    #[test]
    fn default_graph_name_displays_as_default() {
        assert_eq!(GraphName::DefaultGraph.to_string(), "DEFAULT");
    }

    #[test]
    fn ref_round_trips_to_owned() {
        let triple = Triple::new(
            iri("http://example.com/s"),
            iri("http://example.com/p"),
            Term::NamedNode(iri("http://example.com/o")),
        );
        assert_eq!(triple.as_ref().into_owned(), triple);
    }
}
