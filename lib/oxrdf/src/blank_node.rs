use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BLANK_NODE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// An owned RDF [blank node](https://www.w3.org/TR/rdf11-concepts/#dfn-blank-node).
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone)]
pub struct BlankNode {
    id: String,
}

impl BlankNode {
    /// Creates a blank node from an explicit label (the part after `_:`).
    pub fn new(id: impl Into<String>) -> Result<Self, BlankNodeIdParseError> {
        let id = id.into();
        if id.is_empty() {
            return Err(BlankNodeIdParseError);
        }
        Ok(Self { id })
    }

    #[inline]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Generates a fresh blank node with a process-unique label.
    ///
    /// Used for skolemizing path operators' internal join variables and for
    /// CONSTRUCT templates that introduce new blank nodes per solution.
    pub fn default() -> Self {
        let counter = NEXT_BLANK_NODE_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("genid{counter:x}"),
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn into_string(self) -> String {
        self.id
    }

    #[inline]
    pub fn as_ref(&self) -> BlankNodeRef<'_> {
        BlankNodeRef { id: &self.id }
    }
}

impl fmt::Display for BlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl fmt::Debug for BlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

/// A borrowed version of [`BlankNode`].
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy)]
pub struct BlankNodeRef<'a> {
    id: &'a str,
}

impl<'a> BlankNodeRef<'a> {
    #[inline]
    pub const fn new_unchecked(id: &'a str) -> Self {
        Self { id }
    }

    #[inline]
    pub const fn as_str(self) -> &'a str {
        self.id
    }

    #[inline]
    pub fn into_owned(self) -> BlankNode {
        BlankNode {
            id: self.id.to_owned(),
        }
    }
}

impl fmt::Display for BlankNodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:{}", self.id)
    }
}

impl fmt::Debug for BlankNodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<'a> From<&'a BlankNode> for BlankNodeRef<'a> {
    fn from(node: &'a BlankNode) -> Self {
        node.as_ref()
    }
}

impl From<BlankNodeRef<'_>> for BlankNode {
    fn from(node: BlankNodeRef<'_>) -> Self {
        node.into_owned()
    }
}

/// The label passed to [`BlankNode::new`] was empty.
#[derive(Debug, Clone, Copy)]
pub struct BlankNodeIdParseError;

impl fmt::Display for BlankNodeIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blank node identifiers must not be empty")
    }
}

impl std::error::Error for BlankNodeIdParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_label_is_rejected() {
        assert!(BlankNode::new("").is_err());
    }

    #[test]
    fn display_is_underscore_colon_prefixed() {
        let b = BlankNode::new("b1").unwrap();
        assert_eq!(b.to_string(), "_:b1");
    }

    #[test]
    fn fresh_blank_nodes_are_distinct() {
        let a = BlankNode::default();
        let b = BlankNode::default();
        assert_ne!(a, b);
    }
}
