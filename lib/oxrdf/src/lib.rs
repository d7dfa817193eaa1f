//! The RDF data model shared by the quad store, the parser and the
//! evaluator: terms, triples, quads and the SPARQL variable type.
//!
//! Every owned type (`NamedNode`, `BlankNode`, `Literal`, ...) has a borrowed
//! counterpart (`NamedNodeRef`, ...) so that the atom table can hand out
//! zero-copy views into its interned byte storage without forcing callers
//! through an allocation.

mod blank_node;
mod literal;
mod named_node;
mod term;
mod triple;
mod variable;
pub mod vocab;

pub use blank_node::{BlankNode, BlankNodeIdParseError, BlankNodeRef};
pub use literal::{Literal, LiteralRef};
pub use named_node::{IriParseError, NamedNode, NamedNodeRef};
pub use term::{NamedOrBlankNode, NamedOrBlankNodeRef, Term, TermRef};
pub use triple::{GraphName, GraphNameRef, Quad, QuadRef, Triple, TripleRef};
pub use variable::{Variable, VariableKey, VariableNameParseError, VariableRef};
