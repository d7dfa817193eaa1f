//! The SPARQL evaluation core: the atom table (C1), the indexed quad store
//! (C2), cardinality statistics (C3), the expression evaluator (C6), the
//! iterator-pipeline operators (C8), and the executor façade (C9) that ties
//! them to concrete parsed queries and updates.
//!
//! The parser (C4) and prologue resolver (C5) live in `spargebra`; the
//! planner (C7) lives in `sparopt`. This crate is the half of the engine
//! that actually touches stored data.

pub mod atom;
pub mod binding;
pub mod eval_error;
pub mod executor;
pub mod expression;
pub mod operators;
pub mod statistics;
pub mod store;
pub mod term_codec;
pub mod term_resolve;

pub use atom::{AtomId, AtomTable};
pub use binding::{Row, Solution, VariableSlots};
pub use eval_error::{EngineError, EngineResult};
pub use executor::{
    GraphLoader, NullGraphLoader, QueryEvaluator, QueryOptions, QueryResults, SelectResults,
    UpdateEvaluator, UpdateSummary,
};
pub use expression::{effective_boolean_value, order_compare, ExprContext, Value};
pub use operators::{
    CancellationToken, NullServiceExecutor, PatternEvaluator, PatternOperator, ServiceExecutor,
    ServiceResponse,
};
pub use statistics::Statistics;
pub use store::{EncodedQuad, QuadStore, StoreData, StoreError};
pub use term_codec::{decode_term, encode_term};
pub use term_resolve::resolve_term;
